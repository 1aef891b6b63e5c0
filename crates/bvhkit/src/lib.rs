#![warn(missing_docs)]

//! bvhkit: parallel bounding volume hierarchy construction.
//!
//! Two builders turn a jagged collection of primitives into an N-ary BVH:
//! a binned surface area heuristic builder producing high-quality trees and a
//! Morton builder trading quality for speed. Both run on a fixed-size
//! [`WorkerPool`]; a shared [`SubtreeCache`] holds lazily built subtrees.
//!
//! # Example
//!
//! ```
//! use bvhkit::{build_bvh, BoxSource, Config};
//! use bvhkit::math::{Aabb3, Point3};
//!
//! let config = Config::from_toml_str("threads = 2\nbuilder = \"morton\"").unwrap();
//! let pool = config.worker_pool().unwrap();
//!
//! let mut source = BoxSource::default();
//! source.push_group(
//!     (0..100)
//!         .map(|i| {
//!             let x = i as f64;
//!             Aabb3::new(Point3::new(x, 0.0, 0.0), Point3::new(x + 0.5, 1.0, 1.0))
//!         })
//!         .collect(),
//! );
//!
//! let bvh = build_bvh::<_, 4>(&config, &pool, &source).unwrap();
//! assert_eq!(bvh.prim_count(), 100);
//! ```

pub mod config;

pub use bvhkit_bvh as bvh;
pub use bvhkit_cache as cache;
pub use bvhkit_math as math;
pub use bvhkit_parallel as parallel;

pub use bvhkit_bvh::{
    BoxSource, BuildError, Bvh, BvhStatistics, MortonBuilder, MortonSettings, Node, NodeRef,
    PrimitiveSource, SahBuilder, SahSettings,
};
pub use bvhkit_cache::{CacheSettings, CacheStats, LazySubtree, SubtreeCache};
pub use bvhkit_parallel::{parallel_for_for, parallel_for_for_reduce, Jagged, WorkerPool};
pub use config::{BuilderKind, Config, ConfigError, ConfigResult};

/// Build a BVH over `source` with the builder and settings chosen in `config`.
pub fn build_bvh<S, const N: usize>(
    config: &Config,
    pool: &WorkerPool,
    source: &S,
) -> bvhkit_bvh::Result<Bvh<S::Block, N>>
where
    S: PrimitiveSource + ?Sized,
{
    match config.builder {
        BuilderKind::BinnedSah => SahBuilder::<N>::new(config.sah.clone())?.build(pool, source),
        BuilderKind::Morton => MortonBuilder::<N>::new(config.morton.clone())?.build(pool, source),
    }
}
