#![warn(missing_docs)]

//! Parallel bounding volume hierarchy builders.
//!
//! Two builders produce the same [`Bvh`] layout:
//!
//! - [`SahBuilder`]: top-down binned surface area heuristic. Slower, better
//!   trees.
//! - [`MortonBuilder`]: sorts primitives along a Z-order curve and splits on
//!   code bits. Fast, looser trees.
//!
//! Both read primitives from a [`PrimitiveSource`], run on a
//! [`WorkerPool`](bvhkit_parallel::WorkerPool), and pack leaves into blocks
//! produced by the source.
//!
//! # Example
//!
//! ```
//! use bvhkit_bvh::{BoxBlock, BoxSource, BvhStatistics, SahBuilder};
//! use bvhkit_math::{Aabb3, Point3};
//! use bvhkit_parallel::WorkerPool;
//!
//! let boxes = (0..100)
//!     .map(|i| {
//!         let p = Point3::new(i as f64, 0.0, 0.0);
//!         Aabb3::new(p, Point3::new(p.x + 0.5, 1.0, 1.0))
//!     })
//!     .collect();
//! let source = BoxSource::new(vec![boxes]);
//! let pool = WorkerPool::new(2)?;
//!
//! let bvh = SahBuilder::<4>::default().build(&pool, &source)?;
//! bvh.validate(BoxBlock::bounds).unwrap();
//! println!("{}", BvhStatistics::compute(&bvh));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod arena;
pub mod bvh;
mod context;
pub mod error;
pub mod morton;
pub mod node;
pub mod prim_ref;
pub mod radix;
pub mod sah;
pub mod settings;
pub mod source;
pub mod statistics;

pub use arena::BumpArena;
pub use bvh::{BuildInfo, Bvh};
pub use error::{BuildError, Result, ValidationError};
pub use morton::{MortonBuilder, MortonEncoder};
pub use node::{Node, NodeId, NodeRef};
pub use prim_ref::{BuildRecord, PrimInfo, PrimRef};
pub use radix::{radix_sort, MortonId};
pub use sah::SahBuilder;
pub use settings::{MortonSettings, SahSettings};
pub use source::{create_prim_refs, BoxBlock, BoxSource, PrimitiveSource, BOX_BLOCK_SIZE};
pub use statistics::BvhStatistics;
