#![warn(missing_docs)]

//! Shared cache for lazily built subtrees.
//!
//! [`SubtreeCache`] is a direct-mapped cache of variable-size block payloads
//! keyed by `(key, generation)`. A miss can be resolved through
//! [`SubtreeCache::get_or_build`], which makes sure that among all threads
//! missing on the same slot only one runs the (expensive) builder.
//! [`LazySubtree`] applies the same single-builder protocol to one value.
//!
//! # Example
//!
//! ```
//! use bvhkit_cache::{CacheSettings, SubtreeCache};
//!
//! let cache: SubtreeCache<u64> = SubtreeCache::new(CacheSettings::default()).unwrap();
//! let sum = cache
//!     .get_or_build(17, 0, 4, || vec![1, 2, 3, 4], |blocks| blocks.iter().sum::<u64>())
//!     .unwrap();
//! assert_eq!(sum, 10);
//! assert!(cache.lookup(17, 0).is_some());
//! ```

pub mod cache;
pub mod error;
pub mod gate;
pub mod lazy;
pub mod settings;
pub mod stats;

pub use cache::{CacheEntry, SubtreeCache};
pub use error::{CacheError, Result};
pub use gate::{BuildGate, BuildGuard};
pub use lazy::LazySubtree;
pub use settings::CacheSettings;
pub use stats::{CacheStats, CacheStatsSnapshot};
