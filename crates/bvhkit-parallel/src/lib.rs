#![warn(missing_docs)]

//! Fork-join parallelism for the bvhkit builders.
//!
//! [`WorkerPool`] is a fixed-size pool that blocks the caller until all
//! dispatched tasks finish. [`parallel_for_for`] iterates a jagged collection
//! (groups of items of varying length) by splitting the flattened item range
//! into near-equal chunks, one per task.
//!
//! # Example
//!
//! ```
//! use bvhkit_parallel::{parallel_for_for_reduce, WorkerPool};
//!
//! let pool = WorkerPool::new(4)?;
//! let groups = vec![vec![1u64; 300], vec![], vec![2u64; 700]];
//! let sum = parallel_for_for_reduce(
//!     &pool,
//!     &groups,
//!     64,
//!     0u64,
//!     |g, range, _| groups[g][range].iter().sum(),
//!     |a, b| a + b,
//! );
//! assert_eq!(sum, 1700);
//! # Ok::<(), bvhkit_parallel::ParallelError>(())
//! ```

pub mod error;
pub mod for_for;
pub mod pool;

pub use error::{ParallelError, Result};
pub use for_for::{
    parallel_for_for, parallel_for_for_reduce, sequential_for_for, ForForState, Jagged,
};
pub use pool::WorkerPool;
