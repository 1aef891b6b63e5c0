//! Parallel iteration over jagged collections.
//!
//! A jagged collection is an ordered sequence of groups, each an ordered
//! sequence of items (possibly empty). The scene's geometries with their
//! primitives are the typical example. The total item count `K` is split into
//! near-equal contiguous chunks, one per task, independent of where group
//! boundaries fall, so a large group can be shared by adjacent tasks while
//! many tiny groups collapse into one.

use std::ops::Range;

use crate::pool::WorkerPool;

/// A sequence of variable-length groups.
pub trait Jagged: Sync {
    /// Number of groups.
    fn group_count(&self) -> usize;

    /// Number of items in `group`.
    fn group_len(&self, group: usize) -> usize;
}

impl<T: Sync> Jagged for [Vec<T>] {
    fn group_count(&self) -> usize {
        self.len()
    }

    fn group_len(&self, group: usize) -> usize {
        self[group].len()
    }
}

impl<T: Sync> Jagged for Vec<Vec<T>> {
    fn group_count(&self) -> usize {
        self.len()
    }

    fn group_len(&self, group: usize) -> usize {
        self[group].len()
    }
}

impl<T: Sync> Jagged for [&[T]] {
    fn group_count(&self) -> usize {
        self.len()
    }

    fn group_len(&self, group: usize) -> usize {
        self[group].len()
    }
}

/// Group sizes and their exclusive prefix sum.
#[derive(Debug, Clone)]
pub struct ForForState {
    sizes: Vec<usize>,
    prefix_sum: Vec<usize>,
    total: usize,
}

impl ForForState {
    /// Snapshot the group sizes of `groups`.
    pub fn new<J: Jagged + ?Sized>(groups: &J) -> Self {
        let count = groups.group_count();
        let mut sizes = Vec::with_capacity(count);
        let mut prefix_sum = Vec::with_capacity(count);
        let mut sum = 0;
        for group in 0..count {
            let n = groups.group_len(group);
            prefix_sum.push(sum);
            sizes.push(n);
            sum += n;
        }
        Self {
            sizes,
            prefix_sum,
            total: sum,
        }
    }

    /// Total number of items over all groups.
    pub fn len(&self) -> usize {
        self.total
    }

    /// True if there are no items at all.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Number of groups, including empty ones.
    pub fn group_count(&self) -> usize {
        self.sizes.len()
    }

    /// Global index of the first item of `group`.
    pub fn group_offset(&self, group: usize) -> usize {
        self.prefix_sum[group]
    }

    /// Map a global index `k < len()` to `(group, local index)`.
    ///
    /// Empty groups are skipped: the returned group always contains `k`.
    pub fn start_indices(&self, k: usize) -> (usize, usize) {
        debug_assert!(k < self.total);
        let group = self.prefix_sum.partition_point(|&p| p <= k) - 1;
        (group, k - self.prefix_sum[group])
    }

    /// Global range covered by `task` when the items are split into
    /// `task_count` near-equal contiguous chunks.
    pub fn task_range(&self, task: usize, task_count: usize) -> Range<usize> {
        let k0 = task * self.total / task_count;
        let k1 = (task + 1) * self.total / task_count;
        k0..k1
    }

    /// Walk the global range `range`, folding `f` once per contiguous
    /// sub-range that lies within a single group.
    pub fn fold_range<A, F>(&self, range: Range<usize>, init: A, mut f: F) -> A
    where
        F: FnMut(A, usize, Range<usize>, usize) -> A,
    {
        let mut acc = init;
        if range.start >= range.end {
            return acc;
        }
        let (mut group, mut local) = self.start_indices(range.start);
        let mut k = range.start;
        while k < range.end {
            let n = self.sizes[group];
            let r0 = local;
            let r1 = n.min(r0 + (range.end - k));
            if r1 > r0 {
                acc = f(acc, group, r0..r1, k);
            }
            k += r1 - r0;
            local = 0;
            group += 1;
        }
        acc
    }

    fn task_count(&self, pool: &WorkerPool, min_step: usize) -> usize {
        let min_step = min_step.max(1);
        let wanted = self.total.div_ceil(min_step);
        if wanted <= 1 {
            wanted
        } else {
            wanted.min(pool.worker_count())
        }
    }
}

/// Visit every non-empty group in order on the calling thread.
///
/// `f(group, range, offset)` receives the whole group as `0..len` and the
/// global index of its first item.
pub fn sequential_for_for<J, F>(groups: &J, mut f: F)
where
    J: Jagged + ?Sized,
    F: FnMut(usize, Range<usize>, usize),
{
    let mut k = 0;
    for group in 0..groups.group_count() {
        let n = groups.group_len(group);
        if n > 0 {
            f(group, 0..n, k);
        }
        k += n;
    }
}

/// Visit every item of a jagged collection exactly once, in parallel.
///
/// `f(group, range, offset)` is called once per contiguous sub-range of one
/// group; `offset` is the global index of `range.start`. At most
/// `ceil(K / min_step)` tasks are created, capped at the pool's worker count.
/// A single task runs on the calling thread.
pub fn parallel_for_for<J, F>(pool: &WorkerPool, groups: &J, min_step: usize, f: F)
where
    J: Jagged + ?Sized,
    F: Fn(usize, Range<usize>, usize) + Sync + Send,
{
    let state = ForForState::new(groups);
    match state.task_count(pool, min_step) {
        0 => {}
        1 => sequential_for_for(groups, f),
        task_count => pool.run(task_count, |task| {
            state.fold_range(state.task_range(task, task_count), (), |(), g, r, k| {
                f(g, r, k)
            })
        }),
    }
}

/// Map-reduce over a jagged collection.
///
/// Uses the same partition as [`parallel_for_for`]. Each sub-range call
/// returns a value; values are reduced per task and the task results are then
/// reduced in task order, so the result does not depend on the worker count
/// as long as `reduce` is associative.
pub fn parallel_for_for_reduce<J, R, F, Op>(
    pool: &WorkerPool,
    groups: &J,
    min_step: usize,
    identity: R,
    f: F,
    reduce: Op,
) -> R
where
    J: Jagged + ?Sized,
    R: Clone + Send + Sync,
    F: Fn(usize, Range<usize>, usize) -> R + Sync + Send,
    Op: Fn(R, R) -> R + Sync + Send,
{
    let state = ForForState::new(groups);
    let task_count = state.task_count(pool, min_step);
    let fold = |acc: R, g: usize, r: Range<usize>, k: usize| reduce(acc, f(g, r, k));
    match task_count {
        0 => identity,
        1 => state.fold_range(0..state.len(), identity, fold),
        _ => {
            let partials = pool.map(task_count, |task| {
                state.fold_range(state.task_range(task, task_count), identity.clone(), fold)
            });
            partials.into_iter().fold(identity, &reduce)
        }
    }
}
