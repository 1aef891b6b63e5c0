//! Parallel radix sort of Morton codes.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use bvhkit_parallel::WorkerPool;

const RADIX_BITS: u32 = 11;
const RADIX_BUCKETS: usize = 1 << RADIX_BITS;
const RADIX_MASK: u64 = (RADIX_BUCKETS - 1) as u64;

/// Passes covering a 30-bit code.
const PASSES: u32 = 3;

/// Minimum number of items a sorting task is given.
const MIN_ITEMS_PER_TASK: usize = 1024;

fn digit(v: u64, pass: u32) -> usize {
    ((v >> (32 + pass * RADIX_BITS)) & RADIX_MASK) as usize
}

/// A Morton code paired with the index of the reference it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MortonId {
    /// 30-bit interleaved lattice coordinate.
    pub code: u32,
    /// Index into the reference array.
    pub index: u32,
}

impl MortonId {
    fn pack(self) -> u64 {
        (u64::from(self.code) << 32) | u64::from(self.index)
    }

    fn unpack(v: u64) -> Self {
        Self {
            code: (v >> 32) as u32,
            index: v as u32,
        }
    }
}

/// Stable sort by `code`.
///
/// Least-significant-digit radix sort with 11-bit digits: each task builds a
/// histogram of its chunk, histograms are prefix-summed bucket-major so that
/// earlier tasks scatter before later ones within a bucket, and items ping-pong
/// between two buffers. The result equals a sequential stable sort for any
/// worker count. Inputs shorter than `parallel_threshold` run the same passes
/// on the calling thread.
pub fn radix_sort(pool: &WorkerPool, items: &mut [MortonId], parallel_threshold: usize) {
    let n = items.len();
    let task_count = n.div_ceil(MIN_ITEMS_PER_TASK).min(pool.worker_count());
    if n < parallel_threshold || task_count <= 1 {
        sequential_radix_sort(items);
        return;
    }

    let chunk = |task: usize| -> Range<usize> { task * n / task_count..(task + 1) * n / task_count };
    let mut src: Vec<AtomicU64> = items.iter().map(|m| AtomicU64::new(m.pack())).collect();
    let mut dst: Vec<AtomicU64> = (0..n).map(|_| AtomicU64::new(0)).collect();

    for pass in 0..PASSES {
        let mut offsets = pool.map(task_count, |task| {
            let mut histogram = vec![0usize; RADIX_BUCKETS];
            for slot in &src[chunk(task)] {
                histogram[digit(slot.load(Ordering::Relaxed), pass)] += 1;
            }
            histogram
        });

        let mut sum = 0;
        for bucket in 0..RADIX_BUCKETS {
            for histogram in offsets.iter_mut() {
                let count = histogram[bucket];
                histogram[bucket] = sum;
                sum += count;
            }
        }

        pool.run(task_count, |task| {
            let mut next = offsets[task].clone();
            for slot in &src[chunk(task)] {
                let v = slot.load(Ordering::Relaxed);
                let d = digit(v, pass);
                dst[next[d]].store(v, Ordering::Relaxed);
                next[d] += 1;
            }
        });

        std::mem::swap(&mut src, &mut dst);
    }

    for (item, slot) in items.iter_mut().zip(&src) {
        *item = MortonId::unpack(slot.load(Ordering::Relaxed));
    }
}

fn sequential_radix_sort(items: &mut [MortonId]) {
    if items.len() <= 1 {
        return;
    }
    let mut src: Vec<u64> = items.iter().map(|m| m.pack()).collect();
    let mut dst = vec![0u64; src.len()];
    for pass in 0..PASSES {
        let mut offsets = vec![0usize; RADIX_BUCKETS];
        for &v in &src {
            offsets[digit(v, pass)] += 1;
        }
        let mut sum = 0;
        for offset in offsets.iter_mut() {
            let count = *offset;
            *offset = sum;
            sum += count;
        }
        for &v in &src {
            let d = digit(v, pass);
            dst[offsets[d]] = v;
            offsets[d] += 1;
        }
        std::mem::swap(&mut src, &mut dst);
    }
    for (item, v) in items.iter_mut().zip(src) {
        *item = MortonId::unpack(v);
    }
}
