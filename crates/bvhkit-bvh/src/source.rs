//! Primitive sources and reference generation.

use bvhkit_math::Aabb3;
use bvhkit_parallel::{parallel_for_for_reduce, Jagged, WorkerPool};

use crate::prim_ref::{PrimInfo, PrimRef};

/// Minimum number of primitives per task when generating references.
const PRIM_REF_STEP: usize = 1024;

/// Scene data a hierarchy is built over.
///
/// Groups are geometries and items are their primitives. Leaves are stored as
/// runs of blocks, each packing up to [`PrimitiveSource::BLOCK_CAPACITY`]
/// primitives.
pub trait PrimitiveSource: Jagged {
    /// Leaf block produced by [`PrimitiveSource::fill_block`].
    type Block: Send + Sync;

    /// Maximum number of primitives per block.
    const BLOCK_CAPACITY: usize;

    /// Bounds of primitive `prim` of group `geom`.
    ///
    /// Returns `None` for primitives that should be left out of the
    /// hierarchy. Non-finite bounds are skipped as well.
    fn primitive_bounds(&self, geom: usize, prim: usize) -> Option<Aabb3>;

    /// Pack up to `BLOCK_CAPACITY` referenced primitives into one block.
    fn fill_block(&self, prims: &[PrimRef]) -> Self::Block;

    /// Number of blocks needed for `count` primitives.
    fn blocks(count: usize) -> usize {
        count.div_ceil(Self::BLOCK_CAPACITY)
    }
}

/// Collect a reference for every valid primitive of `source`, in group order.
pub fn create_prim_refs<S>(pool: &WorkerPool, source: &S) -> (Vec<PrimRef>, PrimInfo)
where
    S: PrimitiveSource + ?Sized,
{
    parallel_for_for_reduce(
        pool,
        source,
        PRIM_REF_STEP,
        (Vec::new(), PrimInfo::empty()),
        |geom, range, _| {
            let mut prims = Vec::with_capacity(range.len());
            let mut info = PrimInfo::empty();
            for prim in range {
                let Some(bounds) = source.primitive_bounds(geom, prim) else {
                    continue;
                };
                if !bounds.is_valid() {
                    continue;
                }
                let prim = PrimRef::new(bounds, geom as u32, prim as u32);
                info.add(&prim);
                prims.push(prim);
            }
            (prims, info)
        },
        |(mut prims, info), (more, more_info)| {
            prims.extend(more);
            (prims, info.merge(&more_info))
        },
    )
}

/// Number of primitives in a [`BoxBlock`].
pub const BOX_BLOCK_SIZE: usize = 4;

/// Groups of plain boxes, one primitive per box.
#[derive(Debug, Clone, Default)]
pub struct BoxSource {
    groups: Vec<Vec<Aabb3>>,
}

impl BoxSource {
    /// Wrap existing groups of boxes.
    pub fn new(groups: Vec<Vec<Aabb3>>) -> Self {
        Self { groups }
    }

    /// Append a group and return its id.
    pub fn push_group(&mut self, boxes: Vec<Aabb3>) -> u32 {
        self.groups.push(boxes);
        (self.groups.len() - 1) as u32
    }

    /// All groups.
    pub fn groups(&self) -> &[Vec<Aabb3>] {
        &self.groups
    }

    /// Total number of boxes over all groups.
    pub fn primitive_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }
}

impl Jagged for BoxSource {
    fn group_count(&self) -> usize {
        self.groups.len()
    }

    fn group_len(&self, group: usize) -> usize {
        self.groups[group].len()
    }
}

impl PrimitiveSource for BoxSource {
    type Block = BoxBlock;
    const BLOCK_CAPACITY: usize = BOX_BLOCK_SIZE;

    fn primitive_bounds(&self, geom: usize, prim: usize) -> Option<Aabb3> {
        self.groups.get(geom)?.get(prim).copied()
    }

    fn fill_block(&self, prims: &[PrimRef]) -> BoxBlock {
        BoxBlock::from_refs(prims)
    }
}

/// Leaf block of a [`BoxSource`]: up to four references.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxBlock {
    len: usize,
    entries: [PrimRef; BOX_BLOCK_SIZE],
}

impl BoxBlock {
    /// Pack the first `BOX_BLOCK_SIZE` references of `prims`.
    pub fn from_refs(prims: &[PrimRef]) -> Self {
        let placeholder = PrimRef::new(Aabb3::empty(), u32::MAX, u32::MAX);
        let mut entries = [placeholder; BOX_BLOCK_SIZE];
        let len = prims.len().min(BOX_BLOCK_SIZE);
        entries[..len].copy_from_slice(&prims[..len]);
        Self { len, entries }
    }

    /// Stored references.
    pub fn prims(&self) -> &[PrimRef] {
        &self.entries[..self.len]
    }

    /// Number of stored references.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the block holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Union of the stored bounds.
    pub fn bounds(&self) -> Aabb3 {
        self.prims().iter().map(|p| &p.bounds).collect()
    }
}

impl Default for BoxBlock {
    fn default() -> Self {
        Self::from_refs(&[])
    }
}
