use std::fmt;
use std::ops::{Index, IndexMut};

/// Handle addressing a block record in the block arena.
///
/// Handles are dense integers below `2n - 1` for a universe of size `n`, the
/// maximum node count of a splitting tree with `n` leaves. Handle `0` is the
/// permanent chain head of the leaf ring and doubles as the ring sentinel;
/// it is created at construction and never released.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) usize);

impl BlockId {
    pub(crate) const ROOT: BlockId = BlockId(0);

    /// The raw arena index of this handle.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// A block record. Leaves carry a live slot range and a ring link; inner
/// nodes freeze their range in `borders` at the moment they are created and
/// are never touched again, apart from answering ancestry queries.
#[derive(Clone, Debug, Default)]
pub(crate) struct Block {
    /// One past the last slot covered by this block. For a leaf this is a
    /// live boundary; for an inner node it is frozen at creation time.
    pub(crate) end: usize,
    /// Ring successor: the active leaf immediately to the left in slot
    /// order. [`BlockId::ROOT`] marks the leftmost leaf. Meaningless on
    /// inner nodes.
    pub(crate) next: BlockId,
    /// Parent in the splitting tree, `None` on the tree root.
    pub(crate) parent: Option<BlockId>,
    /// Distance to the tree root.
    pub(crate) depth: usize,
    /// Child slot boundaries of an inner node, from the leftmost child's
    /// begin up to and including `end`. Empty on leaves.
    pub(crate) borders: Vec<usize>,
    /// Minimal distinguishing sequence, recorded on inner nodes only.
    pub(crate) witness: Option<Vec<usize>>,
}

impl Block {
    pub(crate) fn is_inner(&self) -> bool {
        !self.borders.is_empty()
    }
}

/// Bounded arena of block records with a free pool of handles.
///
/// Records are allocated by bumping into the backing vector and recycled
/// through a free list; the live total can never exceed `2n - 1` because a
/// splitting tree with at most `n` leaves has at most `n - 1` inner nodes.
#[derive(Clone, Debug)]
pub(crate) struct BlockArena {
    records: Vec<Block>,
    free: Vec<BlockId>,
    limit: usize,
}

impl BlockArena {
    /// Creates the arena with the permanent root leaf covering `[0, n)`.
    pub(crate) fn new(n: usize) -> Self {
        let root = Block {
            end: n,
            ..Block::default()
        };
        Self {
            records: vec![root],
            free: Vec::new(),
            limit: (2 * n).saturating_sub(1).max(1),
        }
    }

    /// Hands out an unused handle, panicking when the pool is exhausted.
    /// Exhaustion cannot happen unless ring bookkeeping has lost a block.
    pub(crate) fn acquire(&mut self) -> BlockId {
        if let Some(handle) = self.free.pop() {
            return handle;
        }
        assert!(
            self.records.len() < self.limit,
            "block arena exhausted: more than {} records requested",
            self.limit
        );
        let handle = BlockId(self.records.len());
        self.records.push(Block::default());
        handle
    }

    /// Returns a handle to the free pool. The root handle is permanent.
    pub(crate) fn release(&mut self, handle: BlockId) {
        debug_assert!(
            handle != BlockId::ROOT,
            "the root handle must never be released"
        );
        self.free.push(handle);
    }

    /// Number of live records, leaves and inner nodes combined.
    pub(crate) fn allocated(&self) -> usize {
        self.records.len() - self.free.len()
    }

    /// Splices a fresh, empty leaf between `block` and its ring successor.
    /// The new leaf's `end` is the boundary that currently separates `block`
    /// from its left neighbour, so it starts out covering no slots and grows
    /// as elements are pushed into it.
    pub(crate) fn insert_after(&mut self, block: BlockId, handle: BlockId) {
        let (begin, _) = self.range(block);
        let next = self[block].next;
        self.records[handle.0] = Block {
            end: begin,
            next,
            ..Block::default()
        };
        self[block].next = handle;
    }

    /// The slot range `[begin, end)` of an active leaf. `begin` is recovered
    /// by looking one step along the ring.
    pub(crate) fn range(&self, block: BlockId) -> (usize, usize) {
        let record = &self[block];
        let begin = if record.next == BlockId::ROOT {
            0
        } else {
            self[record.next].end
        };
        (begin, record.end)
    }

    pub(crate) fn len_of(&self, block: BlockId) -> usize {
        let (begin, end) = self.range(block);
        end - begin
    }

    /// Iterates over the active leaves in ring order, i.e. right to left by
    /// slot index, starting at the chain head.
    pub(crate) fn leaves(&self) -> Leaves<'_> {
        Leaves {
            arena: self,
            current: Some(BlockId::ROOT),
        }
    }
}

impl Index<BlockId> for BlockArena {
    type Output = Block;

    fn index(&self, handle: BlockId) -> &Block {
        &self.records[handle.0]
    }
}

impl IndexMut<BlockId> for BlockArena {
    fn index_mut(&mut self, handle: BlockId) -> &mut Block {
        &mut self.records[handle.0]
    }
}

/// Iterator over the leaf ring.
pub(crate) struct Leaves<'a> {
    arena: &'a BlockArena,
    current: Option<BlockId>,
}

impl<'a> Iterator for Leaves<'a> {
    type Item = BlockId;

    fn next(&mut self) -> Option<Self::Item> {
        let leaf = self.current?;
        let successor = self.arena[leaf].next;
        self.current = (successor != BlockId::ROOT).then_some(successor);
        Some(leaf)
    }
}
