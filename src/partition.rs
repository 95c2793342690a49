use std::collections::VecDeque;
use std::fmt;

use bit_set::BitSet;
use itertools::Itertools;
use tracing::{debug, trace};

use crate::block::{BlockArena, BlockId};
use crate::elements::Elements;
use crate::Idx;

/// A refinable partition of the universe `[0, n)` together with its splitting
/// tree.
///
/// Construction applies a family of *class functions* (functions into a
/// bounded codomain) so that two values share a block exactly when they agree
/// on every class. [`Partition::refine`] then makes the partition stable
/// under a family of *transition functions* on the universe itself. Every
/// split is recorded as an inner node of the splitting tree, and when witness
/// recording is enabled each inner node carries a minimal-length sequence of
/// function indices justifying the split.
///
/// A `Partition` is single-owner; none of its methods are safe to call from
/// concurrent borrows of the same instance.
#[derive(Clone)]
pub struct Partition {
    pub(crate) elements: Elements,
    pub(crate) blocks: BlockArena,
    /// Inner nodes whose children still have to be propagated, in FIFO
    /// order. Newly created splitters always enqueue at the back; witness
    /// minimality depends on this breadth-first discipline.
    pub(crate) splitters: VecDeque<BlockId>,
    /// Number of active leaves.
    pub(crate) size: usize,
    pub(crate) record_witness: bool,
}

impl Partition {
    /// Constructs the initial partition of `[0, n)` under the given class
    /// functions, applied in index order. Every class function must map into
    /// `[0, degree)`.
    ///
    /// The resulting splitting tree has height at most `classes.len()`; the
    /// inner nodes produced here seed the splitter worklist that
    /// [`Partition::refine`] drains later.
    ///
    /// # Panics
    ///
    /// Panics when `degree` is zero or a class function returns a value
    /// outside `[0, degree)`.
    pub fn new<F>(n: usize, degree: usize, record_witness: bool, classes: &[F]) -> Self
    where
        F: Fn(Idx) -> Idx,
    {
        assert!(degree >= 1, "class functions need a codomain of at least one class");

        let mut partition = Self {
            elements: Elements::new(n),
            blocks: BlockArena::new(n),
            splitters: VecDeque::new(),
            size: 1,
            record_witness,
        };

        for (index, class) in classes.iter().enumerate() {
            let witness = record_witness.then(|| vec![index]);
            // Snapshot the ring before the pass so freshly created leaves are
            // not reprocessed against the same class function.
            let leaves = partition.blocks.leaves().collect_vec();
            for block in leaves {
                let (begin, end) = partition.blocks.range(block);
                let mut groups = vec![Vec::new(); degree];
                for slot in begin..end {
                    let value = partition.elements.value_at(slot);
                    let cls = class(value);
                    assert!(
                        cls < degree,
                        "class function {index} maps {value} to {cls}, outside [0, {degree})"
                    );
                    groups[cls].push(value);
                }
                if let Some(inner) = partition.split_groups(block, groups, witness.clone()) {
                    partition.splitters.push_back(inner);
                }
            }
        }

        debug!(
            "initial partition of [0, {n}) under {} class functions has {} blocks",
            classes.len(),
            partition.size
        );
        debug_assert!(partition.consistent());
        partition
    }

    /// The size of the universe.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the universe is empty.
    pub fn is_empty(&self) -> bool {
        self.elements.len() == 0
    }

    /// The current number of blocks, i.e. active leaves of the splitting
    /// tree.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The leaf holding `value`, or `None` when `value` lies outside the
    /// universe.
    pub fn block_of(&self, value: Idx) -> Option<BlockId> {
        (value < self.elements.len()).then(|| self.elements.block_of(value))
    }

    /// Iterates over the current blocks in ring order, i.e. right to left by
    /// slot position.
    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.leaves()
    }

    /// Iterates over the values covered by a block. For a leaf these are the
    /// values it currently holds; for an inner node, all values below it in
    /// the splitting tree.
    pub fn elements_of(&self, block: BlockId) -> impl Iterator<Item = Idx> + '_ {
        let (begin, end) = self.span(block);
        (begin..end).map(|slot| self.elements.value_at(slot))
    }

    /// The lowest splitting-tree node covering every given value. Values
    /// outside the universe are ignored; `None` is returned when nothing
    /// valid remains. When all values share a leaf, that leaf is the answer.
    pub fn lca<I>(&self, values: I) -> Option<BlockId>
    where
        I: IntoIterator<Item = Idx>,
    {
        let n = self.elements.len();
        let (mut lo, mut hi) = (usize::MAX, 0);
        for value in values.into_iter().filter(|&value| value < n) {
            let slot = self.elements.slot_of(value);
            lo = lo.min(slot);
            hi = hi.max(slot);
        }
        if lo > hi {
            return None;
        }
        // Ascend from the leaf holding the leftmost slot until the node also
        // covers the rightmost one. Ancestor ranges are frozen at creation,
        // so `end` alone decides coverage.
        let mut current = self.elements.block_at(lo);
        while self.blocks[current].end <= hi {
            current = self.blocks[current]
                .parent
                .expect("the splitting-tree root covers every slot");
        }
        Some(current)
    }

    /// A minimal-length sequence of function indices distinguishing two
    /// values: all entries but the last index transition functions, applied
    /// left to right, and the final entry indexes the class function telling
    /// the results apart.
    ///
    /// Returns `None` when the values share a leaf, when either lies outside
    /// the universe, or when witness recording was disabled.
    pub fn witness(&self, value: Idx, other: Idx) -> Option<&[Idx]> {
        let lca = self.lca([value, other])?;
        self.blocks[lca].witness.as_deref()
    }

    /// The slot range covered by a node: the live ring range for a leaf, the
    /// frozen range for an inner node.
    pub(crate) fn span(&self, block: BlockId) -> (usize, usize) {
        let record = &self.blocks[block];
        if record.is_inner() {
            (record.borders[0], record.end)
        } else {
            self.blocks.range(block)
        }
    }

    /// Relocates the element at `slot` into `target`, which must lie on the
    /// ring path from the element's current leaf. Each step swaps the element
    /// to the boundary of the next leaf and advances that boundary by one.
    pub(crate) fn move_to(&mut self, slot: usize, target: BlockId) {
        let mut slot = slot;
        let mut current = self.elements.block_at(slot);
        while current != target {
            let next = self.blocks[current].next;
            assert!(
                next != BlockId::ROOT,
                "relocation target {target} is not reachable from {current}: the leaf ring is corrupt"
            );
            let boundary = self.blocks[next].end;
            self.elements.swap(slot, boundary);
            self.blocks[next].end += 1;
            self.elements.set_block(boundary, next);
            slot = boundary;
            current = next;
        }
    }

    /// Splits leaf `block` into subblocks given by `groups`: the values in
    /// `groups[k]` end up in their own leaf, in ascending group order from
    /// the left edge of the block; values in no group keep the original
    /// handle. Groups may cover the block partially (refinement marking) or
    /// completely (class-function splits); in the latter case the rightmost
    /// subblock is folded back into the original handle so no leaf is ever
    /// left empty.
    ///
    /// Returns the freshly created inner node carrying `witness`, or `None`
    /// when the grouping does not actually divide the block.
    pub(crate) fn split_groups(
        &mut self,
        block: BlockId,
        groups: Vec<Vec<usize>>,
        witness: Option<Vec<usize>>,
    ) -> Option<BlockId> {
        let (begin, end) = self.blocks.range(block);
        let total: usize = groups.iter().map(Vec::len).sum();
        let nonempty = groups.iter().filter(|group| !group.is_empty()).count();
        debug_assert!(total <= end - begin);
        if nonempty == 0 || (nonempty == 1 && total == end - begin) {
            return None;
        }

        let parent = self.blocks[block].parent;
        let depth = self.blocks[block].depth;
        let inner = self.blocks.acquire();

        let mut borders = Vec::with_capacity(nonempty + 2);
        borders.push(begin);
        for group in groups.into_iter().filter(|group| !group.is_empty()) {
            let sub = self.blocks.acquire();
            self.blocks.insert_after(block, sub);
            self.blocks[sub].parent = Some(inner);
            self.blocks[sub].depth = depth + 1;
            for value in group {
                self.move_to(self.elements.slot_of(value), sub);
            }
            borders.push(self.blocks[sub].end);
            self.size += 1;
        }

        if self.blocks.len_of(block) == 0 {
            // Every element was grouped. Fold the rightmost sibling back into
            // the original handle: retag its slots, splice it out of the ring
            // and return its handle to the pool. This keeps the original
            // handle alive, which matters in particular for the permanent
            // chain head.
            let sibling = self.blocks[block].next;
            let (sibling_begin, sibling_end) = self.blocks.range(sibling);
            debug_assert_eq!(sibling_end, end);
            for slot in sibling_begin..sibling_end {
                self.elements.set_block(slot, block);
            }
            self.blocks[block].next = self.blocks[sibling].next;
            self.blocks.release(sibling);
            self.size -= 1;
            // `borders` already closes at `end` through the folded sibling.
        } else {
            borders.push(end);
        }

        self.blocks[block].parent = Some(inner);
        self.blocks[block].depth = depth + 1;

        let record = &mut self.blocks[inner];
        record.end = end;
        record.next = BlockId::ROOT;
        record.parent = parent;
        record.depth = depth;
        record.borders = borders;
        record.witness = witness;

        trace!("split {block} at depth {depth} into {nonempty} marked subblocks under {inner}");
        Some(inner)
    }

    /// Structural self-check used by tests and debug assertions: the ring
    /// covers the slot space right to left without gaps or repeats, slot tags
    /// agree with the ring, the inverse index round-trips, and parent chains
    /// ascend to depth zero through strictly containing ranges.
    pub(crate) fn consistent(&self) -> bool {
        let n = self.elements.len();
        for slot in 0..n {
            if self.elements.slot_of(self.elements.value_at(slot)) != slot {
                return false;
            }
        }

        let mut seen = BitSet::new();
        let mut count = 0;
        let mut expected_end = n;
        for leaf in self.blocks.leaves() {
            if self.blocks[leaf].is_inner() || !seen.insert(leaf.index()) {
                return false;
            }
            count += 1;
            let (begin, end) = self.blocks.range(leaf);
            if end != expected_end || begin > end || (begin == end && n > 0) {
                return false;
            }
            expected_end = begin;
            if (begin..end).any(|slot| self.elements.block_at(slot) != leaf) {
                return false;
            }

            let mut node = leaf;
            let (mut lo, mut hi) = (begin, end);
            while let Some(parent) = self.blocks[node].parent {
                let record = &self.blocks[parent];
                if !record.is_inner() || record.depth + 1 != self.blocks[node].depth {
                    return false;
                }
                if record.borders[0] > lo || record.end < hi {
                    return false;
                }
                (lo, hi) = (record.borders[0], record.end);
                node = parent;
            }
            if self.blocks[node].depth != 0 {
                return false;
            }
        }
        count == self.size && expected_end == 0
    }
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.blocks()
                .map(|block| format!("[{}]", self.elements_of(block).join(" ")))
                .join(" ")
        )
    }
}
