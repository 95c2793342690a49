use std::collections::HashMap;
use std::time::Instant;

use itertools::Itertools;
use tracing::{info, trace};

use crate::block::BlockId;
use crate::{Idx, Partition};

/// Selects how [`Partition::refine_with`] propagates splitters.
///
/// Both strategies drain the same worklist and arrive at the same coarsest
/// stable partition; they differ in how much work a single splitter costs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Hopcroft's "process the smaller half": predecessors of every child of
    /// the splitter except the largest are marked through precomputed
    /// preimages, and only marked blocks are cut. The largest child is
    /// skipped exactly once per splitter and function.
    #[default]
    Hopcroft,
    /// Moore-style propagation: every current block is scanned against the
    /// splitter and cut by which child its successors fall into. No
    /// preimages are materialized.
    Moore,
}

impl Partition {
    /// Makes the partition stable under the given transition functions using
    /// [`Strategy::Hopcroft`]. See [`Partition::refine_with`].
    pub fn refine<F>(&mut self, functions: &[F])
    where
        F: Fn(Idx) -> Idx,
    {
        self.refine_with(Strategy::Hopcroft, functions);
    }

    /// Makes the partition stable under the given transition functions: after
    /// this returns, two values share a block only if every function maps
    /// them into the same block. Drains the splitter worklist seeded by
    /// [`Partition::new`] and by earlier refinements, so repeating a call is
    /// a no-op.
    ///
    /// Every function must map the universe into itself.
    ///
    /// # Panics
    ///
    /// Panics when a transition function leaves `[0, n)`.
    pub fn refine_with<F>(&mut self, strategy: Strategy, functions: &[F])
    where
        F: Fn(Idx) -> Idx,
    {
        let start = Instant::now();
        match strategy {
            Strategy::Hopcroft => self.refine_hopcroft(functions),
            Strategy::Moore => self.refine_moore(functions),
        }
        info!(
            "{strategy:?} refinement under {} functions took {} μs and left {} blocks",
            functions.len(),
            start.elapsed().as_micros(),
            self.size
        );
        debug_assert!(self.consistent());
    }

    /// Process-the-smaller-half refinement. For every splitter and function,
    /// the predecessors of all children but the largest are marked by which
    /// child their successor lies in; each marked block is then cut into the
    /// marked subgroups, unmarked elements staying behind with the original
    /// handle.
    fn refine_hopcroft<F>(&mut self, functions: &[F])
    where
        F: Fn(Idx) -> Idx,
    {
        let n = self.elements.len();
        let preimages = functions
            .iter()
            .map(|function| preimage(function, n))
            .collect_vec();

        'drain: while self.size < n {
            let Some(splitter) = self.splitters.pop_front() else {
                break;
            };
            let borders = self.blocks[splitter].borders.clone();
            let splitter_witness = self.blocks[splitter].witness.clone();
            let largest = largest_child(&borders);
            trace!(
                "processing splitter {splitter} with {} children, skipping child {largest}",
                borders.len() - 1
            );

            for (index, preimage) in preimages.iter().enumerate() {
                // Mark the predecessors of every child but the largest,
                // remembering for each touched block which child each of its
                // elements maps into.
                let mut touched: Vec<BlockId> = Vec::new();
                let mut marks: HashMap<BlockId, Vec<Vec<usize>>> = HashMap::new();
                for (child, window) in borders.windows(2).enumerate() {
                    if child == largest {
                        continue;
                    }
                    for slot in window[0]..window[1] {
                        let successor = self.elements.value_at(slot);
                        for &predecessor in &preimage[successor] {
                            let block = self.elements.block_of(predecessor);
                            if self.blocks.len_of(block) == 1 {
                                continue;
                            }
                            let groups = marks.entry(block).or_insert_with(|| {
                                touched.push(block);
                                vec![Vec::new(); borders.len() - 1]
                            });
                            groups[child].push(predecessor);
                        }
                    }
                }

                let witness = self.extended_witness(index, &splitter_witness);
                for block in touched {
                    let groups = marks.remove(&block).expect("every touched block was marked");
                    if let Some(inner) = self.split_groups(block, groups, witness.clone()) {
                        self.splitters.push_back(inner);
                    }
                }
                if self.size == n {
                    break 'drain;
                }
            }
        }
    }

    /// Full-scan refinement. A block is cut against a splitter only when the
    /// successors of all its elements fall inside the splitter's range, in
    /// which case they are grouped by child exactly like a class-function
    /// split.
    fn refine_moore<F>(&mut self, functions: &[F])
    where
        F: Fn(Idx) -> Idx,
    {
        let n = self.elements.len();
        for (index, function) in functions.iter().enumerate() {
            for value in 0..n {
                let successor = function(value);
                assert!(
                    successor < n,
                    "transition function {index} maps {value} to {successor}, outside [0, {n})"
                );
            }
        }

        'drain: while self.size < n {
            let Some(splitter) = self.splitters.pop_front() else {
                break;
            };
            let borders = self.blocks[splitter].borders.clone();
            let splitter_witness = self.blocks[splitter].witness.clone();
            let (splitter_begin, splitter_end) = (borders[0], *borders.last().unwrap());
            let interior = &borders[1..borders.len() - 1];

            for (index, function) in functions.iter().enumerate() {
                let witness = self.extended_witness(index, &splitter_witness);
                let leaves = self.blocks().collect_vec();
                for block in leaves {
                    let (begin, end) = self.blocks.range(block);
                    if end - begin <= 1 {
                        continue;
                    }

                    // The window spanned by the successors of this block.
                    let (mut lo, mut hi) = (n, 0);
                    for slot in begin..end {
                        let successor = function(self.elements.value_at(slot));
                        let target = self.elements.slot_of(successor);
                        lo = lo.min(target);
                        hi = hi.max(target);
                    }
                    if lo < splitter_begin || hi >= splitter_end {
                        continue;
                    }

                    let mut groups = vec![Vec::new(); borders.len() - 1];
                    for slot in begin..end {
                        let value = self.elements.value_at(slot);
                        let target = self.elements.slot_of(function(value));
                        let child = interior.partition_point(|&border| border <= target);
                        groups[child].push(value);
                    }
                    if let Some(inner) = self.split_groups(block, groups, witness.clone()) {
                        self.splitters.push_back(inner);
                    }
                    if self.size == n {
                        break 'drain;
                    }
                }
            }
        }
    }

    /// The witness for a split driven by function `index` against a splitter:
    /// the function index prepended to the splitter's own witness.
    fn extended_witness(&self, index: usize, splitter: &Option<Vec<usize>>) -> Option<Vec<usize>> {
        if !self.record_witness {
            return None;
        }
        let rest = splitter.as_deref().unwrap_or_default();
        let mut witness = Vec::with_capacity(1 + rest.len());
        witness.push(index);
        witness.extend_from_slice(rest);
        Some(witness)
    }
}

/// The child of a splitter covering the most slots; ties go to the earliest.
fn largest_child(borders: &[usize]) -> usize {
    let mut largest = 0;
    let mut widest = 0;
    for (child, window) in borders.windows(2).enumerate() {
        let width = window[1] - window[0];
        if width > widest {
            widest = width;
            largest = child;
        }
    }
    largest
}

/// Materializes the preimage of `function` over `[0, n)` in one pass:
/// `preimage[y]` lists every `x` with `function(x) = y`.
fn preimage<F>(function: &F, n: usize) -> Vec<Vec<usize>>
where
    F: Fn(Idx) -> Idx,
{
    let mut table = vec![Vec::new(); n];
    for value in 0..n {
        let successor = function(value);
        assert!(
            successor < n,
            "transition function maps {value} to {successor}, outside [0, {n})"
        );
        table[successor].push(value);
    }
    table
}
