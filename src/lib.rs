//! Coarsest partition refinement for finite universes of integers.
//!
//! Given the universe `N = [0, n)` and a family of total functions `N -> N`,
//! this crate computes the coarsest partition of `N` that is *stable* under
//! every function: two values end up in the same block if and only if every
//! function maps them into the same block. This is the kernel of Moore and
//! Hopcroft automaton minimization and of the Paige–Tarjan coarsest-refinement
//! algorithm.
//!
//! ## Splitting trees
//!
//! Refinement history is kept as a *splitting tree*: a rooted tree whose
//! leaves are the current blocks, whose root covers all of `N`, and whose
//! inner nodes record which function applications drove each split. When
//! witness recording is enabled, every inner node carries a minimal-length
//! sequence of function indices that distinguishes values in different
//! children, so [`Partition::witness`] can answer "why are these two values
//! inequivalent" in constant time after refinement.
//!
//! ## Quick start
//!
//! Partition `[0, 100)` by halves and parity, then refine under rotation:
//!
//! ```
//! use coarsest::Partition;
//!
//! let classes: [fn(usize) -> usize; 2] = [|i| usize::from(i >= 50), |i| i % 2];
//! let mut partition = Partition::new(100, 2, true, &classes);
//! assert_eq!(partition.size(), 4);
//!
//! // 5 and 55 differ in the first class function, so one step suffices.
//! assert_eq!(partition.witness(5, 55).map(|w| w.len()), Some(1));
//!
//! let rotate: [fn(usize) -> usize; 1] = [|i| (i + 1) % 100];
//! partition.refine(&rotate);
//! assert!(partition.size() >= 4);
//! ```
//!
//! Class and transition functions are plain callables; they must be pure,
//! total and deterministic on `[0, n)`. Passing a function whose result falls
//! outside its declared codomain is a programming error and panics.

#![warn(missing_docs)]

mod block;
mod elements;
mod partition;
mod refine;

pub use block::BlockId;
pub use partition::Partition;
pub use refine::Strategy;

/// Type for universe values, slot positions and function indices.
pub type Idx = usize;
