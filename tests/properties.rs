//! Property-based tests over randomly generated function families, checking
//! the refinement engine against an independent signature-refinement oracle.

use std::collections::HashMap;

use coarsest::{Partition, Strategy as Method};
use itertools::Itertools;
use proptest::prelude::*;

/// A random machine: universe size, class-function tables with values below
/// `DEGREE`, and transition tables into the universe.
type Machine = (usize, Vec<Vec<usize>>, Vec<Vec<usize>>);

const DEGREE: usize = 3;

fn machine(max_states: usize) -> impl Strategy<Value = Machine> {
    (1..max_states).prop_flat_map(|n| {
        (
            Just(n),
            prop::collection::vec(prop::collection::vec(0..DEGREE, n), 1..3),
            prop::collection::vec(prop::collection::vec(0..n, n), 1..3),
        )
    })
}

fn table_functions(tables: &[Vec<usize>]) -> Vec<impl Fn(usize) -> usize + '_> {
    tables.iter().map(|table| move |x: usize| table[x]).collect_vec()
}

/// Canonicalizes a list of signatures into class identifiers in first-seen
/// order.
fn assign_ids(signatures: impl Iterator<Item = Vec<usize>>) -> Vec<usize> {
    let mut ids: HashMap<Vec<usize>, usize> = HashMap::new();
    signatures
        .map(|signature| {
            let fresh = ids.len();
            *ids.entry(signature).or_insert(fresh)
        })
        .collect()
}

/// Naive coarsest-refinement oracle: start from output signatures and refine
/// by (own class, successor classes) signatures until the class count stops
/// growing.
fn reference_classes(n: usize, outputs: &[Vec<usize>], transitions: &[Vec<usize>]) -> Vec<usize> {
    let mut classes =
        assign_ids((0..n).map(|x| outputs.iter().map(|output| output[x]).collect_vec()));
    loop {
        let refined = assign_ids((0..n).map(|x| {
            let mut signature = vec![classes[x]];
            signature.extend(transitions.iter().map(|transition| classes[transition[x]]));
            signature
        }));
        if refined.iter().max() == classes.iter().max() {
            return classes;
        }
        classes = refined;
    }
}

/// Replays a witness: every entry but the last steps through a transition
/// function, the final entry classifies.
fn replay(witness: &[usize], outputs: &[Vec<usize>], transitions: &[Vec<usize>], start: usize) -> usize {
    let (&class, steps) = witness.split_last().expect("witnesses are never empty");
    let mut state = start;
    for &step in steps {
        state = transitions[step][state];
    }
    outputs[class][state]
}

/// Whether any sequence of fewer than `length` indices tells `x` and `y`
/// apart. Sequences consist of transition steps followed by one classifying
/// index.
fn shorter_sequence_separates(
    length: usize,
    outputs: &[Vec<usize>],
    transitions: &[Vec<usize>],
    x: usize,
    y: usize,
) -> bool {
    for steps in 0..length.saturating_sub(1) {
        let mut stems: Vec<Vec<usize>> = vec![vec![]];
        for _ in 0..steps {
            stems = stems
                .into_iter()
                .flat_map(|stem| {
                    (0..transitions.len()).map(move |step| {
                        let mut longer = stem.clone();
                        longer.push(step);
                        longer
                    })
                })
                .collect();
        }
        for stem in stems {
            for class in 0..outputs.len() {
                let mut candidate = stem.clone();
                candidate.push(class);
                if replay(&candidate, outputs, transitions, x)
                    != replay(&candidate, outputs, transitions, y)
                {
                    return true;
                }
            }
        }
    }
    false
}

proptest! {
    /// Construction groups values exactly by their class signatures.
    #[test]
    fn initial_blocks_group_by_class((n, outputs, _) in machine(24)) {
        let classes = table_functions(&outputs);
        let partition = Partition::new(n, DEGREE, false, &classes);
        for x in 0..n {
            for y in 0..n {
                let same_signature = outputs.iter().all(|output| output[x] == output[y]);
                prop_assert_eq!(partition.block_of(x) == partition.block_of(y), same_signature);
            }
        }
    }

    /// The refined partition equals the coarsest bisimulation computed by the
    /// oracle, for either strategy.
    #[test]
    fn refinement_matches_the_oracle((n, outputs, transitions) in machine(24)) {
        let reference = reference_classes(n, &outputs, &transitions);
        for strategy in [Method::Hopcroft, Method::Moore] {
            let classes = table_functions(&outputs);
            let successors = table_functions(&transitions);
            let mut partition = Partition::new(n, DEGREE, false, &classes);
            partition.refine_with(strategy, &successors);
            for x in 0..n {
                for y in 0..n {
                    prop_assert_eq!(
                        partition.block_of(x) == partition.block_of(y),
                        reference[x] == reference[y],
                        "strategy {:?} disagrees with the oracle on {} and {}", strategy, x, y
                    );
                }
            }
        }
    }

    /// Both strategies compute the same partition.
    #[test]
    fn strategies_agree((n, outputs, transitions) in machine(24)) {
        let classes = table_functions(&outputs);
        let successors = table_functions(&transitions);
        let mut hopcroft = Partition::new(n, DEGREE, false, &classes);
        hopcroft.refine_with(Method::Hopcroft, &successors);
        let mut moore = Partition::new(n, DEGREE, false, &classes);
        moore.refine_with(Method::Moore, &successors);
        prop_assert_eq!(hopcroft.size(), moore.size());
        for x in 0..n {
            for y in 0..n {
                prop_assert_eq!(
                    hopcroft.block_of(x) == hopcroft.block_of(y),
                    moore.block_of(x) == moore.block_of(y)
                );
            }
        }
    }

    /// Every recorded witness really distinguishes its pair when replayed,
    /// under either strategy.
    #[test]
    fn witnesses_separate_their_pairs((n, outputs, transitions) in machine(16)) {
        for strategy in [Method::Hopcroft, Method::Moore] {
            let classes = table_functions(&outputs);
            let successors = table_functions(&transitions);
            let mut partition = Partition::new(n, DEGREE, true, &classes);
            partition.refine_with(strategy, &successors);
            for x in 0..n {
                for y in 0..n {
                    match partition.witness(x, y) {
                        None => prop_assert_eq!(partition.block_of(x), partition.block_of(y)),
                        Some(witness) => {
                            prop_assert_ne!(
                                replay(witness, &outputs, &transitions, x),
                                replay(witness, &outputs, &transitions, y),
                                "witness {:?} fails to separate {} and {}", witness, x, y
                            );
                        }
                    }
                }
            }
        }
    }

    /// Recorded witnesses have minimal length. Checked by brute force, so
    /// only short witnesses are examined.
    #[test]
    fn witnesses_are_minimal((n, outputs, transitions) in machine(12)) {
        for strategy in [Method::Hopcroft, Method::Moore] {
            let classes = table_functions(&outputs);
            let successors = table_functions(&transitions);
            let mut partition = Partition::new(n, DEGREE, true, &classes);
            partition.refine_with(strategy, &successors);
            for x in 0..n {
                for y in x + 1..n {
                    if let Some(witness) = partition.witness(x, y) {
                        if witness.len() > 4 {
                            continue;
                        }
                        prop_assert!(
                            !shorter_sequence_separates(witness.len(), &outputs, &transitions, x, y),
                            "{:?} witness {:?} for {} and {} is not minimal", strategy, witness, x, y
                        );
                    }
                }
            }
        }
    }

    /// Leaf counts stay bounded and the blocks cover the universe.
    #[test]
    fn leaf_count_is_bounded((n, outputs, transitions) in machine(24)) {
        let classes = table_functions(&outputs);
        let successors = table_functions(&transitions);
        let mut partition = Partition::new(n, DEGREE, false, &classes);
        partition.refine(&successors);
        prop_assert!(partition.size() <= n);
        prop_assert_eq!(partition.blocks().count(), partition.size());
        let covered: usize = partition.blocks().map(|b| partition.elements_of(b).count()).sum();
        prop_assert_eq!(covered, n);
    }

    /// Refining a stable partition again changes nothing.
    #[test]
    fn refinement_is_idempotent((n, outputs, transitions) in machine(24)) {
        let classes = table_functions(&outputs);
        let successors = table_functions(&transitions);
        let mut partition = Partition::new(n, DEGREE, true, &classes);
        partition.refine(&successors);
        let stable = format!("{partition:?}");
        partition.refine(&successors);
        prop_assert_eq!(format!("{partition:?}"), stable);
    }
}
