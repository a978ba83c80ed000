// Brzozowski minimization: determinize(reverse(determinize(reverse(A)))).
//
// Every step is a pure function from one graph to a new one. The result is
// the minimal deterministic automaton over the alphabet's symbols with all
// states reachable and co-reachable. Wildcard symbols are ordinary labels
// here; their "matches anything" meaning only exists at match time.

use std::collections::{BTreeMap, BTreeSet};

use hashbrown::HashMap;

use crate::StateId;
use crate::automaton::Automaton;
use crate::builder::TransducerBuilder;
use crate::symbols::SymbolId;
use crate::transition::Transition;

pub fn minimize(nfa: &TransducerBuilder) -> Automaton {
    let dfa = determinize(&reverse(&determinize(&reverse(nfa))));
    Automaton::from_arcs(dfa.arcs, dfa.finals)
}

/// Reverse every arc; finals become initials and initials become finals.
pub(crate) fn reverse(graph: &TransducerBuilder) -> TransducerBuilder {
    let initials = graph
        .finals
        .iter()
        .enumerate()
        .filter(|(_, f)| **f)
        .map(|(s, _)| s as StateId)
        .collect();
    let mut reversed = TransducerBuilder::with_states(graph.state_count(), initials);
    for (source, arcs) in graph.arcs.iter().enumerate() {
        for arc in arcs {
            reversed.link(arc.target, source as StateId, arc.symbol);
        }
    }
    for &s in &graph.initials {
        reversed.set_final(s);
    }
    reversed
}

/// Subset construction. The result has the single initial state 0.
pub(crate) fn determinize(graph: &TransducerBuilder) -> TransducerBuilder {
    let start: Vec<StateId> = graph
        .initials
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut index: HashMap<Vec<StateId>, StateId> = HashMap::new();
    let mut subsets: Vec<Vec<StateId>> = vec![start.clone()];
    index.insert(start, 0);

    let mut arcs: Vec<Vec<Transition>> = Vec::new();
    let mut finals: Vec<bool> = Vec::new();

    let mut next = 0;
    while next < subsets.len() {
        let subset = subsets[next].clone();
        next += 1;

        let mut moves: BTreeMap<SymbolId, BTreeSet<StateId>> = BTreeMap::new();
        for &s in &subset {
            for arc in &graph.arcs[s as usize] {
                moves.entry(arc.symbol).or_default().insert(arc.target);
            }
        }

        let mut out = Vec::with_capacity(moves.len());
        for (symbol, targets) in moves {
            let key: Vec<StateId> = targets.into_iter().collect();
            let target = match index.get(&key) {
                Some(&id) => id,
                None => {
                    let id = subsets.len() as StateId;
                    index.insert(key.clone(), id);
                    subsets.push(key);
                    id
                }
            };
            out.push(Transition::new(symbol, target));
        }
        arcs.push(out);
        finals.push(subset.iter().any(|&s| graph.finals[s as usize]));
    }

    TransducerBuilder {
        initials: vec![0],
        arcs,
        finals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Does the automaton accept exactly this symbol string (no wildcards)?
    fn accepts(a: &Automaton, input: &[SymbolId]) -> bool {
        let mut state = a.start();
        for &s in input {
            state.step(s);
        }
        state.finals().next().is_some()
    }

    #[test]
    fn merges_common_prefix_and_suffix() {
        // "abc" and "xbc" built as two separate chains.
        let mut b = TransducerBuilder::new();
        for word in [[10, 11, 12], [20, 11, 12]] {
            let mut s = 0;
            for sym in word {
                s = b.add_arc(s, sym);
            }
            b.set_final(s);
        }
        assert_eq!(b.state_count(), 7);
        let a = b.minimize();
        // initial, after a|x, after b, final
        assert_eq!(a.state_count(), 4);
        assert!(accepts(&a, &[10, 11, 12]));
        assert!(accepts(&a, &[20, 11, 12]));
        assert!(!accepts(&a, &[10, 11]));
        assert!(!accepts(&a, &[11, 12]));
    }

    #[test]
    fn result_is_deterministic() {
        let mut b = TransducerBuilder::new();
        let s1 = b.add_arc(0, 1);
        let s2 = b.add_arc(0, 1);
        let f1 = b.add_arc(s1, 2);
        let f2 = b.add_arc(s2, 3);
        b.set_final(f1);
        b.set_final(f2);
        let a = b.minimize();
        for state in 0..a.state_count() as StateId {
            let arcs = a.transitions(state);
            for pair in arcs.windows(2) {
                assert_ne!(pair[0].symbol, pair[1].symbol);
            }
        }
        assert!(accepts(&a, &[1, 2]));
        assert!(accepts(&a, &[1, 3]));
    }

    #[test]
    fn keeps_self_loops() {
        let mut b = TransducerBuilder::new();
        let s = b.add_arc(0, 1);
        b.link(s, s, 2);
        let f = b.add_arc(s, 3);
        b.set_final(f);
        let a = b.minimize();
        assert!(accepts(&a, &[1, 3]));
        assert!(accepts(&a, &[1, 2, 2, 2, 3]));
        assert!(!accepts(&a, &[1, 2]));
    }

    #[test]
    fn drops_dead_branches() {
        let mut b = TransducerBuilder::new();
        let dead = b.add_arc(0, 9);
        b.add_arc(dead, 9);
        let f = b.add_arc(0, 1);
        b.set_final(f);
        let a = b.minimize();
        assert_eq!(a.state_count(), 2);
        assert!(a.targets(0, 9).next().is_none());
    }

    #[test]
    fn empty_language() {
        let mut b = TransducerBuilder::new();
        b.add_arc(0, 1);
        let a = b.minimize();
        assert_eq!(a.state_count(), 1);
        assert_eq!(a.transition_count(), 0);
        assert!(!a.is_final(0));
    }
}
