// Immutable automaton and the parallel match state used to run it.
//
// Arcs live in one flat table indexed by per-state offsets (state `s` owns
// `transitions[offsets[s]..offsets[s + 1]]`), sorted by symbol so lookups
// are a binary search.

use crate::StateId;
use crate::symbols::SymbolId;
use crate::transition::Transition;

/// A frozen automaton. State 0 is the initial state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Automaton {
    offsets: Vec<u32>,
    transitions: Vec<Transition>,
    finals: Vec<bool>,
}

impl Automaton {
    /// Flatten per-state arc lists. An empty list yields a single arc-less state.
    pub(crate) fn from_arcs(mut arcs: Vec<Vec<Transition>>, mut finals: Vec<bool>) -> Self {
        if arcs.is_empty() {
            arcs.push(Vec::new());
        }
        finals.resize(arcs.len(), false);
        let mut offsets = Vec::with_capacity(arcs.len() + 1);
        let mut transitions = Vec::new();
        offsets.push(0);
        for mut state_arcs in arcs {
            state_arcs.sort();
            state_arcs.dedup();
            transitions.extend(state_arcs);
            offsets.push(transitions.len() as u32);
        }
        Self {
            offsets,
            transitions,
            finals,
        }
    }

    /// Assemble from already-validated parts (used by the blob reader).
    pub(crate) fn from_parts(
        offsets: Vec<u32>,
        transitions: Vec<Transition>,
        finals: Vec<bool>,
    ) -> Self {
        Self {
            offsets,
            transitions,
            finals,
        }
    }

    pub fn initial(&self) -> StateId {
        0
    }

    pub fn state_count(&self) -> usize {
        self.finals.len()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    /// Outgoing arcs of `state`, sorted by (symbol, target).
    pub fn transitions(&self, state: StateId) -> &[Transition] {
        let s = state as usize;
        match (self.offsets.get(s), self.offsets.get(s + 1)) {
            (Some(&start), Some(&end)) => &self.transitions[start as usize..end as usize],
            _ => &[],
        }
    }

    /// All states reachable from `state` on exactly `symbol`.
    pub fn targets(&self, state: StateId, symbol: SymbolId) -> impl Iterator<Item = StateId> + '_ {
        let arcs = self.transitions(state);
        let start = arcs.partition_point(|t| t.symbol < symbol);
        arcs[start..]
            .iter()
            .take_while(move |t| t.symbol == symbol)
            .map(|t| t.target)
    }

    pub fn is_final(&self, state: StateId) -> bool {
        self.finals.get(state as usize).copied().unwrap_or(false)
    }

    pub fn finals(&self) -> impl Iterator<Item = StateId> + '_ {
        self.finals
            .iter()
            .enumerate()
            .filter(|(_, f)| **f)
            .map(|(s, _)| s as StateId)
    }

    /// The same automaton with exactly `finals` as its final states.
    pub fn with_finals(mut self, finals: impl IntoIterator<Item = StateId>) -> Self {
        self.finals.iter_mut().for_each(|f| *f = false);
        for s in finals {
            if let Some(f) = self.finals.get_mut(s as usize) {
                *f = true;
            }
        }
        self
    }

    pub(crate) fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub(crate) fn all_transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// A match state positioned at the initial state.
    pub fn start(&self) -> MatchState<'_> {
        MatchState {
            automaton: self,
            active: vec![self.initial()],
            scratch: Vec::new(),
        }
    }
}

/// The set of states reachable by the input consumed so far.
///
/// Each step follows every arc labelled with any of the offered symbols, so
/// a literal symbol and its wildcard class are explored in parallel.
pub struct MatchState<'a> {
    automaton: &'a Automaton,
    active: Vec<StateId>,
    scratch: Vec<StateId>,
}

impl MatchState<'_> {
    /// Follow arcs labelled `symbol` only.
    pub fn step(&mut self, symbol: SymbolId) {
        self.step_any(&[symbol]);
    }

    /// Follow arcs labelled with the exact symbol (if known) or the wildcard `alt`.
    pub fn step_either(&mut self, exact: Option<SymbolId>, alt: SymbolId) {
        match exact {
            Some(sym) if sym != alt => self.step_any(&[sym, alt]),
            _ => self.step_any(&[alt]),
        }
    }

    fn step_any(&mut self, symbols: &[SymbolId]) {
        self.scratch.clear();
        for &state in &self.active {
            for &symbol in symbols {
                self.scratch.extend(self.automaton.targets(state, symbol));
            }
        }
        self.scratch.sort_unstable();
        self.scratch.dedup();
        std::mem::swap(&mut self.active, &mut self.scratch);
    }

    /// No state is reachable any more; further steps cannot revive the match.
    pub fn is_dead(&self) -> bool {
        self.active.is_empty()
    }

    /// Reachable states in ascending order.
    pub fn active(&self) -> &[StateId] {
        &self.active
    }

    /// Reachable states that are final, in ascending order.
    pub fn finals(&self) -> impl Iterator<Item = StateId> + '_ {
        self.active
            .iter()
            .copied()
            .filter(|&s| self.automaton.is_final(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TransducerBuilder;
    use crate::symbols::{ANY_CHAR, ANY_TAG};

    const A: SymbolId = 10;
    const B: SymbolId = 11;
    const N: SymbolId = 20;

    /// a, then any number of any-char, then b (final)
    fn a_star_b() -> Automaton {
        let mut builder = TransducerBuilder::new();
        let s = builder.add_arc(0, A);
        builder.link(s, s, ANY_CHAR);
        let f = builder.add_arc(s, B);
        builder.set_final(f);
        builder.minimize()
    }

    #[test]
    fn flat_layout() {
        let a = a_star_b();
        assert_eq!(a.state_count(), 3);
        assert_eq!(a.transition_count(), 3);
        assert_eq!(a.transitions(99), &[]);
        assert_eq!(a.finals().count(), 1);
    }

    #[test]
    fn wildcard_runs_in_parallel() {
        let a = a_star_b();
        let mut m = a.start();
        m.step_either(Some(A), ANY_CHAR);
        m.step_either(Some(B), ANY_CHAR);
        // "ab": both the loop state and the final state are live.
        assert_eq!(m.active().len(), 2);
        assert_eq!(m.finals().count(), 1);
        m.step_either(Some(B), ANY_CHAR);
        // "abb": still matches through the loop.
        assert_eq!(m.finals().count(), 1);
    }

    #[test]
    fn unknown_symbol_only_takes_wildcard() {
        let a = a_star_b();
        let mut m = a.start();
        m.step_either(Some(A), ANY_CHAR);
        m.step_either(None, ANY_CHAR);
        assert_eq!(m.finals().count(), 0);
        assert!(!m.is_dead());
        m.step_either(Some(B), ANY_CHAR);
        assert_eq!(m.finals().count(), 1);
    }

    #[test]
    fn tag_wildcard_does_not_match_chars() {
        let mut builder = TransducerBuilder::new();
        let f = builder.add_arc(0, N);
        builder.set_final(f);
        let s = builder.add_arc(0, A);
        builder.link(s, s, ANY_TAG);
        builder.set_final(s);
        let a = builder.minimize();

        let mut m = a.start();
        m.step_either(Some(A), ANY_CHAR);
        m.step_either(Some(N), ANY_TAG);
        assert_eq!(m.finals().count(), 1);

        let mut m = a.start();
        m.step_either(Some(A), ANY_CHAR);
        m.step_either(Some(B), ANY_CHAR);
        assert!(m.is_dead());
    }

    #[test]
    fn with_finals_replaces_final_set() {
        let a = a_star_b();
        let old: Vec<_> = a.finals().collect();
        let a = a.with_finals([0]);
        assert!(a.is_final(0));
        for s in old {
            assert!(!a.is_final(s));
        }
    }
}
