// Append-only automaton builder.
//
// States and arcs are only ever added. The result may be nondeterministic
// (several arcs with the same symbol out of one state); `minimize` turns it
// into the minimal deterministic automaton, `build` keeps it as is.

use crate::StateId;
use crate::automaton::Automaton;
use crate::minimize;
use crate::symbols::SymbolId;
use crate::transition::Transition;

/// Incrementally constructed automaton with a designated initial state 0.
#[derive(Debug, Clone)]
pub struct TransducerBuilder {
    pub(crate) initials: Vec<StateId>,
    pub(crate) arcs: Vec<Vec<Transition>>,
    pub(crate) finals: Vec<bool>,
}

impl Default for TransducerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransducerBuilder {
    pub const INITIAL: StateId = 0;

    pub fn new() -> Self {
        Self {
            initials: vec![Self::INITIAL],
            arcs: vec![Vec::new()],
            finals: vec![false],
        }
    }

    /// A builder with `count` arc-less states and the given initial states.
    pub(crate) fn with_states(count: usize, initials: Vec<StateId>) -> Self {
        Self {
            initials,
            arcs: vec![Vec::new(); count],
            finals: vec![false; count],
        }
    }

    pub fn add_state(&mut self) -> StateId {
        let id = self.arcs.len() as StateId;
        self.arcs.push(Vec::new());
        self.finals.push(false);
        id
    }

    /// Add an arc from `source` on `symbol` to a brand-new state, returning it.
    pub fn add_arc(&mut self, source: StateId, symbol: SymbolId) -> StateId {
        let target = self.add_state();
        self.link(source, target, symbol);
        target
    }

    /// Add an arc between two existing states. Duplicate arcs are ignored.
    pub fn link(&mut self, source: StateId, target: StateId, symbol: SymbolId) {
        let arc = Transition::new(symbol, target);
        let arcs = &mut self.arcs[source as usize];
        if !arcs.contains(&arc) {
            arcs.push(arc);
        }
    }

    pub fn set_final(&mut self, state: StateId) {
        self.finals[state as usize] = true;
    }

    pub fn is_final(&self, state: StateId) -> bool {
        self.finals[state as usize]
    }

    pub fn state_count(&self) -> usize {
        self.arcs.len()
    }

    /// Freeze the automaton exactly as built.
    pub fn build(self) -> Automaton {
        Automaton::from_arcs(self.arcs, self.finals)
    }

    /// Freeze the minimal deterministic automaton accepting the same symbol strings.
    pub fn minimize(&self) -> Automaton {
        minimize::minimize(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_arc_creates_fresh_states() {
        let mut b = TransducerBuilder::new();
        let s1 = b.add_arc(TransducerBuilder::INITIAL, 7);
        let s2 = b.add_arc(TransducerBuilder::INITIAL, 7);
        assert_ne!(s1, s2);
        assert_eq!(b.state_count(), 3);
    }

    #[test]
    fn link_ignores_duplicates() {
        let mut b = TransducerBuilder::new();
        let s = b.add_state();
        b.link(s, s, 0);
        b.link(s, s, 0);
        assert_eq!(b.arcs[s as usize].len(), 1);
    }

    #[test]
    fn build_keeps_nondeterminism() {
        let mut b = TransducerBuilder::new();
        let s1 = b.add_arc(0, 5);
        let s2 = b.add_arc(0, 5);
        b.set_final(s2);
        let a = b.build();
        let targets: Vec<_> = a.targets(0, 5).collect();
        assert_eq!(targets, [s1, s2]);
        assert!(a.is_final(s2));
        assert!(!a.is_final(s1));
    }
}
