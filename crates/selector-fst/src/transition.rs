// Fixed-layout transition record.
//
// Transitions are stored in one flat table, grouped by source state and
// sorted by (symbol, target) within each state. The record is plain old data
// so the table can be written and read as a single byte slice.

use bytemuck::{Pod, Zeroable};

use crate::StateId;
use crate::symbols::SymbolId;

/// One arc of the automaton (8 bytes).
///
/// - `symbol` (u32): alphabet symbol consumed by the arc
/// - `target` (u32): destination state
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
pub struct Transition {
    pub symbol: SymbolId,
    pub target: StateId,
}

impl Transition {
    pub const fn new(symbol: SymbolId, target: StateId) -> Self {
        Self { symbol, target }
    }

    /// The same transition with both fields in little-endian byte order.
    ///
    /// A no-op on little-endian hosts; applying it twice restores the original.
    #[inline]
    pub fn to_le(self) -> Self {
        Self {
            symbol: self.symbol.to_le(),
            target: self.target.to_le(),
        }
    }

    /// Inverse of [`to_le`](Self::to_le).
    #[inline]
    pub fn le_to_native(self) -> Self {
        Self {
            symbol: u32::from_le(self.symbol),
            target: u32::from_le(self.target),
        }
    }
}

const _: () = assert!(size_of::<Transition>() == 8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_size() {
        assert_eq!(size_of::<Transition>(), 8);
    }

    #[test]
    fn orders_by_symbol_then_target() {
        let mut arcs = vec![
            Transition::new(5, 1),
            Transition::new(2, 9),
            Transition::new(5, 0),
        ];
        arcs.sort();
        assert_eq!(
            arcs,
            [
                Transition::new(2, 9),
                Transition::new(5, 0),
                Transition::new(5, 1)
            ]
        );
    }

    #[test]
    fn zero_copy_cast() {
        let raw: [u8; 16] = [
            0x01, 0x00, 0x00, 0x00, // symbol = 1
            0x02, 0x00, 0x00, 0x00, // target = 2
            0x07, 0x00, 0x00, 0x00, // symbol = 7
            0x00, 0x01, 0x00, 0x00, // target = 256
        ];
        let mut arcs = vec![Transition::zeroed(); 2];
        bytemuck::cast_slice_mut::<Transition, u8>(&mut arcs).copy_from_slice(&raw);
        let arcs: Vec<Transition> = arcs.into_iter().map(Transition::le_to_native).collect();
        assert_eq!(arcs[0], Transition::new(1, 2));
        assert_eq!(arcs[1], Transition::new(7, 256));
    }

    #[test]
    fn le_conversion_roundtrip() {
        let t = Transition::new(0x0102_0304, 42);
        assert_eq!(t.to_le().le_to_native(), t);
    }
}
