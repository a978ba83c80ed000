// Binary automaton blob.
//
// Layout (all counts are LEB128 varints):
//   state_count
//   transition_count
//   arc count of each state (state_count entries, summing to transition_count)
//   transition table: transition_count fixed 8-byte little-endian records
//   final count, then final state ids in ascending order
//
// The transition table is read straight into an aligned `Vec<Transition>`
// and validated afterwards: every target and final must name a real state.

use std::io::{Read, Write};

use bytemuck::Zeroable;

use crate::automaton::Automaton;
use crate::compression::{read_varint, write_len, write_varint};
use crate::transition::Transition;
use crate::{FstError, StateId};

/// Upper bound on transitions read per chunk, so a corrupt count cannot
/// force one huge allocation before any data has been seen.
const READ_CHUNK: usize = 1 << 16;

pub fn write_automaton<W: Write>(out: &mut W, automaton: &Automaton) -> Result<(), FstError> {
    let offsets = automaton.offsets();
    write_len(out, automaton.state_count())?;
    write_len(out, automaton.transition_count())?;
    for pair in offsets.windows(2) {
        write_varint(out, u64::from(pair[1] - pair[0]))?;
    }

    let le: Vec<Transition> = automaton
        .all_transitions()
        .iter()
        .map(|t| t.to_le())
        .collect();
    out.write_all(bytemuck::cast_slice(&le))?;

    let finals: Vec<StateId> = automaton.finals().collect();
    write_len(out, finals.len())?;
    for s in finals {
        write_varint(out, u64::from(s))?;
    }
    Ok(())
}

pub fn read_automaton<R: Read>(input: &mut R) -> Result<Automaton, FstError> {
    let state_count = read_varint(input)?;
    let transition_count = read_varint(input)?;
    if state_count == 0 || state_count > u64::from(StateId::MAX) {
        return Err(FstError::InvalidState {
            state: state_count,
            count: 0,
        });
    }
    let states = state_count as usize;

    let mut offsets = Vec::with_capacity(states.min(READ_CHUNK) + 1);
    offsets.push(0u32);
    let mut total: u64 = 0;
    for _ in 0..states {
        total = total.saturating_add(read_varint(input)?);
        if total > transition_count {
            return Err(FstError::TransitionCount {
                expected: transition_count,
                actual: total,
            });
        }
        // Offsets index a u32 table; larger counts cannot be addressed.
        let offset = u32::try_from(total).map_err(|_| FstError::TransitionCount {
            expected: transition_count,
            actual: total,
        })?;
        offsets.push(offset);
    }
    if total != transition_count {
        return Err(FstError::TransitionCount {
            expected: transition_count,
            actual: total,
        });
    }

    let transitions = read_transitions(input, transition_count as usize)?;
    for t in &transitions {
        if t.target as usize >= states {
            return Err(FstError::InvalidState {
                state: u64::from(t.target),
                count: states,
            });
        }
    }

    let mut finals = vec![false; states];
    let final_count = read_varint(input)?;
    for _ in 0..final_count {
        let s = read_varint(input)?;
        match finals.get_mut(s as usize) {
            Some(f) if s < state_count => *f = true,
            _ => {
                return Err(FstError::InvalidState {
                    state: s,
                    count: states,
                });
            }
        }
    }

    Ok(Automaton::from_parts(offsets, transitions, finals))
}

fn read_transitions<R: Read>(input: &mut R, count: usize) -> Result<Vec<Transition>, FstError> {
    let mut transitions: Vec<Transition> = Vec::with_capacity(count.min(READ_CHUNK));
    while transitions.len() < count {
        let start = transitions.len();
        let n = (count - start).min(READ_CHUNK);
        transitions.resize(start + n, Transition::zeroed());
        input.read_exact(bytemuck::cast_slice_mut(&mut transitions[start..]))?;
    }
    for t in &mut transitions {
        *t = t.le_to_native();
    }
    Ok(transitions)
}
