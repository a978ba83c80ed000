//! Finite-state automaton primitives for the stream selector.
//!
//! Patterns are compiled into a single automaton over an interned symbol
//! alphabet. Construction is append-only; minimization is a pure
//! transformation producing a new immutable [`Automaton`](automaton::Automaton).
//!
//! # Architecture
//!
//! - [`symbols`] -- Alphabet: characters, tags and reserved wildcard/side symbols
//! - [`transition`] -- Fixed-layout transition records
//! - [`builder`] -- Append-only automaton builder
//! - [`minimize`] -- Brzozowski minimization (reverse + determinize, twice)
//! - [`automaton`] -- Immutable automaton and parallel match state
//! - [`compression`] -- Variable-length integer and float codec
//! - [`format`] -- Binary automaton blob

pub mod automaton;
pub mod builder;
pub mod compression;
pub mod format;
pub mod minimize;
pub mod symbols;
pub mod transition;

/// State index within an automaton. State 0 is always the initial state.
pub type StateId = u32;

/// Error type for automaton (de)serialization.
#[derive(Debug, thiserror::Error)]
pub enum FstError {
    #[error("unexpected end of data")]
    UnexpectedEof,
    #[error("variable-length integer does not fit in 64 bits")]
    VarintOverflow,
    #[error("invalid symbol table: {0}")]
    InvalidSymbolTable(String),
    #[error("state {state} out of range (automaton has {count} states)")]
    InvalidState { state: u64, count: usize },
    #[error("transition table mismatch: header says {expected} transitions, states list {actual}")]
    TransitionCount { expected: u64, actual: u64 },
    #[error("I/O error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for FstError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FstError::UnexpectedEof
        } else {
            FstError::Io(e)
        }
    }
}
