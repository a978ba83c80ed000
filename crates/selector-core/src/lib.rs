//! Shared types for the Apertium stream selector.
//!
//! This crate holds everything that the pattern compiler, decoder and trainer
//! agree on without needing an automaton:
//!
//! - [`stream`] -- Character reader over the tagged text stream
//! - [`lu`] -- Readings and lexical units (parse, write, trim)
//! - [`feature`] -- Feature locations, canonical feature pairs, feature sets

pub mod feature;
pub mod lu;
pub mod stream;

pub use feature::{FeatLoc, FeatPair, FeatPairSet, FeatSet, FeatureId, UNIVERSAL_FEATURE};
pub use lu::{LexicalUnit, Reading, Symbol, TagLookup};
pub use stream::CharReader;

/// Error type for reading the tagged text stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid UTF-8 sequence at byte offset {offset}")]
    InvalidUtf8 { offset: u64 },
}
