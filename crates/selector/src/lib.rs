//! Lexical selection over Apertium stream format.
//!
//! Given units with several candidate target readings, pick one reading per
//! unit by scoring feature pairs in a sliding window with beam search. The
//! weights are learned from a raw/gold parallel corpus with an averaged
//! perceptron.
//!
//! # Architecture
//!
//! - [`pattern`] -- Compiles feature patterns into one automaton and matches readings
//! - [`rules`] -- Line grammar of the text rule file
//! - [`feature_set`] -- Feature store: settings, patterns, pairwise weights, text/binary forms
//! - [`decoder`] -- Beam-search selector over a unit stream
//! - [`trainer`] -- Averaged-perceptron weight training
//! - [`embedding`] -- Skip-gram embedding pretraining over source forms

pub mod decoder;
pub mod embedding;
pub mod feature_set;
pub mod pattern;
pub mod rules;
pub mod trainer;

pub use decoder::Selector;
pub use embedding::{EmbeddingConfig, EmbeddingTrainer};
pub use feature_set::FeatureSet;
pub use pattern::{PatternMatcher, Side};
pub use trainer::{
    CorpusProblem, SelectorTrainer, TrainError, TrainerOptions, TrainingSummary,
};

use selector_core::StreamError;
use selector_fst::FstError;

/// Magic bytes at the start of a compiled weights file.
pub const HEADER_MAGIC: [u8; 4] = *b"APSL";

/// Feature bits understood by this version. Any other bit in a file header
/// means the file needs a newer reader.
pub const KNOWN_FEATURES: u64 = 0;

/// Error type for loading compiled weights and processing streams.
#[derive(Debug, thiserror::Error)]
pub enum SelectorError {
    #[error("weights file is missing the APSL header")]
    MissingHeader,
    #[error("weights file uses unsupported features (flags {flags:#x}); upgrade the selector")]
    UnsupportedFeatures { flags: u64 },
    #[error("feature position {pos} lies outside the -{lookbehind}..={lookahead} window")]
    PositionOutOfWindow {
        pos: i64,
        lookbehind: usize,
        lookahead: usize,
    },
    #[error("corrupt weights file: {0}")]
    Fst(#[from] FstError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
