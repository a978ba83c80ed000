// apsl-train-embeddings: skip-gram vectors for source surface forms.
//
// Usage:
//   apsl-train-embeddings [OPTIONS] [INPUT] [OUTPUT]

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use selector::EmbeddingConfig;

#[derive(Parser, Debug)]
#[command(
    name = "apsl-train-embeddings",
    about = "Train word embeddings for lexical selection features"
)]
struct Args {
    /// Input stream (default: stdin)
    input: Option<PathBuf>,

    /// Output rule fragment (default: stdout)
    output: Option<PathBuf>,

    /// Context words on each side
    #[arg(short, long, default_value_t = 5)]
    window: usize,

    /// Forms seen fewer times are merged into UNK
    #[arg(short = 'm', long, default_value_t = 5)]
    min_count: u64,

    #[arg(short = 'a', long, default_value_t = 0.005)]
    learning_rate: f64,

    /// Vector size
    #[arg(short, long, default_value_t = 100)]
    dimension: usize,

    /// Negative samples per context word
    #[arg(short, long, default_value_t = 5)]
    negative: usize,

    /// Passes over the corpus
    #[arg(short, long, default_value_t = 5)]
    iterations: usize,

    /// Random seed
    #[arg(short, long, default_value_t = 1)]
    seed: u64,

    /// Log debug events to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    selector_cli::init_tracing(args.verbose);
    let config = EmbeddingConfig {
        window: args.window,
        min_count: args.min_count,
        learning_rate: args.learning_rate,
        dimension: args.dimension,
        negative_samples: args.negative,
        iterations: args.iterations,
        seed: args.seed,
        ..EmbeddingConfig::default()
    };
    selector_cli::train_embeddings(config, args.input.as_deref(), args.output.as_deref())
}
