// apsl-train: learn weights from a raw/gold parallel corpus.
//
// The input weights file declares the patterns and the pairs to train;
// the output is the same rule file with averaged weights.
//
// Usage:
//   apsl-train [-i N] [-v] RAW GOLD [INPUT_WEIGHTS] [OUTPUT_WEIGHTS]

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use selector::TrainerOptions;

#[derive(Parser, Debug)]
#[command(name = "apsl-train", about = "Train lexical selection weights")]
struct Args {
    /// Corpus with ambiguous units
    raw: PathBuf,

    /// The same corpus with one correct target per unit
    gold: PathBuf,

    /// Seed rule file (default: stdin)
    input_weights: Option<PathBuf>,

    /// Trained rule file (default: stdout)
    output_weights: Option<PathBuf>,

    /// Passes over the corpus
    #[arg(short, long, default_value_t = TrainerOptions::default().iterations)]
    iterations: usize,

    /// Log debug events to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    selector_cli::init_tracing(args.verbose);
    let summary = selector_cli::train(
        &args.raw,
        &args.gold,
        args.input_weights.as_deref(),
        args.output_weights.as_deref(),
        TrainerOptions {
            iterations: args.iterations,
        },
    )?;
    tracing::info!(
        instances = summary.instances,
        mistakes = summary.mistakes,
        "training finished"
    );
    Ok(())
}
