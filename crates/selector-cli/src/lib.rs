// selector-cli: shared plumbing and the body of each command.
//
// Every command takes optional input/output paths; a missing path or `-`
// means stdin/stdout. Logging goes to stderr so stdout stays a data stream.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use selector::{
    EmbeddingConfig, EmbeddingTrainer, FeatureSet, Selector, SelectorTrainer, TrainerOptions,
    TrainingSummary,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Plumbing
// ---------------------------------------------------------------------------

fn file_path(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| p.as_os_str() != "-")
}

/// Open a file for buffered reading, or stdin.
pub fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead>> {
    match file_path(path) {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(io::stdin().lock())),
    }
}

/// Create a file for buffered writing, or stdout.
pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match file_path(path) {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    // A second init (tests running several commands) keeps the first subscriber.
    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init()
    {
        debug!(error = %err, "tracing subscriber already installed");
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Rule file to compiled weights.
pub fn compile(input: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let fs = FeatureSet::read(open_input(input)?).context("cannot read rule file")?;
    info!(
        lookbehind = fs.lookbehind(),
        lookahead = fs.lookahead(),
        weights = fs.weight_count(),
        "compiling rules"
    );
    let mut out = open_output(output)?;
    fs.compile(&mut out).context("cannot write compiled weights")?;
    out.flush()?;
    Ok(())
}

/// Disambiguate a stream with compiled weights.
pub fn select(
    weights: &Path,
    input: Option<&Path>,
    output: Option<&Path>,
    null_flush: bool,
) -> Result<()> {
    let mut bin = BufReader::new(
        File::open(weights).with_context(|| format!("cannot open {}", weights.display()))?,
    );
    let mut selector = Selector::load(&mut bin)
        .with_context(|| format!("cannot load {}", weights.display()))?
        .with_null_flush(null_flush);
    let mut out = open_output(output)?;
    selector.process(open_input(input)?, &mut out)?;
    Ok(())
}

/// Train the weights of a rule file on a raw/gold corpus and write the
/// trained rule file.
pub fn train(
    raw: &Path,
    gold: &Path,
    weights_in: Option<&Path>,
    weights_out: Option<&Path>,
    options: TrainerOptions,
) -> Result<TrainingSummary> {
    let fs = FeatureSet::read(open_input(weights_in)?).context("cannot read seed weights")?;
    let mut trainer = SelectorTrainer::new(fs, options);
    let summary = trainer.train(open_input(Some(raw))?, open_input(Some(gold))?)?;
    let mut out = open_output(weights_out)?;
    trainer.write(&mut out).context("cannot write trained weights")?;
    out.flush()?;
    Ok(summary)
}

/// Train embeddings over the source forms of a stream.
pub fn train_embeddings(
    config: EmbeddingConfig,
    input: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let mut trainer = EmbeddingTrainer::new(config);
    trainer
        .read_corpus(open_input(input)?)
        .context("cannot read corpus")?;
    trainer.train();
    let mut out = open_output(output)?;
    trainer.write(&mut out).context("cannot write embeddings")?;
    Ok(())
}
