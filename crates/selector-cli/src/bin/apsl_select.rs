// apsl-select: disambiguate an Apertium stream with compiled weights.
//
// Reads units with several target readings and writes each unit with the
// source reading and the one selected target.
//
// Usage:
//   apsl-select [-z] [-v] BINFILE [INPUT] [OUTPUT]

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "apsl-select", about = "Disambiguate Apertium stream format")]
struct Args {
    /// Compiled weights from apsl-compile
    binfile: PathBuf,

    /// Input stream (default: stdin)
    input: Option<PathBuf>,

    /// Output stream (default: stdout)
    output: Option<PathBuf>,

    /// Flush the output after every NUL character
    #[arg(short = 'z', long)]
    null_flush: bool,

    /// Log debug events to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    selector_cli::init_tracing(args.verbose);
    selector_cli::select(
        &args.binfile,
        args.input.as_deref(),
        args.output.as_deref(),
        args.null_flush,
    )
}
