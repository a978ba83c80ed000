// apsl-compile: compile a text rule file into binary weights.
//
// Usage:
//   apsl-compile [-v] [INPUT] [OUTPUT]

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "apsl-compile", about = "Compile lexical selection weights")]
struct Args {
    /// Rule file (default: stdin)
    input: Option<PathBuf>,

    /// Binary weights file (default: stdout)
    output: Option<PathBuf>,

    /// Log debug events to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    selector_cli::init_tracing(args.verbose);
    selector_cli::compile(args.input.as_deref(), args.output.as_deref())
}
