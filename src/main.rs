//! Command-line driver: read a raw parse tree, assemble the procedure,
//! run the requested loop transformations and dump the result.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};

use fortopt::prelude::*;

#[derive(Parser)]
#[command(name = "fortopt", version, about = "Restructuring toolkit for numerical kernels")]
struct Cli {
    /// Raw parse tree in JSON form, tagged with its frontend
    input: PathBuf,

    /// Apply directive-driven loop fusion
    #[arg(long)]
    fusion: bool,

    /// Apply directive-driven loop fission
    #[arg(long)]
    fission: bool,

    /// Write the transformed tree dump to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all log output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        LevelFilter::Off
    } else {
        match cli.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };
    env_logger::Builder::from_default_env().filter_level(level).init();

    let text = fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let raw: RawAst = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", cli.input.display()))?;

    let mut scopes = ScopeTree::new();
    let mut routine = build_procedure(&raw, &mut scopes)
        .with_context(|| format!("assembling procedure from {} tree", raw.frontend()))?;
    info!(
        "assembled `{}` ({} argument(s), {} member(s))",
        routine.name,
        routine.argnames().len(),
        routine.members().len()
    );

    if cli.fusion {
        loop_fusion(&mut routine).context("loop fusion failed")?;
    }
    if cli.fission {
        loop_fission(&mut routine, &mut scopes).context("loop fission failed")?;
    }

    let dump = format!("{:#?}", routine);
    match &cli.output {
        Some(path) => fs::write(path, dump)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{}", dump),
    }
    Ok(())
}
