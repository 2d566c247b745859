//! CLI front-end: argument parsing, logging setup, and the top-level
//! parse/rewrite/serialize drive loop.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use abc_deobf::config::Config;
use abc_deobf::matcher::MatcherDocument;
use abc_deobf::orchestrator::{self, Options};
use anyhow::Context;
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

/// Deobfuscates an ActionScript bytecode container embedded in a Flash movie.
#[derive(Debug, Parser)]
#[command(name = "deobf", version, about)]
struct Cli {
  /// Input SWF path, or `-` to read from stdin.
  input: PathBuf,

  /// Output SWF path, or `-` to write to stdout.
  output: PathBuf,

  /// Worker thread count for the unscrambling phase. Defaults to the host's
  /// hardware concurrency plus two; `1` takes the sequential code path.
  #[arg(short = 'j', long)]
  jobs: Option<usize>,

  /// Name-format configuration document (YAML or JSON).
  #[arg(long)]
  config: Option<PathBuf>,

  /// Declarative matcher rule document, or a directory of them (YAML/JSON).
  #[arg(long)]
  classdef: Option<PathBuf>,

  /// Rewrites the embedded server endpoint to `127.0.0.1:<port>`.
  #[arg(long)]
  proxy: Option<u16>,

  /// Continue (with a warning) instead of failing when an obfuscation
  /// primitive isn't recognized.
  #[arg(long)]
  ignore_missing: bool,

  /// Increase verbosity; repeat for more (`-vv` also prints phase timings).
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  match run(&cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      eprintln!("error: {e:#}");
      let code = e.downcast_ref::<abc_deobf::Error>().map(|e| e.exit_code()).unwrap_or(1);
      ExitCode::from(code as u8)
    }
  }
}

fn init_logging(verbosity: u8) {
  let level = match verbosity {
    0 => LevelFilter::WARN,
    1 => LevelFilter::INFO,
    2 => LevelFilter::DEBUG,
    _ => LevelFilter::TRACE,
  };
  tracing_subscriber::fmt().with_max_level(level).with_target(false).init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
  let config = match &cli.config {
    Some(path) => Config::load(path).context("loading config document")?,
    None => Config::default(),
  };

  let matcher = match &cli.classdef {
    Some(path) if path.is_dir() => {
      Some(MatcherDocument::load_dir(path).context("loading --classdef directory")?)
    }
    Some(path) => Some(MatcherDocument::load(path).context("loading --classdef document")?),
    None => None,
  };

  let opts = Options {
    jobs: cli.jobs.unwrap_or_else(orchestrator::default_job_count),
    ignore_missing: cli.ignore_missing,
    config,
    matcher,
    proxy_port: cli.proxy,
    report_timing: cli.verbose >= 2,
  };

  let input = read_input(&cli.input).context("reading input file")?;
  let (output, report) = orchestrator::run(&input, &opts)?;
  write_output(&cli.output, &output).context("writing output file")?;

  for warning in &report.warnings {
    tracing::warn!("{warning}");
  }
  if opts.report_timing {
    for (label, elapsed) in &report.timings {
      eprintln!("{label:<32} {elapsed:?}");
    }
  }

  Ok(())
}

fn read_input(path: &std::path::Path) -> std::io::Result<Vec<u8>> {
  if path.as_os_str() == "-" {
    let mut buf = Vec::new();
    std::io::stdin().read_to_end(&mut buf)?;
    Ok(buf)
  } else {
    std::fs::read(path)
  }
}

fn write_output(path: &std::path::Path, data: &[u8]) -> std::io::Result<()> {
  if path.as_os_str() == "-" {
    std::io::stdout().write_all(data)
  } else {
    std::fs::write(path, data)
  }
}
