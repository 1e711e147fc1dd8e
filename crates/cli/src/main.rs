mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use microfunc_lib::consts::DEFAULT_MANIFEST;
use microfunc_lib::manifest::FallbackMode;
use microfunc_lib::settings::Overrides;

use crate::output::print_error;

/// microfunc - build microservices from local, git and generated function sources
#[derive(Parser)]
#[command(name = "microfunc")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Increase log verbosity (-v for info, -vv for debug)
  #[arg(short, long, global = true, action = ArgAction::Count)]
  verbose: u8,

  /// Path to the manifest
  #[arg(short, long, global = true, default_value = DEFAULT_MANIFEST)]
  file: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Show the dependency-ordered build plan
  Plan {
    /// Print the plan as JSON
    #[arg(long)]
    json: bool,
  },

  /// Resolve every source and emit service definitions
  Build {
    /// Refresh cached generated sources even when fresh
    #[arg(long, conflicts_with = "no_refresh")]
    refresh: bool,

    /// Serve fresh cached generated sources without calling the provider
    #[arg(long)]
    no_refresh: bool,

    /// What to do when a provider fails and a cached artifact exists
    #[arg(long, value_enum)]
    fallback: Option<FallbackArg>,

    /// Maximum number of services resolved in parallel
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Cancel the build after this long (seconds, or a duration like "2m")
    #[arg(long, value_parser = parse_timeout)]
    timeout: Option<Duration>,

    /// Print the build report as JSON
    #[arg(long)]
    json: bool,
  },

  /// Show the last build record of every service
  Status {
    /// Print records as JSON
    #[arg(long)]
    json: bool,
  },

  /// Inspect or empty the artifact cache
  Cache {
    #[command(subcommand)]
    command: CacheCommand,
  },
}

#[derive(Subcommand)]
enum CacheCommand {
  /// List cached artifacts
  List {
    /// Print entries as JSON
    #[arg(long)]
    json: bool,
  },
  /// Remove every cached artifact
  Clear,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FallbackArg {
  UseCached,
  Fail,
}

impl From<FallbackArg> for FallbackMode {
  fn from(arg: FallbackArg) -> Self {
    match arg {
      FallbackArg::UseCached => FallbackMode::UseCached,
      FallbackArg::Fail => FallbackMode::Fail,
    }
  }
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
  if let Ok(secs) = value.parse::<u64>() {
    return Ok(Duration::from_secs(secs));
  }
  humantime::parse_duration(value).map_err(|e| e.to_string())
}

fn init_tracing(verbose: u8) {
  let default = match verbose {
    0 => "warn",
    1 => "info",
    _ => "debug",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = match cli.command {
    Commands::Plan { json } => cmd::cmd_plan(&cli.file, json).map(|()| ExitCode::SUCCESS),
    Commands::Build {
      refresh,
      no_refresh,
      fallback,
      jobs,
      timeout,
      json,
    } => {
      let overrides = Overrides {
        refresh_on_build: match (refresh, no_refresh) {
          (true, _) => Some(true),
          (_, true) => Some(false),
          _ => None,
        },
        fallback: fallback.map(FallbackMode::from),
        parallelism: jobs,
        timeout,
      };
      cmd::cmd_build(&cli.file, &overrides, json)
    }
    Commands::Status { json } => cmd::cmd_status(&cli.file, json).map(|()| ExitCode::SUCCESS),
    Commands::Cache { command } => match command {
      CacheCommand::List { json } => cmd::cmd_cache_list(&cli.file, json),
      CacheCommand::Clear => cmd::cmd_cache_clear(&cli.file),
    }
    .map(|()| ExitCode::SUCCESS),
  };

  match result {
    Ok(code) => code,
    Err(e) => {
      print_error(&format!("{e:#}"));
      ExitCode::FAILURE
    }
  }
}
