//! Implementation of the `microfunc build` command.
//!
//! Runs the engine over the manifest and prints one line per service. The
//! build is cancelled cooperatively on Ctrl-C or when the deadline passes.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use microfunc_lib::cancel::CancelToken;
use microfunc_lib::execute::{BuildReport, ServiceOutcome};
use microfunc_lib::settings::{Overrides, Settings};

use super::load_manifest;
use crate::output::{format_duration, outcome_symbol, print_json, print_stat, print_success, print_warning};

pub fn cmd_build(file: &Path, overrides: &Overrides, json: bool) -> Result<ExitCode> {
  let manifest = load_manifest(file)?;
  let settings = Settings::resolve(&manifest, file, overrides);
  let engine = settings.engine(&manifest);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt
    .block_on(async {
      let cancel = CancelToken::new();
      let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
          if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling build");
            cancel.cancel();
          }
        })
      };
      let report = engine.run(&manifest, &cancel).await;
      interrupt.abort();
      report
    })
    .context("Build failed")?;

  if json {
    print_json(&report)?;
  } else {
    print_report(&report, &settings);
  }

  Ok(if report.is_success() {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  })
}

fn print_report(report: &BuildReport, settings: &Settings) {
  for service in &report.services {
    println!(
      "{} {}: {}",
      outcome_symbol(service.outcome.kind()),
      service.name,
      service.outcome
    );
  }

  println!();
  let elapsed = format_duration(Duration::from_millis(report.elapsed_ms));
  let counts = &report.counts;
  if report.is_success() && counts.cancelled == 0 && counts.skipped == 0 {
    print_success(&format!("Built {} service(s) in {}", counts.success, elapsed));
  } else {
    print_warning(&format!(
      "{} succeeded, {} failed, {} skipped, {} cancelled in {}",
      counts.success, counts.failed, counts.skipped, counts.cancelled, elapsed
    ));
  }

  let unchanged = report
    .services
    .iter()
    .filter(|s| matches!(s.outcome, ServiceOutcome::Success { unchanged: true, .. }))
    .count();
  if unchanged > 0 {
    print_stat("Unchanged", &unchanged.to_string());
  }
  print_stat("Output", &settings.output_dir.display().to_string());
}
