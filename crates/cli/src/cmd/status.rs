//! Status command implementation.
//!
//! Displays the last registry record of every built service.

use std::path::Path;

use anyhow::{Context, Result};

use microfunc_lib::settings::{Overrides, Settings};

use super::load_manifest;
use crate::output::{format_timestamp, outcome_symbol, print_info, print_json};

pub fn cmd_status(file: &Path, json: bool) -> Result<()> {
  let manifest = load_manifest(file)?;
  let settings = Settings::resolve(&manifest, file, &Overrides::default());
  let records = settings.registry().list().context("Failed to read registry")?;

  if json {
    return print_json(&records);
  }

  if records.is_empty() {
    print_info("No build records found. Run 'microfunc build' to create them.");
    return Ok(());
  }

  for record in &records {
    let fingerprint = record
      .artifact_fingerprint
      .as_ref()
      .map(|f| f.short().to_string())
      .unwrap_or_else(|| "-".to_string());
    println!(
      "{} {} {} {} {} ({})",
      outcome_symbol(record.outcome),
      record.service,
      record.outcome,
      fingerprint,
      format_timestamp(record.resolved_at),
      record.source_identity
    );
  }

  let undeclared: Vec<_> = records
    .iter()
    .filter(|r| manifest.service(&r.service).is_none())
    .map(|r| r.service.as_str())
    .collect();
  if !undeclared.is_empty() {
    println!();
    print_info(&format!("No longer in the manifest: {}", undeclared.join(", ")));
  }

  Ok(())
}
