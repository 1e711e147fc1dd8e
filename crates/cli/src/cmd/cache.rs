//! Implementation of the `microfunc cache` commands.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use microfunc_lib::artifact::unix_now;
use microfunc_lib::settings::{Overrides, Settings};
use microfunc_lib::util::hash::Hashable;

use super::load_manifest;
use crate::output::{format_bytes, print_info, print_json, print_stat, print_success, symbols};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheListing {
  identity: String,
  fingerprint: String,
  age_seconds: u64,
  ttl_seconds: u64,
  fresh: bool,
  size: usize,
}

pub fn cmd_cache_list(file: &Path, json: bool) -> Result<()> {
  let manifest = load_manifest(file)?;
  let settings = Settings::resolve(&manifest, file, &Overrides::default());
  let store = settings.cache_store();
  let entries = store.list().context("Failed to read artifact cache")?;

  let mut digests = HashMap::new();
  for source in manifest.sources.values() {
    let digest = source.compute_hash().context("Failed to hash source")?;
    digests.insert(source.identity(), digest);
  }

  let now = unix_now();
  let listing: Vec<_> = entries
    .iter()
    .map(|entry| CacheListing {
      identity: entry.identity.to_string(),
      fingerprint: entry.artifact.fingerprint.0.clone(),
      age_seconds: entry.age(now),
      ttl_seconds: entry.ttl_seconds,
      fresh: digests
        .get(&entry.identity)
        .is_some_and(|digest| entry.is_fresh(now, digest)),
      size: entry.artifact.size(),
    })
    .collect();

  if json {
    return print_json(&listing);
  }

  if listing.is_empty() {
    print_info("Artifact cache is empty.");
    return Ok(());
  }

  for item in &listing {
    let state = if item.fresh { "fresh" } else { "stale" };
    println!(
      "  {} {} {} ({}, {}, age {}s)",
      symbols::INFO,
      item.identity,
      &item.fingerprint[..item.fingerprint.len().min(12)],
      state,
      format_bytes(item.size as u64),
      item.age_seconds
    );
  }
  println!();
  print_stat("Entries", &listing.len().to_string());
  print_stat("Directory", &store.dir().display().to_string());
  Ok(())
}

pub fn cmd_cache_clear(file: &Path) -> Result<()> {
  let manifest = load_manifest(file)?;
  let settings = Settings::resolve(&manifest, file, &Overrides::default());
  let removed = settings
    .cache_store()
    .clear()
    .context("Failed to clear artifact cache")?;
  print_success(&format!("Removed {} cache entr{}", removed, if removed == 1 { "y" } else { "ies" }));
  Ok(())
}
