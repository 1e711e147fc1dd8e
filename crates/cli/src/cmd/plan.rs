//! Implementation of the `microfunc plan` command.
//!
//! Loads the manifest and prints the dependency-ordered build plan grouped
//! into the waves the engine would run.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use microfunc_lib::execute::ExecutionDag;
use microfunc_lib::plan::build_plan;

use super::load_manifest;
use crate::output::{print_info, print_json, symbols};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlannedEntry<'a> {
  name: &'a str,
  source: &'a str,
  depends_on: &'a [String],
  wave: usize,
}

pub fn cmd_plan(file: &Path, json: bool) -> Result<()> {
  let manifest = load_manifest(file)?;
  let plan = build_plan(&manifest.services).context("Failed to plan services")?;
  let waves = ExecutionDag::from_plan(&plan).waves();

  let mut wave_of = vec![0; plan.len()];
  for (wave, indices) in waves.iter().enumerate() {
    for &index in indices {
      wave_of[index] = wave;
    }
  }

  if json {
    let services: Vec<_> = plan
      .iter()
      .zip(&wave_of)
      .map(|(planned, &wave)| PlannedEntry {
        name: &planned.spec.name,
        source: &planned.spec.function.source,
        depends_on: &planned.spec.depends_on,
        wave,
      })
      .collect();
    return print_json(&serde_json::json!({ "services": services, "waves": waves.len() }));
  }

  if plan.is_empty() {
    print_info("No services declared.");
    return Ok(());
  }

  println!("Plan: {} service(s) in {} wave(s)", plan.len(), waves.len());
  for (wave, indices) in waves.iter().enumerate() {
    println!();
    println!("Wave {}:", wave + 1);
    for &index in indices {
      let Some(planned) = plan.get(index) else {
        continue;
      };
      let source = &planned.spec.function.source;
      if planned.spec.depends_on.is_empty() {
        println!("  {} {} ({})", symbols::INFO, planned.spec.name, source);
      } else {
        println!(
          "  {} {} ({}) {} {}",
          symbols::INFO,
          planned.spec.name,
          source,
          symbols::ARROW,
          planned.spec.depends_on.join(", ")
        );
      }
    }
  }

  Ok(())
}
