// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `unet-export export` command: write the export tree for a checkpoint.

use super::{banner, open_checkpoint, output_dir, print_config, truncate};
use exporter::{ExportConfig, ExportReport, Exporter};
use model_ir::ModelSource;
use std::path::PathBuf;

pub fn execute(config: ExportConfig, report_path: Option<PathBuf>) -> anyhow::Result<()> {
    banner("Export");
    print_config(&config);
    tracing::debug!("resolved config: {config:?}");

    let source = open_checkpoint(&config)?;
    let output = output_dir(&config)?.to_path_buf();
    println!("  [1/2] Opened {} ({} tensors)", source.name(), source.keys().len());

    let exporter = Exporter::new(config)?;
    println!("  [2/2] Writing {}...", output.display());
    let report = exporter.export(&source, &output).map_err(|e| {
        anyhow::anyhow!(
            "export failed: {e}\n        files written before the failure were left in '{}'",
            output.display()
        )
    })?;
    println!();

    // ── Results ────────────────────────────────────────────────
    println!("  Results:");
    println!("   Key prefix:  {}", display_prefix(&report.key_prefix));
    println!("   Units:       {}", report.units_written);
    println!("   Directories: {}", report.directories);
    println!("   Tensors:     {}", report.tensors);
    println!("   Scalars:     {}", report.scalars);
    println!("   Labels:      {}", report.labels);
    println!("   Files:       {}", report.files());
    let dtypes: Vec<String> = report
        .source_dtypes
        .iter()
        .map(|(dtype, n)| format!("{n} {dtype}"))
        .collect();
    println!("   Source:      {}", dtypes.join(", "));
    println!(
        "   Written:     {:.2} MB in {:.2}s",
        report.bytes_written as f64 / (1024.0 * 1024.0),
        report.duration.as_secs_f64()
    );
    println!();

    if !report.skipped.is_empty() {
        println!("  Skipped units ({}):", report.skipped.len());
        for skipped in &report.skipped {
            println!("   {:<18} {}", skipped.unit, truncate(&skipped.reason, 90));
        }
        println!();
    }

    if !report.unvisited_keys.is_empty() {
        println!(
            "  Checkpoint keys not exported ({}):",
            report.unvisited_keys.len()
        );
        for key in report.unvisited_keys.iter().take(10) {
            println!("   {key}");
        }
        if report.unvisited_keys.len() > 10 {
            println!("   ... and {} more", report.unvisited_keys.len() - 10);
        }
        println!();
    }

    if let Some(path) = report_path {
        std::fs::write(&path, report.to_json()?).map_err(|e| {
            anyhow::anyhow!("failed to write report '{}': {e}", path.display())
        })?;
        println!("  Report written to {}", path.display());
        println!();
    }

    ensure_complete(&report)
}

/// Fails when units were skipped, after everything else has been reported.
fn ensure_complete(report: &ExportReport) -> anyhow::Result<()> {
    if !report.is_complete() {
        anyhow::bail!(
            "{} unit(s) skipped; the tree in '{}' is incomplete",
            report.skipped.len(),
            report.output.display()
        );
    }
    Ok(())
}

pub(super) fn display_prefix(prefix: &str) -> &str {
    if prefix.is_empty() {
        "(none)"
    } else {
        prefix
    }
}
