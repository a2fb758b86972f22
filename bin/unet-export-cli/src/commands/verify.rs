// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `unet-export verify` command: compare an export tree with its checkpoint.

use super::{banner, open_checkpoint, output_dir, print_config};
use exporter::ExportConfig;

pub fn execute(config: ExportConfig) -> anyhow::Result<()> {
    banner("Verifier");
    print_config(&config);

    let source = open_checkpoint(&config)?;
    let output = output_dir(&config)?;
    if !output.is_dir() {
        anyhow::bail!("export tree '{}' does not exist", output.display());
    }

    let report = exporter::verify(&source, output, &config)?;
    println!("  {}", report.summary());
    println!();

    if report.is_ok() {
        println!("  OK: tree matches the checkpoint");
        println!();
        return Ok(());
    }

    println!("  Problems:");
    for problem in report.problems.iter().take(20) {
        println!("   {:<60} {}", problem.path.display(), problem.detail);
    }
    if report.problems.len() > 20 {
        println!("   ... and {} more", report.problems.len() - 20);
    }
    println!();
    anyhow::bail!(
        "{} problems found in '{}'",
        report.problems.len(),
        output.display()
    )
}
