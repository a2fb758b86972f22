// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `unet-export inspect` command: plan the export and print it without
//! writing anything.

use super::export::display_prefix;
use super::{banner, open_checkpoint, print_config, truncate};
use exporter::{ExportConfig, Exporter, Op};
use model_ir::ModelSource;

pub fn execute(config: ExportConfig) -> anyhow::Result<()> {
    banner("Inspector");
    print_config(&config);

    let source = open_checkpoint(&config)?;
    let plan = Exporter::new(config)?.plan_all(&source)?;

    // ── Summary ────────────────────────────────────────────────
    println!("  Checkpoint: {}", source.name());
    println!("  Tensors:    {}", source.keys().len());
    println!("  Key prefix: {}", display_prefix(&plan.key_prefix));
    println!("  Units:      {}", plan.units.len());
    println!("  Operations: {}", plan.op_count());
    println!("  Mismatches: {}", plan.mismatches());
    println!();

    // ── Per-Unit Detail ────────────────────────────────────────
    println!(
        "  {:<18} {:<28} {:>6} {:>6} {:>6} {:>10}",
        "Unit", "Label", "Dirs", "Tens.", "Scal.", "Size"
    );
    println!("  {}", "-".repeat(80));

    for planned in &plan.units {
        let label = planned.unit.label().unwrap_or("");
        match &planned.ops {
            Ok(ops) => {
                let mut dirs = 0;
                let mut tensors = 0;
                let mut scalars = 0;
                let mut bytes = 0usize;
                for op in ops {
                    match op {
                        Op::CreateDir(_) => dirs += 1,
                        Op::Tensor { key, .. } => {
                            tensors += 1;
                            bytes += source
                                .tensor_meta(key)
                                .map_or(0, |m| m.shape.num_elements() * 4);
                        }
                        Op::Scalar { .. } => scalars += 1,
                        Op::Label { .. } => {}
                    }
                }
                println!(
                    "  {:<18} {:<28} {:>6} {:>6} {:>6} {:>7.1} MB",
                    planned.unit.name(),
                    label,
                    dirs,
                    tensors,
                    scalars,
                    bytes as f64 / (1024.0 * 1024.0),
                );
            }
            Err(e) => {
                println!(
                    "  {:<18} {:<28} MISMATCH {}",
                    planned.unit.name(),
                    label,
                    truncate(&e.to_string(), 60)
                );
            }
        }
    }
    println!();

    if !plan.unvisited_keys.is_empty() {
        println!(
            "  Checkpoint keys no unit reads ({}):",
            plan.unvisited_keys.len()
        );
        for key in plan.unvisited_keys.iter().take(10) {
            println!("   {key}");
        }
        println!();
    }

    Ok(())
}
