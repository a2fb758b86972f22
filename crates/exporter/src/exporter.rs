// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The export driver.
//!
//! ```text
//! Planner::units()
//!     │  for each unit
//!     ▼
//! Planner::plan(unit) ──mismatch──▶ abort | skip
//!     │  Vec<Op>
//!     ▼
//! LeafWriter (dirs, .npy leaves, type.txt)
//! ```

use crate::plan::{Op, Plan, Planner};
use crate::report::SkippedUnit;
use crate::{ExportConfig, ExportError, ExportReport, LeafWriter, MismatchPolicy};
use model_ir::ModelSource;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;

/// Exports a UNet checkpoint into an export tree.
///
/// # Example
/// ```
/// use exporter::{ExportConfig, Exporter};
/// use model_ir::{synthetic_unet, SyntheticConfig, UnetVariant};
///
/// let stub = synthetic_unet(UnetVariant::Base, &SyntheticConfig::default());
/// let config = ExportConfig { head_dim: 2, ..Default::default() };
/// let out = tempfile::tempdir().unwrap();
///
/// let report = Exporter::new(config).unwrap().export(&stub, out.path()).unwrap();
/// assert_eq!(report.labels, 18);
/// assert!(out.path().join("input_blocks/8/type.txt").exists());
/// ```
#[derive(Debug, Clone)]
pub struct Exporter {
    config: ExportConfig,
}

impl Exporter {
    /// Creates an exporter after validating `config`.
    pub fn new(config: ExportConfig) -> Result<Self, ExportError> {
        config.validate()?;
        tracing::info!(
            "exporter created: variant '{}', encoding {:?}, on mismatch {:?}",
            config.variant,
            config.encoding,
            config.on_mismatch
        );
        Ok(Self { config })
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Plans the whole export without touching the filesystem.
    pub fn plan_all(&self, source: &dyn ModelSource) -> Result<Plan, ExportError> {
        let planner = Planner::new(source, &self.config)?;
        Ok(planner.plan_all())
    }

    /// Writes the export tree for `source` under `out_dir`.
    ///
    /// Each unit is planned in full before any of its files are written.
    /// With [`MismatchPolicy::Abort`] the first malformed unit ends the
    /// export with [`ExportError::StructuralMismatch`]; units written before
    /// it stay on disk. With [`MismatchPolicy::Skip`] it is recorded in the
    /// report instead.
    pub fn export(
        &self,
        source: &dyn ModelSource,
        out_dir: &Path,
    ) -> Result<ExportReport, ExportError> {
        let start = Instant::now();
        let planner = Planner::new(source, &self.config)?;
        let writer = LeafWriter::new(out_dir, self.config.encoding);
        writer.create_dir(Path::new(""))?;

        tracing::info!(
            "exporting '{}' ({} variant) to {}",
            source.name(),
            self.config.variant,
            out_dir.display()
        );

        let mut report = ExportReport::new(
            source.name().to_string(),
            self.config.variant,
            planner.prefix().to_string(),
            out_dir.to_path_buf(),
        );
        let mut visited = BTreeSet::new();

        for unit in planner.units() {
            let ops = match planner.plan(&unit) {
                Ok(ops) => ops,
                Err(e) if e.is_structural() && self.config.on_mismatch == MismatchPolicy::Skip => {
                    tracing::warn!("skipping {}: {e}", unit.name());
                    report.skipped.push(SkippedUnit {
                        unit: unit.name().to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
                Err(e) => {
                    tracing::error!("export stopped at {}: {e}", unit.name());
                    return Err(e);
                }
            };

            for op in &ops {
                self.execute(source, &writer, op, &mut report)?;
                if let Op::Tensor { key, .. } = op {
                    visited.insert(key.clone());
                }
            }
            report.units_written += 1;
            tracing::info!("exported {} ({} operations)", unit.name(), ops.len());
        }

        report.unvisited_keys = planner.unvisited(&visited);
        if !report.unvisited_keys.is_empty() {
            tracing::warn!(
                "{} checkpoint keys were not exported, first: {}",
                report.unvisited_keys.len(),
                report.unvisited_keys[0]
            );
        }
        report.duration = start.elapsed();
        tracing::info!("{}", report.summary());
        Ok(report)
    }

    fn execute(
        &self,
        source: &dyn ModelSource,
        writer: &LeafWriter,
        op: &Op,
        report: &mut ExportReport,
    ) -> Result<(), ExportError> {
        match op {
            Op::CreateDir(dir) => {
                writer.create_dir(dir)?;
                report.directories += 1;
            }
            Op::Tensor {
                key,
                file,
                transpose,
            } => {
                let mut tensor = source.load(key)?;
                *report.source_dtypes.entry(tensor.dtype()).or_default() += 1;
                if *transpose {
                    tensor = tensor.transpose_2d()?;
                }
                tracing::debug!("{key} {} {} -> {}", tensor.dtype(), tensor.shape(), file.display());
                report.bytes_written += writer.write_tensor(file, &tensor)?;
                report.tensors += 1;
            }
            Op::Scalar { file, value } => {
                tracing::debug!("{} = {value}", file.display());
                report.bytes_written += writer.write_scalar(file, *value)?;
                report.scalars += 1;
            }
            Op::Label { file, label } => {
                report.bytes_written += writer.write_label(file, label)?;
                report.labels += 1;
            }
        }
        Ok(())
    }
}
