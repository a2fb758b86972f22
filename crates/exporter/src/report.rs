// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Export run statistics.

use model_ir::UnetVariant;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tensor_core::DType;

/// A unit that was left out under the `skip` mismatch policy.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SkippedUnit {
    /// Unit path in the export tree, e.g. `output_blocks/7`.
    pub unit: String,
    /// Why planning failed.
    pub reason: String,
}

/// What an export wrote.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExportReport {
    /// Name of the model source.
    pub source: String,
    pub variant: UnetVariant,
    /// Key prefix the UNet was found under.
    pub key_prefix: String,
    /// Root of the export tree.
    pub output: PathBuf,
    pub units_written: usize,
    pub directories: usize,
    pub tensors: usize,
    pub scalars: usize,
    pub labels: usize,
    pub bytes_written: u64,
    /// Exported tensors by their element type in the checkpoint.
    pub source_dtypes: BTreeMap<DType, usize>,
    pub skipped: Vec<SkippedUnit>,
    /// Checkpoint keys under the prefix that were not exported.
    pub unvisited_keys: Vec<String>,
    pub duration: Duration,
}

impl ExportReport {
    pub fn new(source: String, variant: UnetVariant, key_prefix: String, output: PathBuf) -> Self {
        Self {
            source,
            variant,
            key_prefix,
            output,
            units_written: 0,
            directories: 0,
            tensors: 0,
            scalars: 0,
            labels: 0,
            bytes_written: 0,
            source_dtypes: BTreeMap::new(),
            skipped: Vec::new(),
            unvisited_keys: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Returns `true` if every unit was written.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    /// Total number of files written.
    pub fn files(&self) -> usize {
        self.tensors + self.scalars + self.labels
    }

    /// Serialises the report as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, crate::ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let mb = self.bytes_written as f64 / (1024.0 * 1024.0);
        format!(
            "Export ({}): {} units, {} tensors, {} scalars, {} labels, \
             {:.2} MB in {:.2}s, {} skipped, {} unvisited keys",
            self.variant,
            self.units_written,
            self.tensors,
            self.scalars,
            self.labels,
            mb,
            self.duration.as_secs_f64(),
            self.skipped.len(),
            self.unvisited_keys.len(),
        )
    }
}
