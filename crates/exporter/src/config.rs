// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Export configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! checkpoint = "./sd_xl_base_1.0.safetensors"
//! output = "./params/diffuser_base"
//! variant = "base"
//! key_prefix = "model.diffusion_model."
//! head_dim = 64
//! group_norm_groups = 32
//! norm_eps = 1e-5
//! transformer_norm_eps = 1e-6
//! encoding = "shape-prefixed"
//! on_mismatch = "abort"
//! tolerance = 1e-6
//! ```

use model_ir::UnetVariant;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How leaf arrays are laid out inside each `.npy` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeafEncoding {
    /// A 1-D array holding the dims followed by the row-major values;
    /// scalars are `[1, value]`.
    #[default]
    ShapePrefixed,
    /// The array with its real shape; scalars are 0-D.
    Native,
}

impl FromStr for LeafEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shape-prefixed" | "prefixed" => Ok(Self::ShapePrefixed),
            "native" | "npy" => Ok(Self::Native),
            other => Err(format!(
                "unknown encoding '{other}'; expected 'shape-prefixed' or 'native'"
            )),
        }
    }
}

/// What the exporter does when a block does not match the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MismatchPolicy {
    /// Stop at the first malformed unit. Units already written stay on disk.
    #[default]
    Abort,
    /// Record the malformed unit in the report and continue with the next.
    Skip,
}

impl FromStr for MismatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(format!(
                "unknown mismatch policy '{other}'; expected 'abort' or 'skip'"
            )),
        }
    }
}

/// Configuration for an export run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExportConfig {
    /// Path to the `.safetensors` checkpoint (CLI only).
    #[serde(default)]
    pub checkpoint: Option<PathBuf>,
    /// Root of the export tree (CLI only).
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Architecture variant.
    #[serde(default)]
    pub variant: UnetVariant,
    /// Key prefix of the UNet inside the checkpoint; auto-detected when unset.
    #[serde(default)]
    pub key_prefix: Option<String>,
    /// Width of one attention head; `n_head = to_q rows / head_dim`.
    #[serde(default = "default_head_dim")]
    pub head_dim: usize,
    /// Group count recorded for every group norm.
    #[serde(default = "default_group_norm_groups")]
    pub group_norm_groups: usize,
    /// Epsilon recorded for residual, output and layer norms.
    #[serde(default = "default_norm_eps")]
    pub norm_eps: f64,
    /// Epsilon recorded for the group norm at the entry of each spatial transformer.
    #[serde(default = "default_transformer_norm_eps")]
    pub transformer_norm_eps: f64,
    /// Layout of leaf arrays.
    #[serde(default)]
    pub encoding: LeafEncoding,
    /// Behaviour on a structurally malformed block.
    #[serde(default)]
    pub on_mismatch: MismatchPolicy,
    /// Largest absolute difference `verify` accepts between a leaf and the checkpoint.
    #[serde(default = "default_tolerance")]
    pub tolerance: f32,
}

fn default_head_dim() -> usize {
    64
}

fn default_group_norm_groups() -> usize {
    32
}

fn default_norm_eps() -> f64 {
    1e-5
}

fn default_transformer_norm_eps() -> f64 {
    1e-6
}

fn default_tolerance() -> f32 {
    1e-6
}

impl ExportConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, super::ExportError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            super::ExportError::ConfigError(format!(
                "cannot read config '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, super::ExportError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| {
            super::ExportError::ConfigError(format!("TOML parse error: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, super::ExportError> {
        toml::to_string_pretty(self).map_err(|e| {
            super::ExportError::ConfigError(format!("TOML serialise error: {e}"))
        })
    }

    /// Checks that numeric settings are usable.
    pub fn validate(&self) -> Result<(), super::ExportError> {
        if self.head_dim == 0 {
            return Err(super::ExportError::ConfigError(
                "head_dim must be positive".into(),
            ));
        }
        if self.group_norm_groups == 0 {
            return Err(super::ExportError::ConfigError(
                "group_norm_groups must be positive".into(),
            ));
        }
        for (name, eps) in [
            ("norm_eps", self.norm_eps),
            ("transformer_norm_eps", self.transformer_norm_eps),
        ] {
            if eps.is_nan() || eps <= 0.0 {
                return Err(super::ExportError::ConfigError(format!(
                    "{name} must be positive, got {eps}"
                )));
            }
        }
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return Err(super::ExportError::ConfigError(format!(
                "tolerance must be non-negative, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    /// Key prefixes tried, in order, when `key_prefix` is unset.
    pub fn prefix_candidates(&self) -> Vec<String> {
        match &self.key_prefix {
            Some(p) => vec![normalise_prefix(p)],
            None => vec![String::new(), "model.diffusion_model.".to_string()],
        }
    }
}

/// Ensures a non-empty prefix ends with a single `.`.
fn normalise_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('.');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}.")
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            checkpoint: None,
            output: None,
            variant: UnetVariant::Base,
            key_prefix: None,
            head_dim: default_head_dim(),
            group_norm_groups: default_group_norm_groups(),
            norm_eps: default_norm_eps(),
            transformer_norm_eps: default_transformer_norm_eps(),
            encoding: LeafEncoding::default(),
            on_mismatch: MismatchPolicy::default(),
            tolerance: default_tolerance(),
        }
    }
}
