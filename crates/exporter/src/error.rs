// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the exporter.

use std::path::PathBuf;

/// Errors that can occur while planning, writing or verifying an export.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The checkpoint does not have the structure the schema requires at `path`.
    #[error("structural mismatch at '{path}': {detail}")]
    StructuralMismatch { path: String, detail: String },

    /// No UNet parameters were found under any of the tried key prefixes.
    #[error("no UNet found in '{source_name}' (tried prefixes: {tried:?})")]
    UnetNotFound {
        source_name: String,
        tried: Vec<String>,
    },

    /// A filesystem operation failed.
    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A leaf file could not be encoded or decoded.
    #[error("npy error at '{}': {detail}", path.display())]
    Npy { path: PathBuf, detail: String },

    /// Reading from the model source failed.
    #[error("model error: {0}")]
    Model(#[from] model_ir::ModelError),

    /// A tensor transformation failed.
    #[error("tensor error: {0}")]
    Tensor(#[from] tensor_core::TensorError),

    /// The export report could not be serialised.
    #[error("report error: {0}")]
    Report(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl ExportError {
    pub(crate) fn mismatch(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::StructuralMismatch {
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    /// Returns `true` for errors that concern a single malformed block
    /// rather than the whole export.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::StructuralMismatch { .. })
    }
}
