// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for reading model sources.

/// Errors that can occur when reading a model checkpoint.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The checkpoint file could not be opened or mapped.
    #[error("cannot open checkpoint '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The SafeTensors header is malformed.
    #[error("failed to parse SafeTensors: {0}")]
    SafeTensorsError(String),

    /// A tensor was requested that the source does not contain.
    #[error("tensor not found: {name}")]
    TensorNotFound { name: String },

    /// The checkpoint stores a tensor in an element type the exporter cannot widen to f32.
    #[error("tensor '{name}' has unsupported dtype {dtype}")]
    UnsupportedDType { name: String, dtype: String },

    /// Tensor bytes were inconsistent with the declared shape.
    #[error("tensor '{name}': {source}")]
    Tensor {
        name: String,
        #[source]
        source: tensor_core::TensorError,
    },
}
