// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Owned tensor buffers for moving checkpoint parameters from a SafeTensors
//! file to export leaf files.
//!
//! This crate provides:
//! - [`Tensor`]: an n-dimensional tensor stored as little-endian bytes.
//! - [`Shape`]: runtime shape descriptors.
//! - [`DType`]: element types found in diffusion checkpoints (f32, f16, bf16, f64).
//! - Widening of every supported element type to `f32` and 2-D transposition,
//!   the two transformations the exporter applies to parameters.
//!
//! # Example
//! ```
//! use tensor_core::{Shape, Tensor};
//!
//! let t = Tensor::from_f32(Shape::matrix(2, 3), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
//! let tt = t.transpose_2d().unwrap();
//! assert_eq!(tt.shape(), &Shape::matrix(3, 2));
//! assert_eq!(tt.to_f32_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
//! ```

mod dtype;
mod error;
mod shape;
mod tensor;

pub use dtype::DType;
pub use error::TensorError;
pub use shape::Shape;
pub use tensor::Tensor;
