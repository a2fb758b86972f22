// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # model-ir
//!
//! The model side of the UNet exporter: what the network looks like, and
//! where its parameters come from.
//!
//! - [`BlockKind`] / [`Part`]: the declarative block schema: every block
//!   variant as an ordered list of named children.
//! - [`UnetVariant`]: base or refiner; selects the input/output stage tables.
//! - [`ModelSource`]: a read-only, key-addressed view of a checkpoint, with
//!   [`SafeTensorsSource`] and [`InMemorySource`] implementations.
//! - [`synthetic_unet`]: a deterministic stub model that exposes exactly the
//!   parameters the exporter touches.
//!
//! # Supported Model Format
//! A checkpoint is a single `.safetensors` file holding the UNet state dict,
//! either bare (`input_blocks.0.0.weight`) or nested inside a full pipeline
//! checkpoint (`model.diffusion_model.input_blocks.0.0.weight`).
//!
//! # Example
//! ```no_run
//! use model_ir::{ModelSource, SafeTensorsSource, UnetVariant};
//! use model_ir::schema::Side;
//! use std::path::Path;
//!
//! let source = SafeTensorsSource::open(Path::new("./sd_xl_base_1.0.safetensors")).unwrap();
//! for stage in UnetVariant::Base.stages(Side::Input) {
//!     println!("{:?}", stage.label());
//! }
//! println!("{} tensors in {}", source.keys().len(), source.name());
//! ```

mod error;
pub mod schema;
mod source;
mod synthetic;

pub use error::ModelError;
pub use schema::{BlockKind, NormEps, ParamKind, Part, Presence, ScalarSource, UnetVariant};
pub use source::{InMemorySource, ModelSource, SafeTensorsSource, TensorMeta};
pub use synthetic::{synthetic_unet, SyntheticConfig};
