// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # exporter
//!
//! Walks an SDXL UNet checkpoint and writes it as an export tree: one
//! directory per block, one `.npy` file per parameter tensor or scalar
//! hyperparameter, and a `type.txt` label in every input and output stage.
//!
//! ```text
//! params/
//! ├── model_channels.npy
//! ├── lin1_time_embed/{weight,bias}.npy
//! ├── input_blocks/
//! │   ├── n_blocks.npy
//! │   ├── 0/{type.txt,weight.npy,bias.npy}
//! │   └── 4/{type.txt,res/...,transformer/...}
//! ├── middle_block/{res1,transformer,res2}/...
//! ├── output_blocks/...
//! └── norm_out/, conv_out/
//! ```
//!
//! The walk is driven by the schema tables in [`model_ir::schema`]; see
//! [`Planner`] for how units are planned and [`Exporter`] for how they are
//! written.

mod config;
mod error;
mod exporter;
mod leaf;
pub mod plan;
mod report;
mod verify;

pub use config::{ExportConfig, LeafEncoding, MismatchPolicy};
pub use error::ExportError;
pub use exporter::Exporter;
pub use leaf::{read_leaf, Leaf, LeafWriter};
pub use plan::{Op, Plan, Planner};
pub use report::{ExportReport, SkippedUnit};
pub use verify::{verify, VerifyProblem, VerifyReport};
