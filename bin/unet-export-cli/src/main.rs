// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # unet-export
//!
//! Command-line interface for the SDXL UNet exporter.
//!
//! ## Usage
//! ```bash
//! # Export the base model
//! unet-export export --checkpoint sd_xl_base_1.0.safetensors --output params/diffuser_base
//!
//! # Export the refiner
//! unet-export export --checkpoint sd_xl_refiner_1.0.safetensors --output params/diffuser_refiner --refiner
//!
//! # Dry run: show what would be written
//! unet-export inspect --checkpoint sd_xl_base_1.0.safetensors
//!
//! # Check an existing tree against its checkpoint
//! unet-export verify --checkpoint sd_xl_base_1.0.safetensors --output params/diffuser_base
//! ```

mod commands;

use clap::{Parser, Subcommand};
use commands::ConfigArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "unet-export",
    about = "Exports SDXL UNet checkpoints into per-block .npy trees",
    version,
    author
)]
struct Cli {
    /// Path to a TOML configuration file (CLI arguments override its values).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a checkpoint's UNet into an export tree.
    Export {
        #[command(flatten)]
        args: ConfigArgs,

        /// Also write the export report as JSON to this path.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Plan the export without writing anything and print what it would do.
    Inspect {
        #[command(flatten)]
        args: ConfigArgs,
    },

    /// Check an existing export tree against its checkpoint.
    Verify {
        #[command(flatten)]
        args: ConfigArgs,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Export { args, report } => {
            let config = args.resolve(cli.config.as_deref())?;
            commands::export::execute(config, report)
        }
        Commands::Inspect { args } => {
            let config = args.resolve(cli.config.as_deref())?;
            commands::inspect::execute(config)
        }
        Commands::Verify { args } => {
            let config = args.resolve(cli.config.as_deref())?;
            commands::verify::execute(config)
        }
    }
}
