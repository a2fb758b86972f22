// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommand implementations and the options they share.

pub mod export;
pub mod inspect;
pub mod verify;

use exporter::{ExportConfig, LeafEncoding, MismatchPolicy};
use model_ir::{SafeTensorsSource, UnetVariant};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Options shared by every subcommand. Each one overrides the matching
/// value of the `--config` file.
#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Path to the `.safetensors` checkpoint.
    #[arg(short = 'i', long)]
    checkpoint: Option<PathBuf>,

    /// Root directory of the export tree.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Treat the checkpoint as the refiner (12 input and 12 output stages).
    #[arg(long)]
    refiner: bool,

    /// Key prefix of the UNet inside the checkpoint (auto-detected by default).
    #[arg(long)]
    key_prefix: Option<String>,

    /// Width of one attention head.
    #[arg(long)]
    head_dim: Option<usize>,

    /// Leaf layout: shape-prefixed or native.
    #[arg(long)]
    encoding: Option<LeafEncoding>,

    /// What to do with a malformed block: abort or skip.
    #[arg(long)]
    on_mismatch: Option<MismatchPolicy>,

    /// Largest value difference `verify` accepts.
    #[arg(long)]
    tolerance: Option<f32>,
}

impl ConfigArgs {
    /// Loads the config file (if any) and applies the CLI overrides.
    pub fn resolve(self, config_file: Option<&Path>) -> anyhow::Result<ExportConfig> {
        let mut config = match config_file {
            Some(path) => ExportConfig::from_file(path)?,
            None => ExportConfig::default(),
        };
        if self.checkpoint.is_some() {
            config.checkpoint = self.checkpoint;
        }
        if self.output.is_some() {
            config.output = self.output;
        }
        if self.refiner {
            config.variant = UnetVariant::Refiner;
        }
        if self.key_prefix.is_some() {
            config.key_prefix = self.key_prefix;
        }
        if let Some(head_dim) = self.head_dim {
            config.head_dim = head_dim;
        }
        if let Some(encoding) = self.encoding {
            config.encoding = encoding;
        }
        if let Some(policy) = self.on_mismatch {
            config.on_mismatch = policy;
        }
        if let Some(tolerance) = self.tolerance {
            config.tolerance = tolerance;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Initialises the tracing subscriber. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Opens the configured checkpoint.
pub fn open_checkpoint(config: &ExportConfig) -> anyhow::Result<SafeTensorsSource> {
    let path = config
        .checkpoint
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("no checkpoint given (use --checkpoint or the config file)"))?;
    SafeTensorsSource::open(path)
        .map_err(|e| anyhow::anyhow!("failed to open checkpoint '{}': {e}", path.display()))
}

/// Returns the configured export root.
pub fn output_dir(config: &ExportConfig) -> anyhow::Result<&Path> {
    config
        .output
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("no output directory given (use --output or the config file)"))
}

pub fn banner(title: &str) {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║{:^54}║", format!("unet-export · {title}"));
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
}

pub fn print_config(config: &ExportConfig) {
    let show = |p: &Option<PathBuf>| {
        p.as_ref()
            .map_or_else(|| "-".to_string(), |p| p.display().to_string())
    };
    println!("  Config:");
    println!("   Checkpoint: {}", show(&config.checkpoint));
    println!("   Output:     {}", show(&config.output));
    println!("   Variant:    {}", config.variant);
    println!(
        "   Prefix:     {}",
        config.key_prefix.as_deref().unwrap_or("(auto)")
    );
    println!("   Encoding:   {:?}", config.encoding);
    println!("   Mismatch:   {:?}", config.on_mismatch);
    println!();
}

/// Truncates a string to `max_len` with ellipsis if needed.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}
