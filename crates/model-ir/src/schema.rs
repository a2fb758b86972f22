// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Declarative description of the SDXL UNet as an export tree.
//!
//! Every block variant maps to an ordered list of [`Part`]s. A part names
//! where its parameters live in the checkpoint (`key`, relative to the
//! block's own key path) and where they land on disk (`dir`, relative to the
//! block's own directory). The exporter consumes this table with one generic
//! recursive walk, so changing the architecture means editing the tables
//! below rather than the walker.
//!
//! ```text
//! Unet
//!  ├─ model_channels                       scalar
//!  ├─ lin{1,2}_{time,label}_embed          Linear
//!  ├─ input_blocks/{0..n}                  stages, one type.txt each
//!  ├─ middle_block/{res1,transformer,res2}
//!  ├─ output_blocks/{0..n}                 stages, one type.txt each
//!  └─ norm_out, conv_out
//! ```
//!
//! The two supported variants differ only in their stage tables; see
//! [`UnetVariant::stages`].

use std::fmt;
use std::str::FromStr;

/// The closed set of labels that may appear in a stage's `type.txt`.
pub const STAGE_LABELS: &[&str] = &[
    "conv",
    "resnet",
    "downsample",
    "resnet_transformer",
    "resnet_transformer_upsample",
    "resnet_upsample",
];

/// File name of the stage label written into every stage directory.
pub const LABEL_FILE: &str = "type.txt";

// ── Leaf modules ───────────────────────────────────────────────────

/// A parameterised leaf module whose tensors are written directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Fully connected layer: `weight [out, in]`, optional `bias [out]`.
    Linear,
    /// 2-D convolution: `weight [out, in, kh, kw]`, optional `bias [out]`.
    Conv2d,
    /// Group normalisation: `weight [c]`, `bias [c]`.
    GroupNorm,
    /// Layer normalisation: `weight [c]`, `bias [c]`.
    LayerNorm,
}

impl ParamKind {
    /// Rank the `weight` tensor must have for this kind.
    pub fn weight_rank(self) -> usize {
        match self {
            Self::Linear => 2,
            Self::Conv2d => 4,
            Self::GroupNorm | Self::LayerNorm => 1,
        }
    }

    /// Whether a missing `bias` tensor is a structural mismatch.
    pub fn requires_bias(self) -> bool {
        matches!(self, Self::GroupNorm | Self::LayerNorm)
    }

    /// Guesses the module kind behind a weight of the given rank, for
    /// error messages.
    pub fn describe_rank(rank: usize) -> &'static str {
        match rank {
            1 => "normalisation",
            2 => "linear",
            4 => "conv2d",
            _ => "unknown module",
        }
    }

    /// Returns a human-readable label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Conv2d => "conv2d",
            Self::GroupNorm => "group_norm",
            Self::LayerNorm => "layer_norm",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a parameter part must exist in the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// The module must be present and of the declared kind.
    Required,
    /// An absent module is an identity and nothing is written; a present
    /// one must be of the declared kind.
    OrIdentity,
}

/// Which configured epsilon a normalisation layer records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormEps {
    /// The residual and output norms, and every layer norm.
    Standard,
    /// The group norm at the entry of a spatial transformer.
    Transformer,
}

/// How a scalar hyperparameter is derived from the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarSource {
    /// Size of `axis` of the tensor at `key`.
    Dim { key: &'static str, axis: usize },
    /// Rows of the tensor at `key` divided by the configured head width.
    Heads { key: &'static str },
}

/// Which stage sequence of the UNet a [`Part::Stages`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The encoder half (`input_blocks`).
    Input,
    /// The decoder half (`output_blocks`).
    Output,
}

/// One ordered child of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part {
    /// A leaf module written to `dir` (`""` writes into the block's own directory).
    Param {
        kind: ParamKind,
        key: &'static str,
        dir: &'static str,
        presence: Presence,
        /// Epsilon recorded for norm kinds; ignored otherwise.
        eps: NormEps,
    },
    /// A nested block written to `dir` (`""` writes inline).
    Block {
        kind: BlockKind,
        key: &'static str,
        dir: &'static str,
    },
    /// `key.0`, `key.1`, … written to `{dir_prefix}0`, `{dir_prefix}1`, …,
    /// followed by the count under `count_name`. At least one is required.
    Repeated {
        kind: BlockKind,
        key: &'static str,
        dir_prefix: &'static str,
        count_name: &'static str,
    },
    /// A scalar hyperparameter leaf named `name`.
    Scalar {
        name: &'static str,
        source: ScalarSource,
    },
    /// The variant-dependent stage sequence, one numbered directory per stage.
    Stages {
        key: &'static str,
        dir: &'static str,
        side: Side,
    },
}

// ── Blocks ─────────────────────────────────────────────────────────

/// Every composite block the exporter knows how to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// The model root.
    Unet,
    /// Stage: a bare input convolution.
    Conv,
    /// Stage: a single residual block.
    Resnet,
    /// Stage: a strided downsampling convolution.
    Downsample,
    /// Stage: residual block followed by a spatial transformer.
    ResnetTransformer,
    /// Stage: residual block, spatial transformer, upsampler.
    ResnetTransformerUpsample,
    /// Stage: residual block followed by an upsampler.
    ResnetUpsample,
    /// Residual block, spatial transformer, residual block.
    MiddleBlock,
    /// Residual block with timestep embedding projection.
    ResBlock,
    /// Group norm, input projection, transformer stack, output projection.
    SpatialTransformer,
    /// Self-attention, cross-attention and GEGLU feed-forward with three layer norms.
    BasicTransformer,
    /// Multi-head (cross-)attention.
    CrossAttention,
    /// GEGLU followed by a linear projection.
    FeedForward,
    /// Gated GELU input projection.
    Geglu,
    /// The convolution inside a downsampler.
    DownsampleOp,
    /// The convolution inside an upsampler.
    UpsampleOp,
}

use Part::{Block, Param, Repeated, Scalar, Stages};
use Presence::{OrIdentity, Required};

const fn linear(key: &'static str, dir: &'static str) -> Part {
    Param {
        kind: ParamKind::Linear,
        key,
        dir,
        presence: Required,
        eps: NormEps::Standard,
    }
}

const fn conv(key: &'static str, dir: &'static str) -> Part {
    Param {
        kind: ParamKind::Conv2d,
        key,
        dir,
        presence: Required,
        eps: NormEps::Standard,
    }
}

const fn group_norm(key: &'static str, dir: &'static str) -> Part {
    Param {
        kind: ParamKind::GroupNorm,
        key,
        dir,
        presence: Required,
        eps: NormEps::Standard,
    }
}

const fn layer_norm(key: &'static str, dir: &'static str) -> Part {
    Param {
        kind: ParamKind::LayerNorm,
        key,
        dir,
        presence: Required,
        eps: NormEps::Standard,
    }
}

const fn transformer_norm(key: &'static str, dir: &'static str) -> Part {
    Param {
        kind: ParamKind::GroupNorm,
        key,
        dir,
        presence: Required,
        eps: NormEps::Transformer,
    }
}

const fn block(kind: BlockKind, key: &'static str, dir: &'static str) -> Part {
    Block { kind, key, dir }
}

const UNET: &[Part] = &[
    Scalar {
        name: "model_channels",
        source: ScalarSource::Dim {
            key: "input_blocks.0.0.weight",
            axis: 0,
        },
    },
    linear("time_embed.0", "lin1_time_embed"),
    linear("time_embed.2", "lin2_time_embed"),
    linear("label_emb.0.0", "lin1_label_embed"),
    linear("label_emb.0.2", "lin2_label_embed"),
    Stages {
        key: "input_blocks",
        dir: "input_blocks",
        side: Side::Input,
    },
    block(BlockKind::MiddleBlock, "middle_block", "middle_block"),
    Stages {
        key: "output_blocks",
        dir: "output_blocks",
        side: Side::Output,
    },
    group_norm("out.0", "norm_out"),
    conv("out.2", "conv_out"),
];

const CONV_STAGE: &[Part] = &[conv("0", "")];

const RESNET_STAGE: &[Part] = &[block(BlockKind::ResBlock, "0", "")];

const DOWNSAMPLE_STAGE: &[Part] = &[block(BlockKind::DownsampleOp, "0", "")];

const RESNET_TRANSFORMER: &[Part] = &[
    block(BlockKind::ResBlock, "0", "res"),
    block(BlockKind::SpatialTransformer, "1", "transformer"),
];

const RESNET_TRANSFORMER_UPSAMPLE: &[Part] = &[
    block(BlockKind::ResBlock, "0", "res"),
    block(BlockKind::SpatialTransformer, "1", "transformer"),
    block(BlockKind::UpsampleOp, "2", "upsample"),
];

const RESNET_UPSAMPLE: &[Part] = &[
    block(BlockKind::ResBlock, "0", "res"),
    block(BlockKind::UpsampleOp, "1", "upsample"),
];

const MIDDLE_BLOCK: &[Part] = &[
    block(BlockKind::ResBlock, "0", "res1"),
    block(BlockKind::SpatialTransformer, "1", "transformer"),
    block(BlockKind::ResBlock, "2", "res2"),
];

const RES_BLOCK: &[Part] = &[
    group_norm("in_layers.0", "norm_in"),
    conv("in_layers.2", "conv_in"),
    linear("emb_layers.1", "lin_embed"),
    group_norm("out_layers.0", "norm_out"),
    conv("out_layers.3", "conv_out"),
    Param {
        kind: ParamKind::Conv2d,
        key: "skip_connection",
        dir: "skip_connection",
        presence: OrIdentity,
        eps: NormEps::Standard,
    },
];

const SPATIAL_TRANSFORMER: &[Part] = &[
    transformer_norm("norm", "norm"),
    linear("proj_in", "proj_in"),
    Repeated {
        kind: BlockKind::BasicTransformer,
        key: "transformer_blocks",
        dir_prefix: "transformer_",
        count_name: "n_blocks",
    },
    linear("proj_out", "proj_out"),
];

const BASIC_TRANSFORMER: &[Part] = &[
    block(BlockKind::CrossAttention, "attn1", "attn1"),
    block(BlockKind::FeedForward, "ff", "mlp"),
    block(BlockKind::CrossAttention, "attn2", "attn2"),
    layer_norm("norm1", "norm1"),
    layer_norm("norm2", "norm2"),
    layer_norm("norm3", "norm3"),
];

const CROSS_ATTENTION: &[Part] = &[
    linear("to_q", "query"),
    linear("to_k", "key"),
    linear("to_v", "value"),
    linear("to_out.0", "out"),
    Scalar {
        name: "n_head",
        source: ScalarSource::Heads { key: "to_q.weight" },
    },
];

const FEED_FORWARD: &[Part] = &[
    block(BlockKind::Geglu, "net.0", "geglu"),
    linear("net.2", "lin"),
];

const GEGLU: &[Part] = &[linear("proj", "proj")];

const DOWNSAMPLE_OP: &[Part] = &[conv("op", "")];

const UPSAMPLE_OP: &[Part] = &[conv("conv", "conv")];

impl BlockKind {
    /// Returns this block's ordered children.
    pub fn parts(self) -> &'static [Part] {
        match self {
            Self::Unet => UNET,
            Self::Conv => CONV_STAGE,
            Self::Resnet => RESNET_STAGE,
            Self::Downsample => DOWNSAMPLE_STAGE,
            Self::ResnetTransformer => RESNET_TRANSFORMER,
            Self::ResnetTransformerUpsample => RESNET_TRANSFORMER_UPSAMPLE,
            Self::ResnetUpsample => RESNET_UPSAMPLE,
            Self::MiddleBlock => MIDDLE_BLOCK,
            Self::ResBlock => RES_BLOCK,
            Self::SpatialTransformer => SPATIAL_TRANSFORMER,
            Self::BasicTransformer => BASIC_TRANSFORMER,
            Self::CrossAttention => CROSS_ATTENTION,
            Self::FeedForward => FEED_FORWARD,
            Self::Geglu => GEGLU,
            Self::DownsampleOp => DOWNSAMPLE_OP,
            Self::UpsampleOp => UPSAMPLE_OP,
        }
    }

    /// Returns the `type.txt` label for stage blocks, `None` for every
    /// other block.
    pub fn label(self) -> Option<&'static str> {
        match self {
            Self::Conv => Some("conv"),
            Self::Resnet => Some("resnet"),
            Self::Downsample => Some("downsample"),
            Self::ResnetTransformer => Some("resnet_transformer"),
            Self::ResnetTransformerUpsample => Some("resnet_transformer_upsample"),
            Self::ResnetUpsample => Some("resnet_upsample"),
            _ => None,
        }
    }
}

// ── Variants ───────────────────────────────────────────────────────

/// The UNet architecture variants the schema covers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum UnetVariant {
    /// The base model: 9 input and 9 output stages.
    #[default]
    Base,
    /// The refiner: 12 input and 12 output stages.
    Refiner,
}

const BASE_INPUT: &[BlockKind] = &[
    BlockKind::Conv,
    BlockKind::Resnet,
    BlockKind::Resnet,
    BlockKind::Downsample,
    BlockKind::ResnetTransformer,
    BlockKind::ResnetTransformer,
    BlockKind::Downsample,
    BlockKind::ResnetTransformer,
    BlockKind::ResnetTransformer,
];

const BASE_OUTPUT: &[BlockKind] = &[
    BlockKind::ResnetTransformer,
    BlockKind::ResnetTransformer,
    BlockKind::ResnetTransformerUpsample,
    BlockKind::ResnetTransformer,
    BlockKind::ResnetTransformer,
    BlockKind::ResnetTransformerUpsample,
    BlockKind::Resnet,
    BlockKind::Resnet,
    BlockKind::Resnet,
];

const REFINER_INPUT: &[BlockKind] = &[
    BlockKind::Conv,
    BlockKind::Resnet,
    BlockKind::Resnet,
    BlockKind::Downsample,
    BlockKind::ResnetTransformer,
    BlockKind::ResnetTransformer,
    BlockKind::Downsample,
    BlockKind::ResnetTransformer,
    BlockKind::ResnetTransformer,
    BlockKind::Downsample,
    BlockKind::Resnet,
    BlockKind::Resnet,
];

const REFINER_OUTPUT: &[BlockKind] = &[
    BlockKind::Resnet,
    BlockKind::Resnet,
    BlockKind::ResnetUpsample,
    BlockKind::ResnetTransformer,
    BlockKind::ResnetTransformer,
    BlockKind::ResnetTransformerUpsample,
    BlockKind::ResnetTransformer,
    BlockKind::ResnetTransformer,
    BlockKind::ResnetTransformerUpsample,
    BlockKind::Resnet,
    BlockKind::Resnet,
    BlockKind::Resnet,
];

impl UnetVariant {
    /// Maps the invocation-time "is this the refiner" flag to a variant.
    pub fn from_refiner_flag(is_refiner: bool) -> Self {
        if is_refiner {
            Self::Refiner
        } else {
            Self::Base
        }
    }

    /// Returns the ordered stage kinds for one half of the UNet.
    pub fn stages(self, side: Side) -> &'static [BlockKind] {
        match (self, side) {
            (Self::Base, Side::Input) => BASE_INPUT,
            (Self::Base, Side::Output) => BASE_OUTPUT,
            (Self::Refiner, Side::Input) => REFINER_INPUT,
            (Self::Refiner, Side::Output) => REFINER_OUTPUT,
        }
    }

    /// Returns a human-readable label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Refiner => "refiner",
        }
    }
}

impl fmt::Display for UnetVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnetVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "base" => Ok(Self::Base),
            "refiner" => Ok(Self::Refiner),
            other => Err(format!(
                "unknown variant '{other}'; expected 'base' or 'refiner'"
            )),
        }
    }
}

/// Joins two dotted checkpoint key fragments, skipping empty ones.
///
/// ```
/// use model_ir::schema::join_key;
/// assert_eq!(join_key("input_blocks.4", "1"), "input_blocks.4.1");
/// assert_eq!(join_key("", "out.0"), "out.0");
/// assert_eq!(join_key("input_blocks.0.0", ""), "input_blocks.0.0");
/// ```
pub fn join_key(prefix: &str, key: &str) -> String {
    match (prefix.is_empty(), key.is_empty()) {
        (true, _) => key.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{prefix}.{key}"),
    }
}
