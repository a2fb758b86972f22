// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Synthetic stub UNets for testing and benchmarking.
//!
//! [`synthetic_unet`] walks the block schema and emits exactly the tensors
//! the exporter touches, with every channel dimension set to
//! [`SyntheticConfig::channels`]. Values are deterministic functions of the
//! tensor key, so two stubs built with the same config are identical and
//! every tensor is distinguishable from every other.

use crate::schema::{join_key, BlockKind, ParamKind, Part, Presence, Side, UnetVariant};
use crate::InMemorySource;
use tensor_core::{DType, Shape, Tensor};

/// Shape parameters for a synthetic UNet.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Channel width used for every layer.
    pub channels: usize,
    /// Transformer blocks per spatial transformer.
    pub transformer_depth: usize,
    /// Element type of the generated tensors.
    pub dtype: DType,
    /// Prefix prepended to every key (e.g. `"model.diffusion_model."`).
    pub key_prefix: String,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            channels: 4,
            transformer_depth: 2,
            dtype: DType::F32,
            key_prefix: String::new(),
        }
    }
}

/// Builds a stub UNet of the given variant.
///
/// Residual blocks in the output half carry a convolutional skip
/// connection; all others use an identity skip, as in the real model.
///
/// # Example
/// ```
/// use model_ir::{synthetic_unet, ModelSource, SyntheticConfig, UnetVariant};
///
/// let stub = synthetic_unet(UnetVariant::Base, &SyntheticConfig::default());
/// assert!(stub.has_prefix("input_blocks.8.1.transformer_blocks.1."));
/// ```
pub fn synthetic_unet(variant: UnetVariant, config: &SyntheticConfig) -> InMemorySource {
    let mut source = InMemorySource::new(format!("synthetic-{variant}"));
    let mut generator = Generator {
        variant,
        config,
        source: &mut source,
    };
    generator.block(BlockKind::Unet, "", false);
    source
}

struct Generator<'a> {
    variant: UnetVariant,
    config: &'a SyntheticConfig,
    source: &'a mut InMemorySource,
}

impl Generator<'_> {
    fn block(&mut self, kind: BlockKind, key: &str, with_skip: bool) {
        for part in kind.parts() {
            match *part {
                Part::Param {
                    kind: param,
                    key: k,
                    presence,
                    ..
                } => {
                    if presence == Presence::Required || with_skip {
                        self.param(param, &join_key(key, k));
                    }
                }
                Part::Block { kind: child, key: k, .. } => {
                    self.block(child, &join_key(key, k), with_skip)
                }
                Part::Repeated { kind: child, key: k, .. } => {
                    for i in 0..self.config.transformer_depth {
                        self.block(child, &join_key(key, &format!("{k}.{i}")), with_skip);
                    }
                }
                Part::Stages { key: k, side, .. } => {
                    for (i, &stage) in self.variant.stages(side).iter().enumerate() {
                        let skip = side == Side::Output;
                        self.block(stage, &join_key(k, &i.to_string()), skip);
                    }
                }
                Part::Scalar { .. } => {}
            }
        }
    }

    fn param(&mut self, kind: ParamKind, key: &str) {
        let c = self.config.channels;
        let weight = match kind {
            ParamKind::Linear => Shape::matrix(c, c),
            ParamKind::Conv2d => Shape::new(vec![c, c, 3, 3]),
            ParamKind::GroupNorm | ParamKind::LayerNorm => Shape::vector(c),
        };
        self.tensor(&join_key(key, "weight"), weight);
        self.tensor(&join_key(key, "bias"), Shape::vector(c));
    }

    fn tensor(&mut self, key: &str, shape: Shape) {
        let full = format!("{}{key}", self.config.key_prefix);
        let seed = fnv1a(full.as_bytes());
        let values: Vec<f32> = (0..shape.num_elements())
            .map(|i| ((seed % 997) as f32 + i as f32 * 0.37).sin() * 0.5)
            .collect();
        let tensor = encode(shape, &values, self.config.dtype);
        self.source.insert(full, tensor);
    }
}

fn encode(shape: Shape, values: &[f32], dtype: DType) -> Tensor {
    let bytes: Vec<u8> = match dtype {
        DType::F32 => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        DType::F16 => values
            .iter()
            .flat_map(|v| half::f16::from_f32(*v).to_le_bytes())
            .collect(),
        DType::BF16 => values
            .iter()
            .flat_map(|v| half::bf16::from_f32(*v).to_le_bytes())
            .collect(),
        DType::F64 => values
            .iter()
            .flat_map(|v| (*v as f64).to_le_bytes())
            .collect(),
    };
    Tensor::from_bytes(shape, dtype, bytes).unwrap_or_else(|_| unreachable!("sizes match"))
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |h, &b| {
        (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModelSource;

    #[test]
    fn test_base_stub_layout() {
        let stub = synthetic_unet(UnetVariant::Base, &SyntheticConfig::default());
        assert!(stub.tensor_meta("input_blocks.0.0.weight").is_some());
        assert!(stub.tensor_meta("input_blocks.3.0.op.weight").is_some());
        assert!(stub.tensor_meta("output_blocks.2.2.conv.weight").is_some());
        assert!(stub.tensor_meta("middle_block.1.proj_in.weight").is_some());
        assert!(stub.tensor_meta("out.2.bias").is_some());
        assert!(!stub.has_prefix("input_blocks.9."));
        assert!(!stub.has_prefix("output_blocks.9."));
    }

    #[test]
    fn test_skip_connections_only_in_output_half() {
        let stub = synthetic_unet(UnetVariant::Base, &SyntheticConfig::default());
        assert!(!stub.has_prefix("input_blocks.1.0.skip_connection."));
        assert!(stub.has_prefix("output_blocks.6.0.skip_connection."));
        assert!(!stub.has_prefix("middle_block.0.skip_connection."));
    }

    #[test]
    fn test_refiner_stub_layout() {
        let stub = synthetic_unet(UnetVariant::Refiner, &SyntheticConfig::default());
        assert!(stub.has_prefix("input_blocks.11.0."));
        assert!(stub.tensor_meta("output_blocks.2.1.conv.weight").is_some());
        assert!(stub.has_prefix("output_blocks.11.0."));
    }

    #[test]
    fn test_transformer_depth() {
        let config = SyntheticConfig {
            transformer_depth: 3,
            ..Default::default()
        };
        let stub = synthetic_unet(UnetVariant::Base, &config);
        assert!(stub.has_prefix("input_blocks.4.1.transformer_blocks.2."));
        assert!(!stub.has_prefix("input_blocks.4.1.transformer_blocks.3."));
    }

    #[test]
    fn test_deterministic() {
        let a = synthetic_unet(UnetVariant::Base, &SyntheticConfig::default());
        let b = synthetic_unet(UnetVariant::Base, &SyntheticConfig::default());
        assert_eq!(a.keys(), b.keys());
        for key in a.keys() {
            assert_eq!(a.load(key).unwrap(), b.load(key).unwrap());
        }
    }

    #[test]
    fn test_prefix_and_dtype() {
        let config = SyntheticConfig {
            dtype: DType::F16,
            key_prefix: "model.diffusion_model.".into(),
            ..Default::default()
        };
        let stub = synthetic_unet(UnetVariant::Base, &config);
        let meta = stub
            .tensor_meta("model.diffusion_model.time_embed.0.weight")
            .unwrap();
        assert_eq!(meta.dtype, DType::F16);
        assert!(stub.keys().iter().all(|k| k.starts_with("model.diffusion_model.")));
    }
}
