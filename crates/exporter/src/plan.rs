// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The model graph walker.
//!
//! [`Planner`] walks the block schema against a [`ModelSource`] and turns
//! each export *unit* into a flat list of [`Op`]s. Planning reads tensor
//! metadata only, so a unit whose structure does not match the schema is
//! rejected before any of its files exist.
//!
//! Units are the root parts of the UNet plus every individual stage:
//!
//! ```text
//! model_channels, lin1_time_embed, ..., input_blocks, input_blocks/0, ...,
//! middle_block, output_blocks, output_blocks/0, ..., norm_out, conv_out
//! ```

use crate::{ExportConfig, ExportError};
use model_ir::schema::{
    join_key, BlockKind, NormEps, ParamKind, Part, Presence, ScalarSource, Side, LABEL_FILE,
};
use model_ir::{ModelSource, TensorMeta};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Tensor whose presence identifies the UNet key prefix.
const ANCHOR_KEY: &str = "input_blocks.0.0.weight";

/// One filesystem action of an export. Paths are relative to the export root.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Create a directory (idempotent).
    CreateDir(PathBuf),
    /// Write the checkpoint tensor at `key`, transposed when `transpose` is set.
    Tensor {
        key: String,
        file: PathBuf,
        transpose: bool,
    },
    /// Write a scalar hyperparameter.
    Scalar { file: PathBuf, value: f64 },
    /// Write a stage label.
    Label { file: PathBuf, label: &'static str },
}

impl Op {
    /// Path this operation creates, relative to the export root.
    pub fn path(&self) -> &Path {
        match self {
            Op::CreateDir(dir) => dir,
            Op::Tensor { file, .. } | Op::Scalar { file, .. } | Op::Label { file, .. } => file,
        }
    }
}

/// A group of operations that is planned as a whole before being written.
#[derive(Debug, Clone)]
pub struct Unit {
    name: String,
    target: Target,
}

#[derive(Debug, Clone)]
enum Target {
    Root(Part),
    StageHeader {
        key: &'static str,
        dir: &'static str,
        side: Side,
    },
    Stage {
        kind: BlockKind,
        key: String,
        dir: PathBuf,
    },
}

impl Unit {
    /// Path of the unit in the export tree, e.g. `input_blocks/4`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage label, for stage units.
    pub fn label(&self) -> Option<&'static str> {
        match &self.target {
            Target::Stage { kind, .. } => kind.label(),
            _ => None,
        }
    }
}

/// The outcome of planning one unit.
#[derive(Debug)]
pub struct PlannedUnit {
    pub unit: Unit,
    pub ops: Result<Vec<Op>, ExportError>,
}

/// A full dry run: every unit planned, nothing written.
#[derive(Debug)]
pub struct Plan {
    /// Key prefix the UNet was found under.
    pub key_prefix: String,
    pub units: Vec<PlannedUnit>,
    /// Checkpoint keys under the prefix that no planned unit reads.
    pub unvisited_keys: Vec<String>,
}

impl Plan {
    /// Number of units that failed to plan.
    pub fn mismatches(&self) -> usize {
        self.units.iter().filter(|u| u.ops.is_err()).count()
    }

    /// Total number of operations over all units that planned cleanly.
    pub fn op_count(&self) -> usize {
        self.units
            .iter()
            .filter_map(|u| u.ops.as_ref().ok())
            .map(Vec::len)
            .sum()
    }
}

/// Walks the schema for one checkpoint.
pub struct Planner<'a> {
    source: &'a dyn ModelSource,
    config: &'a ExportConfig,
    prefix: String,
}

impl<'a> Planner<'a> {
    /// Creates a planner, resolving the key prefix the UNet lives under.
    ///
    /// # Errors
    /// Returns [`ExportError::UnetNotFound`] if no candidate prefix holds
    /// the first input convolution.
    pub fn new(source: &'a dyn ModelSource, config: &'a ExportConfig) -> Result<Self, ExportError> {
        let tried = config.prefix_candidates();
        let prefix = tried
            .iter()
            .find(|p| source.tensor_meta(&format!("{p}{ANCHOR_KEY}")).is_some())
            .cloned()
            .ok_or_else(|| ExportError::UnetNotFound {
                source_name: source.name().to_string(),
                tried: tried.clone(),
            })?;
        tracing::debug!("UNet in '{}' found under prefix '{prefix}'", source.name());
        Ok(Self {
            source,
            config,
            prefix,
        })
    }

    /// The resolved key prefix (empty or ending in `.`).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Enumerates the export units in write order.
    pub fn units(&self) -> Vec<Unit> {
        let mut units = Vec::new();
        for part in BlockKind::Unet.parts() {
            match *part {
                Part::Stages { key, dir, side } => {
                    units.push(Unit {
                        name: dir.to_string(),
                        target: Target::StageHeader { key, dir, side },
                    });
                    for (i, &kind) in self.config.variant.stages(side).iter().enumerate() {
                        units.push(Unit {
                            name: format!("{dir}/{i}"),
                            target: Target::Stage {
                                kind,
                                key: join_key(key, &i.to_string()),
                                dir: Path::new(dir).join(i.to_string()),
                            },
                        });
                    }
                }
                other => units.push(Unit {
                    name: part_name(&other).to_string(),
                    target: Target::Root(other),
                }),
            }
        }
        units
    }

    /// Plans a single unit against the checkpoint metadata.
    ///
    /// # Errors
    /// Returns [`ExportError::StructuralMismatch`] naming the first dotted
    /// key path that does not fit the schema.
    pub fn plan(&self, unit: &Unit) -> Result<Vec<Op>, ExportError> {
        let mut ops = Vec::new();
        match &unit.target {
            Target::Root(part) => self.plan_part(part, "", Path::new(""), &mut ops)?,
            Target::StageHeader { key, dir, side } => {
                self.plan_stage_header(key, Path::new(dir), *side, &mut ops)?
            }
            Target::Stage { kind, key, dir } => self.plan_stage(*kind, key, dir, &mut ops)?,
        }
        Ok(ops)
    }

    /// Plans every unit without writing anything.
    pub fn plan_all(&self) -> Plan {
        let units: Vec<PlannedUnit> = self
            .units()
            .into_iter()
            .map(|unit| {
                let ops = self.plan(&unit);
                PlannedUnit { unit, ops }
            })
            .collect();
        let visited = units
            .iter()
            .filter_map(|u| u.ops.as_ref().ok())
            .flatten()
            .filter_map(|op| match op {
                Op::Tensor { key, .. } => Some(key.clone()),
                _ => None,
            })
            .collect();
        Plan {
            key_prefix: self.prefix.clone(),
            unvisited_keys: self.unvisited(&visited),
            units,
        }
    }

    /// Keys under the prefix that are not in `visited`.
    pub fn unvisited(&self, visited: &BTreeSet<String>) -> Vec<String> {
        self.source
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(&self.prefix) && !visited.contains(*k))
            .map(str::to_string)
            .collect()
    }

    // ── Walk ───────────────────────────────────────────────────────

    fn plan_part(
        &self,
        part: &Part,
        key: &str,
        dir: &Path,
        ops: &mut Vec<Op>,
    ) -> Result<(), ExportError> {
        match *part {
            Part::Param {
                kind,
                key: k,
                dir: d,
                presence,
                eps,
            } => self.plan_param(kind, &join_key(key, k), dir, d, presence, eps, ops),
            Part::Block { kind, key: k, dir: d } => {
                let child = child_dir(dir, d);
                if !d.is_empty() {
                    ops.push(Op::CreateDir(child.clone()));
                }
                self.plan_block(kind, &join_key(key, k), &child, ops)
            }
            Part::Repeated {
                kind,
                key: k,
                dir_prefix,
                count_name,
            } => {
                let base = join_key(key, k);
                let count = (0..)
                    .take_while(|i| self.has_module(&format!("{base}.{i}")))
                    .count();
                if count == 0 {
                    return Err(ExportError::mismatch(
                        base,
                        format!("expected at least one {kind:?} block, found none"),
                    ));
                }
                ops.push(Op::Scalar {
                    file: dir.join(leaf(count_name)),
                    value: count as f64,
                });
                for i in 0..count {
                    let child = dir.join(format!("{dir_prefix}{i}"));
                    ops.push(Op::CreateDir(child.clone()));
                    self.plan_block(kind, &format!("{base}.{i}"), &child, ops)?;
                }
                Ok(())
            }
            Part::Scalar { name, source } => {
                let value = self.scalar(key, source)?;
                ops.push(Op::Scalar {
                    file: dir.join(leaf(name)),
                    value,
                });
                Ok(())
            }
            // `units` splits every stage sequence into a header and its stages.
            Part::Stages { key: k, .. } => Err(ExportError::mismatch(
                join_key(key, k),
                "stage sequences are planned as separate units",
            )),
        }
    }

    fn plan_block(
        &self,
        kind: BlockKind,
        key: &str,
        dir: &Path,
        ops: &mut Vec<Op>,
    ) -> Result<(), ExportError> {
        if !key.is_empty() && !self.has_module(key) {
            return Err(ExportError::mismatch(
                key,
                format!("expected {kind:?} block, found no parameters"),
            ));
        }
        for part in kind.parts() {
            self.plan_part(part, key, dir, ops)?;
        }
        Ok(())
    }

    fn plan_stage_header(
        &self,
        key: &str,
        dir: &Path,
        side: Side,
        ops: &mut Vec<Op>,
    ) -> Result<(), ExportError> {
        let count = self.config.variant.stages(side).len();
        if self.has_module(&join_key(key, &count.to_string())) {
            return Err(ExportError::mismatch(
                key,
                format!(
                    "checkpoint has more than the {count} stages of the {} variant",
                    self.config.variant
                ),
            ));
        }
        ops.push(Op::CreateDir(dir.to_path_buf()));
        ops.push(Op::Scalar {
            file: dir.join(leaf("n_blocks")),
            value: count as f64,
        });
        Ok(())
    }

    fn plan_stage(
        &self,
        kind: BlockKind,
        key: &str,
        dir: &Path,
        ops: &mut Vec<Op>,
    ) -> Result<(), ExportError> {
        ops.push(Op::CreateDir(dir.to_path_buf()));
        self.plan_block(kind, key, dir, ops)?;
        if let Some(label) = kind.label() {
            ops.push(Op::Label {
                file: dir.join(LABEL_FILE),
                label,
            });
        }
        Ok(())
    }

    fn plan_param(
        &self,
        kind: ParamKind,
        key: &str,
        parent: &Path,
        dir_name: &str,
        presence: Presence,
        norm_eps: NormEps,
        ops: &mut Vec<Op>,
    ) -> Result<(), ExportError> {
        let expected = match presence {
            Presence::Required => kind.to_string(),
            Presence::OrIdentity => format!("{kind} or identity"),
        };
        let weight_key = join_key(key, "weight");
        let weight = match self.meta(&weight_key) {
            Some(meta) => meta,
            None if presence == Presence::OrIdentity && !self.has_module(key) => {
                tracing::trace!("{key}: absent, treated as identity");
                return Ok(());
            }
            None => {
                return Err(ExportError::mismatch(
                    key,
                    format!("expected {expected}, but '{weight_key}' is missing"),
                ))
            }
        };

        let rank = weight.shape.rank();
        if rank != kind.weight_rank() {
            return Err(ExportError::mismatch(
                key,
                format!(
                    "expected {expected}, found {} (weight shape {})",
                    ParamKind::describe_rank(rank),
                    weight.shape
                ),
            ));
        }
        let out_features = weight.shape.dims()[0];

        let bias_key = join_key(key, "bias");
        let bias = self.meta(&bias_key);
        match &bias {
            None if kind.requires_bias() => {
                return Err(ExportError::mismatch(
                    key,
                    format!("{kind} without '{bias_key}'"),
                ))
            }
            Some(b) if b.shape.dims() != [out_features] => {
                return Err(ExportError::mismatch(
                    key,
                    format!(
                        "bias shape {} does not match weight shape {}",
                        b.shape, weight.shape
                    ),
                ))
            }
            _ => {}
        }

        let dir = child_dir(parent, dir_name);
        if !dir_name.is_empty() {
            ops.push(Op::CreateDir(dir.clone()));
        }
        ops.push(Op::Tensor {
            key: self.full(&weight_key),
            file: dir.join(leaf("weight")),
            transpose: kind == ParamKind::Linear,
        });
        if bias.is_some() {
            ops.push(Op::Tensor {
                key: self.full(&bias_key),
                file: dir.join(leaf("bias")),
                transpose: false,
            });
        }

        let eps = Op::Scalar {
            file: dir.join(leaf("eps")),
            value: match norm_eps {
                NormEps::Standard => self.config.norm_eps,
                NormEps::Transformer => self.config.transformer_norm_eps,
            },
        };
        match kind {
            ParamKind::GroupNorm => {
                ops.push(Op::Scalar {
                    file: dir.join(leaf("n_group")),
                    value: self.config.group_norm_groups as f64,
                });
                ops.push(Op::Scalar {
                    file: dir.join(leaf("n_channel")),
                    value: out_features as f64,
                });
                ops.push(eps);
            }
            ParamKind::LayerNorm => ops.push(eps),
            ParamKind::Linear | ParamKind::Conv2d => {}
        }
        Ok(())
    }

    fn scalar(&self, block_key: &str, source: ScalarSource) -> Result<f64, ExportError> {
        match source {
            ScalarSource::Dim { key, axis } => {
                let key = join_key(block_key, key);
                let meta = self.require(&key)?;
                meta.shape
                    .dim(axis)
                    .map(|d| d as f64)
                    .ok_or_else(|| {
                        ExportError::mismatch(
                            key,
                            format!("shape {} has no axis {axis}", meta.shape),
                        )
                    })
            }
            ScalarSource::Heads { key } => {
                let key = join_key(block_key, key);
                let meta = self.require(&key)?;
                let width = meta.shape.dim(0).unwrap_or(0);
                let head_dim = self.config.head_dim;
                if width == 0 || width % head_dim != 0 {
                    return Err(ExportError::mismatch(
                        key,
                        format!("width {width} is not a multiple of head_dim {head_dim}"),
                    ));
                }
                Ok((width / head_dim) as f64)
            }
        }
    }

    // ── Source access ──────────────────────────────────────────────

    fn full(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    fn meta(&self, key: &str) -> Option<TensorMeta> {
        self.source.tensor_meta(&self.full(key))
    }

    fn require(&self, key: &str) -> Result<TensorMeta, ExportError> {
        self.meta(key)
            .ok_or_else(|| ExportError::mismatch(key, "tensor is missing"))
    }

    /// Returns `true` if any tensor lives under the module at `key`.
    fn has_module(&self, key: &str) -> bool {
        self.source.has_prefix(&format!("{}{key}.", self.prefix))
    }
}

fn part_name(part: &Part) -> &'static str {
    match *part {
        Part::Param { dir, key, .. } | Part::Block { dir, key, .. } => {
            if dir.is_empty() {
                key
            } else {
                dir
            }
        }
        Part::Repeated { dir_prefix, .. } => dir_prefix,
        Part::Scalar { name, .. } => name,
        Part::Stages { dir, .. } => dir,
    }
}

fn child_dir(parent: &Path, name: &str) -> PathBuf {
    if name.is_empty() {
        parent.to_path_buf()
    } else {
        parent.join(name)
    }
}

fn leaf(name: &str) -> String {
    format!("{name}.npy")
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_ir::{synthetic_unet, InMemorySource, SyntheticConfig, UnetVariant};
    use tensor_core::{Shape, Tensor};

    fn config() -> ExportConfig {
        ExportConfig {
            head_dim: 2,
            ..Default::default()
        }
    }

    fn base_stub() -> InMemorySource {
        synthetic_unet(UnetVariant::Base, &SyntheticConfig::default())
    }

    fn plan_named(
        source: &InMemorySource,
        config: &ExportConfig,
        name: &str,
    ) -> Result<Vec<Op>, ExportError> {
        let planner = Planner::new(source, config).unwrap();
        let unit = planner
            .units()
            .into_iter()
            .find(|u| u.name() == name)
            .unwrap();
        planner.plan(&unit)
    }

    fn files(ops: &[Op]) -> Vec<String> {
        ops.iter()
            .filter(|op| !matches!(op, Op::CreateDir(_)))
            .map(|op| op.path().display().to_string())
            .collect()
    }

    #[test]
    fn test_unit_order() {
        let source = base_stub();
        let config = config();
        let planner = Planner::new(&source, &config).unwrap();
        let names: Vec<String> = planner.units().iter().map(|u| u.name().to_string()).collect();
        assert_eq!(names.len(), 5 + 1 + 9 + 1 + 1 + 9 + 2);
        assert_eq!(names[0], "model_channels");
        assert_eq!(names[5], "input_blocks");
        assert_eq!(names[6], "input_blocks/0");
        assert_eq!(names[15], "middle_block");
        assert_eq!(names[27], "conv_out");
    }

    #[test]
    fn test_conv_stage_is_inline() {
        let ops = plan_named(&base_stub(), &config(), "input_blocks/0").unwrap();
        assert_eq!(
            files(&ops),
            vec![
                "input_blocks/0/weight.npy",
                "input_blocks/0/bias.npy",
                "input_blocks/0/type.txt"
            ]
        );
        assert!(ops.contains(&Op::Label {
            file: PathBuf::from("input_blocks/0/type.txt"),
            label: "conv",
        }));
    }

    #[test]
    fn test_group_norm_leaves() {
        let ops = plan_named(&base_stub(), &config(), "norm_out").unwrap();
        assert_eq!(
            files(&ops),
            vec![
                "norm_out/weight.npy",
                "norm_out/bias.npy",
                "norm_out/n_group.npy",
                "norm_out/n_channel.npy",
                "norm_out/eps.npy"
            ]
        );
        assert!(ops.contains(&Op::Scalar {
            file: PathBuf::from("norm_out/n_channel.npy"),
            value: 4.0,
        }));
    }

    #[test]
    fn test_transformer_norm_uses_its_own_eps() {
        let ops = plan_named(&base_stub(), &config(), "middle_block").unwrap();
        let eps = |file: &str| {
            ops.iter().find_map(|op| match op {
                Op::Scalar { file: f, value } if f == Path::new(file) => Some(*value),
                _ => None,
            })
        };
        assert_eq!(eps("middle_block/transformer/norm/eps.npy"), Some(1e-6));
        assert_eq!(eps("middle_block/res1/norm_in/eps.npy"), Some(1e-5));
        assert_eq!(
            eps("middle_block/transformer/transformer_0/norm1/eps.npy"),
            Some(1e-5)
        );

        let tuned = ExportConfig {
            transformer_norm_eps: 1e-3,
            ..config()
        };
        let ops = plan_named(&base_stub(), &tuned, "middle_block").unwrap();
        assert!(ops.contains(&Op::Scalar {
            file: PathBuf::from("middle_block/transformer/norm/eps.npy"),
            value: 1e-3,
        }));
    }

    #[test]
    fn test_stage_sequence_is_never_a_root_unit() {
        let source = base_stub();
        let config = config();
        let planner = Planner::new(&source, &config).unwrap();
        assert!(planner
            .units()
            .iter()
            .all(|u| !matches!(u.target, Target::Root(Part::Stages { .. }))));

        let stages = *BlockKind::Unet
            .parts()
            .iter()
            .find(|p| matches!(p, Part::Stages { .. }))
            .unwrap();
        let unit = Unit {
            name: "input_blocks".into(),
            target: Target::Root(stages),
        };
        let err = planner.plan(&unit).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_linear_is_transposed() {
        let ops = plan_named(&base_stub(), &config(), "lin1_time_embed").unwrap();
        assert!(ops.contains(&Op::Tensor {
            key: "time_embed.0.weight".into(),
            file: PathBuf::from("lin1_time_embed/weight.npy"),
            transpose: true,
        }));
    }

    #[test]
    fn test_transformer_stage_layout() {
        let ops = plan_named(&base_stub(), &config(), "input_blocks/4").unwrap();
        let files = files(&ops);
        assert!(files.contains(&"input_blocks/4/res/norm_in/weight.npy".to_string()));
        assert!(files.contains(&"input_blocks/4/transformer/n_blocks.npy".to_string()));
        assert!(files.contains(
            &"input_blocks/4/transformer/transformer_1/mlp/geglu/proj/weight.npy".to_string()
        ));
        assert!(files.contains(&"input_blocks/4/transformer/transformer_0/attn2/n_head.npy".to_string()));
        assert!(!files.iter().any(|f| f.contains("skip_connection")));
        assert!(ops.contains(&Op::Scalar {
            file: PathBuf::from("input_blocks/4/transformer/transformer_0/attn1/n_head.npy"),
            value: 2.0,
        }));
    }

    #[test]
    fn test_model_channels() {
        let ops = plan_named(&base_stub(), &config(), "model_channels").unwrap();
        assert_eq!(
            ops,
            vec![Op::Scalar {
                file: PathBuf::from("model_channels.npy"),
                value: 4.0
            }]
        );
    }

    #[test]
    fn test_stage_header() {
        let ops = plan_named(&base_stub(), &config(), "output_blocks").unwrap();
        assert_eq!(
            ops,
            vec![
                Op::CreateDir(PathBuf::from("output_blocks")),
                Op::Scalar {
                    file: PathBuf::from("output_blocks/n_blocks.npy"),
                    value: 9.0
                }
            ]
        );
    }

    #[test]
    fn test_refiner_checkpoint_as_base_is_mismatch() {
        let source = synthetic_unet(UnetVariant::Refiner, &SyntheticConfig::default());
        let err = plan_named(&source, &config(), "input_blocks").unwrap_err();
        assert!(matches!(err, ExportError::StructuralMismatch { ref path, .. } if path == "input_blocks"));
    }

    #[test]
    fn test_linear_skip_connection_is_mismatch() {
        let mut source = base_stub();
        source.insert(
            "output_blocks.7.0.skip_connection.weight",
            Tensor::zeros(Shape::matrix(4, 4), tensor_core::DType::F32),
        );
        let err = plan_named(&source, &config(), "output_blocks/7").unwrap_err();
        match err {
            ExportError::StructuralMismatch { path, detail } => {
                assert_eq!(path, "output_blocks.7.0.skip_connection");
                assert!(detail.contains("conv2d or identity"), "{detail}");
                assert!(detail.contains("linear"), "{detail}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bias_free_linear() {
        let mut source = base_stub();
        source.remove("time_embed.2.bias");
        let ops = plan_named(&source, &config(), "lin2_time_embed").unwrap();
        assert_eq!(files(&ops), vec!["lin2_time_embed/weight.npy"]);
    }

    #[test]
    fn test_layer_norm_requires_bias() {
        let mut source = base_stub();
        source.remove("middle_block.1.transformer_blocks.0.norm2.bias");
        assert!(plan_named(&source, &config(), "middle_block").is_err());
    }

    #[test]
    fn test_heads_must_divide() {
        let config = ExportConfig {
            head_dim: 3,
            ..Default::default()
        };
        let err = plan_named(&base_stub(), &config, "middle_block").unwrap_err();
        assert!(err.to_string().contains("head_dim 3"), "{err}");
    }

    #[test]
    fn test_missing_transformer_blocks() {
        let mut source = base_stub();
        let doomed: Vec<String> = source
            .keys()
            .into_iter()
            .filter(|k| k.starts_with("input_blocks.5.1.transformer_blocks."))
            .map(str::to_string)
            .collect();
        for key in doomed {
            source.remove(&key);
        }
        let err = plan_named(&source, &config(), "input_blocks/5").unwrap_err();
        assert!(matches!(err, ExportError::StructuralMismatch { ref path, .. }
            if path == "input_blocks.5.1.transformer_blocks"));
    }

    #[test]
    fn test_non_geglu_feed_forward() {
        let mut source = base_stub();
        let weight = source
            .remove("middle_block.1.transformer_blocks.0.ff.net.0.proj.weight")
            .unwrap();
        source.remove("middle_block.1.transformer_blocks.0.ff.net.0.proj.bias");
        source.insert("middle_block.1.transformer_blocks.0.ff.net.0.weight", weight);
        let err = plan_named(&source, &config(), "middle_block").unwrap_err();
        assert!(matches!(err, ExportError::StructuralMismatch { ref path, .. }
            if path == "middle_block.1.transformer_blocks.0.ff.net.0.proj"));
    }

    #[test]
    fn test_prefix_detection() {
        let prefixed = synthetic_unet(
            UnetVariant::Base,
            &SyntheticConfig {
                key_prefix: "model.diffusion_model.".into(),
                ..Default::default()
            },
        );
        let config = config();
        let planner = Planner::new(&prefixed, &config).unwrap();
        assert_eq!(planner.prefix(), "model.diffusion_model.");

        let wrong = ExportConfig {
            key_prefix: Some("unet".into()),
            ..config
        };
        assert!(matches!(
            Planner::new(&prefixed, &wrong),
            Err(ExportError::UnetNotFound { .. })
        ));
    }

    #[test]
    fn test_plan_all_covers_every_key() {
        let source = base_stub();
        let config = config();
        let plan = Planner::new(&source, &config).unwrap().plan_all();
        assert_eq!(plan.mismatches(), 0);
        assert!(plan.unvisited_keys.is_empty(), "{:?}", plan.unvisited_keys);
        assert!(plan.op_count() > 0);
    }

    #[test]
    fn test_unvisited_keys_reported() {
        let mut source = base_stub();
        source.insert(
            "input_blocks.1.0.extra.weight",
            Tensor::zeros(Shape::vector(4), tensor_core::DType::F32),
        );
        let config = config();
        let plan = Planner::new(&source, &config).unwrap().plan_all();
        assert_eq!(plan.unvisited_keys, vec!["input_blocks.1.0.extra.weight".to_string()]);
    }
}
