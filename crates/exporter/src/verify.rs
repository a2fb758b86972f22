// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Read-back verification of an export tree.
//!
//! [`verify`] re-plans the export for a checkpoint and checks every planned
//! file against the tree on disk. It only reports; a partial or stale tree
//! is never repaired or removed.

use crate::leaf::read_leaf;
use crate::plan::{Op, Planner};
use crate::{ExportConfig, ExportError, LeafEncoding};
use model_ir::schema::{BlockKind, Part, STAGE_LABELS};
use model_ir::ModelSource;
use std::path::{Path, PathBuf};

/// One discrepancy between the checkpoint and the export tree.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct VerifyProblem {
    /// Path relative to the export root, or the unit name.
    pub path: PathBuf,
    pub detail: String,
}

/// Outcome of [`verify`].
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct VerifyReport {
    /// Directories and files checked.
    pub checked: usize,
    /// Largest absolute difference seen between a tensor leaf and the checkpoint.
    pub max_abs_error: f32,
    pub problems: Vec<VerifyProblem>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Verify: {} entries checked, max abs error {:.3e}, {} problems",
            self.checked,
            self.max_abs_error,
            self.problems.len()
        )
    }

    fn problem(&mut self, path: impl Into<PathBuf>, detail: impl Into<String>) {
        let problem = VerifyProblem {
            path: path.into(),
            detail: detail.into(),
        };
        tracing::warn!("{}: {}", problem.path.display(), problem.detail);
        self.problems.push(problem);
    }
}

/// Checks the export tree at `export_dir` against `source`.
///
/// # Errors
/// Fails only when the checkpoint itself cannot be read; every problem with
/// the tree is collected in the report.
pub fn verify(
    source: &dyn ModelSource,
    export_dir: &Path,
    config: &ExportConfig,
) -> Result<VerifyReport, ExportError> {
    let planner = Planner::new(source, config)?;
    let mut report = VerifyReport::default();

    for unit in planner.units() {
        let ops = match planner.plan(&unit) {
            Ok(ops) => ops,
            Err(e) => {
                report.problem(unit.name(), format!("cannot be planned: {e}"));
                continue;
            }
        };
        for op in &ops {
            check(source, export_dir, config, op, &mut report)?;
        }
    }

    for part in BlockKind::Unet.parts() {
        if let Part::Stages { dir, side, .. } = *part {
            let count = config.variant.stages(side).len();
            check_no_extra_stages(&export_dir.join(dir), Path::new(dir), count, &mut report);
        }
    }

    tracing::info!("{}", report.summary());
    Ok(report)
}

fn check(
    source: &dyn ModelSource,
    root: &Path,
    config: &ExportConfig,
    op: &Op,
    report: &mut VerifyReport,
) -> Result<(), ExportError> {
    report.checked += 1;
    let rel = op.path();
    let path = root.join(rel);
    match op {
        Op::CreateDir(_) => {
            if !path.is_dir() {
                report.problem(rel, "missing directory");
            }
        }
        Op::Label { label, .. } => match std::fs::read_to_string(&path) {
            Ok(text) if text == *label => {}
            Ok(text) if !STAGE_LABELS.contains(&text.as_str()) => {
                report.problem(rel, format!("unknown stage label '{text}'"));
            }
            Ok(text) => report.problem(rel, format!("label '{text}', expected '{label}'")),
            Err(e) => report.problem(rel, format!("unreadable label: {e}")),
        },
        Op::Scalar { value, .. } => {
            let rank = match config.encoding {
                LeafEncoding::ShapePrefixed => 1,
                LeafEncoding::Native => 0,
            };
            match read_leaf(&path, config.encoding, rank) {
                Ok(leaf) if leaf.values == [*value as f32] => {}
                Ok(leaf) => report.problem(rel, format!("scalar {:?}, expected {value}", leaf.values)),
                Err(e) => report.problem(rel, e.to_string()),
            }
        }
        Op::Tensor { key, transpose, .. } => {
            let mut expected = source.load(key)?;
            if *transpose {
                expected = expected.transpose_2d()?;
            }
            let leaf = match read_leaf(&path, config.encoding, expected.shape().rank()) {
                Ok(leaf) => leaf,
                Err(e) => {
                    report.problem(rel, e.to_string());
                    return Ok(());
                }
            };
            if leaf.shape != expected.shape().dims() {
                report.problem(
                    rel,
                    format!("shape {:?}, expected {}", leaf.shape, expected.shape()),
                );
                return Ok(());
            }
            let error = leaf
                .values
                .iter()
                .zip(expected.to_f32_vec())
                .map(|(&a, b)| value_error(a, b))
                .fold(0.0f32, f32::max);
            report.max_abs_error = report.max_abs_error.max(error);
            if error > config.tolerance {
                report.problem(
                    rel,
                    format!("values differ from '{key}' by up to {error:e}"),
                );
            }
        }
    }
    Ok(())
}

/// Absolute difference between a written and an expected value. Values that
/// are not bit-identical and do not compare as numbers count as infinitely far.
fn value_error(written: f32, expected: f32) -> f32 {
    if written.to_bits() == expected.to_bits() {
        return 0.0;
    }
    let d = (written - expected).abs();
    if d.is_nan() {
        f32::INFINITY
    } else {
        d
    }
}

/// Reports numbered stage directories beyond the variant's stage count.
fn check_no_extra_stages(dir: &Path, rel: &Path, count: usize, report: &mut VerifyReport) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut extra: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.parse::<usize>().map_or(true, |i| i >= count))
        .collect();
    extra.sort();
    for name in extra {
        report.problem(
            rel.join(&name),
            format!("unexpected entry; the variant has {count} stages"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Exporter;
    use model_ir::{synthetic_unet, SyntheticConfig, UnetVariant};
    use ndarray::{ArrayD, IxDyn};
    use ndarray_npy::{ReadNpyExt, WriteNpyExt};
    use std::fs::File;

    fn config() -> ExportConfig {
        ExportConfig {
            head_dim: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_fresh_export_verifies() {
        let stub = synthetic_unet(UnetVariant::Base, &SyntheticConfig::default());
        let out = tempfile::tempdir().unwrap();
        Exporter::new(config()).unwrap().export(&stub, out.path()).unwrap();
        let report = verify(&stub, out.path(), &config()).unwrap();
        assert!(report.is_ok(), "{:?}", report.problems);
        assert_eq!(report.max_abs_error, 0.0);
        assert!(report.checked > 100);
    }

    #[test]
    fn test_empty_dir_reports_everything_missing() {
        let stub = synthetic_unet(UnetVariant::Base, &SyntheticConfig::default());
        let out = tempfile::tempdir().unwrap();
        let report = verify(&stub, out.path(), &config()).unwrap();
        assert!(!report.is_ok());
        assert_eq!(report.problems.len(), report.checked);
    }

    #[test]
    fn test_tampered_label_and_extra_stage() {
        let stub = synthetic_unet(UnetVariant::Base, &SyntheticConfig::default());
        let out = tempfile::tempdir().unwrap();
        Exporter::new(config()).unwrap().export(&stub, out.path()).unwrap();
        std::fs::write(out.path().join("input_blocks/3/type.txt"), "resnet").unwrap();
        std::fs::create_dir(out.path().join("output_blocks/9")).unwrap();

        let report = verify(&stub, out.path(), &config()).unwrap();
        let paths: Vec<PathBuf> = report.problems.iter().map(|p| p.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("input_blocks/3/type.txt"),
                PathBuf::from("output_blocks/9")
            ]
        );
        assert!(report.problems[0].detail.contains("expected 'downsample'"));
    }

    /// Rewrites the raw array of a shape-prefixed leaf in place.
    fn tamper(path: &Path, edit: impl FnOnce(&mut Vec<f32>)) {
        let array = ArrayD::<f32>::read_npy(File::open(path).unwrap()).unwrap();
        let mut flat: Vec<f32> = array.iter().copied().collect();
        edit(&mut flat);
        let len = flat.len();
        let array = ArrayD::from_shape_vec(IxDyn(&[len]), flat).unwrap();
        array.write_npy(File::create(path).unwrap()).unwrap();
    }

    fn exported() -> (model_ir::InMemorySource, tempfile::TempDir) {
        let stub = synthetic_unet(UnetVariant::Base, &SyntheticConfig::default());
        let out = tempfile::tempdir().unwrap();
        Exporter::new(config()).unwrap().export(&stub, out.path()).unwrap();
        (stub, out)
    }

    #[test]
    fn test_value_error() {
        assert_eq!(value_error(1.5, 1.5), 0.0);
        assert_eq!(value_error(1.0, 1.25), 0.25);
        assert_eq!(value_error(f32::NAN, 1.0), f32::INFINITY);
        assert_eq!(value_error(f32::INFINITY, f32::INFINITY), 0.0);
        assert_eq!(value_error(f32::INFINITY, f32::NEG_INFINITY), f32::INFINITY);
    }

    #[test]
    fn test_perturbed_value_reported() {
        let (stub, out) = exported();
        // `conv_out/weight.npy` starts with its 4 dims.
        tamper(&out.path().join("conv_out/weight.npy"), |v| v[4 + 7] += 0.01);

        let report = verify(&stub, out.path(), &config()).unwrap();
        assert_eq!(report.problems.len(), 1, "{:?}", report.problems);
        assert_eq!(report.problems[0].path, PathBuf::from("conv_out/weight.npy"));
        assert!(report.max_abs_error > 0.009);
    }

    #[test]
    fn test_perturbation_within_tolerance_passes() {
        let (stub, out) = exported();
        tamper(&out.path().join("conv_out/bias.npy"), |v| v[1] += 1e-4);
        let loose = ExportConfig {
            tolerance: 1e-3,
            ..config()
        };
        let report = verify(&stub, out.path(), &loose).unwrap();
        assert!(report.is_ok(), "{:?}", report.problems);
        assert!(report.max_abs_error > 0.0);
    }

    #[test]
    fn test_nan_values_reported() {
        let (stub, out) = exported();
        tamper(&out.path().join("conv_out/weight.npy"), |v| {
            for x in &mut v[4..] {
                *x = f32::NAN;
            }
        });

        let report = verify(&stub, out.path(), &config()).unwrap();
        assert!(!report.is_ok());
        assert_eq!(report.problems[0].path, PathBuf::from("conv_out/weight.npy"));
        assert_eq!(report.max_abs_error, f32::INFINITY);
    }

    #[test]
    fn test_nan_scalar_reported() {
        let (stub, out) = exported();
        tamper(&out.path().join("norm_out/eps.npy"), |v| v[1] = f32::NAN);
        let report = verify(&stub, out.path(), &config()).unwrap();
        assert_eq!(report.problems.len(), 1);
        assert_eq!(report.problems[0].path, PathBuf::from("norm_out/eps.npy"));
    }

    #[test]
    fn test_wrong_shape_header_reported() {
        let (stub, out) = exported();
        // [4, 4, 3, 3] becomes [4, 4, 9, 1]: same element count, wrong shape.
        tamper(&out.path().join("conv_out/weight.npy"), |v| {
            v[2] = 9.0;
            v[3] = 1.0;
        });

        let report = verify(&stub, out.path(), &config()).unwrap();
        assert_eq!(report.problems.len(), 1);
        assert!(report.problems[0].detail.starts_with("shape [4, 4, 9, 1]"));
    }
}
