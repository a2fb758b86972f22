// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Leaf file encoding.
//!
//! Every leaf is a little-endian `f32` `.npy` file. With
//! [`LeafEncoding::ShapePrefixed`] the array is 1-D and starts with the
//! tensor's dims, so a `[320, 4, 3, 3]` kernel becomes
//! `[320, 4, 3, 3, w0, w1, ...]` and the scalar `32` becomes `[1, 32]`.

use crate::{ExportError, LeafEncoding};
use ndarray::{ArrayD, IxDyn};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tensor_core::Tensor;

/// A decoded leaf file.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    /// Logical shape of the stored value; `[1]` or `[]` for scalars.
    pub shape: Vec<usize>,
    /// Row-major values.
    pub values: Vec<f32>,
}

/// Writes leaves and labels beneath an export root.
#[derive(Debug, Clone)]
pub struct LeafWriter {
    root: PathBuf,
    encoding: LeafEncoding,
}

impl LeafWriter {
    pub fn new(root: impl Into<PathBuf>, encoding: LeafEncoding) -> Self {
        Self {
            root: root.into(),
            encoding,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates `rel` and its parents; existing directories are fine.
    pub fn create_dir(&self, rel: &Path) -> Result<(), ExportError> {
        let path = self.root.join(rel);
        std::fs::create_dir_all(&path).map_err(ExportError::io(path))
    }

    /// Writes a tensor as `f32`, returning the file size in bytes.
    pub fn write_tensor(&self, rel: &Path, tensor: &Tensor) -> Result<u64, ExportError> {
        let path = self.root.join(rel);
        let array = encode(tensor.shape().dims(), tensor.to_f32_vec(), self.encoding)
            .map_err(|detail| ExportError::Npy {
                path: path.clone(),
                detail,
            })?;
        write_array(&path, &array)
    }

    /// Writes a scalar hyperparameter, returning the file size in bytes.
    pub fn write_scalar(&self, rel: &Path, value: f64) -> Result<u64, ExportError> {
        let path = self.root.join(rel);
        let array = match self.encoding {
            LeafEncoding::ShapePrefixed => {
                ArrayD::from_shape_vec(IxDyn(&[2]), vec![1.0, value as f32])
            }
            LeafEncoding::Native => ArrayD::from_shape_vec(IxDyn(&[]), vec![value as f32]),
        }
        .map_err(|e| ExportError::Npy {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        write_array(&path, &array)
    }

    /// Writes a stage label as plain text without a trailing newline.
    pub fn write_label(&self, rel: &Path, label: &str) -> Result<u64, ExportError> {
        let path = self.root.join(rel);
        std::fs::write(&path, label).map_err(ExportError::io(path))?;
        Ok(label.len() as u64)
    }
}

fn encode(
    dims: &[usize],
    values: Vec<f32>,
    encoding: LeafEncoding,
) -> Result<ArrayD<f32>, String> {
    match encoding {
        LeafEncoding::ShapePrefixed => {
            let mut flat: Vec<f32> = Vec::with_capacity(dims.len() + values.len());
            flat.extend(dims.iter().map(|&d| d as f32));
            flat.extend(values);
            let len = flat.len();
            ArrayD::from_shape_vec(IxDyn(&[len]), flat).map_err(|e| e.to_string())
        }
        LeafEncoding::Native => {
            ArrayD::from_shape_vec(IxDyn(dims), values).map_err(|e| e.to_string())
        }
    }
}

fn write_array(path: &Path, array: &ArrayD<f32>) -> Result<u64, ExportError> {
    let file = File::create(path).map_err(ExportError::io(path))?;
    let mut writer = BufWriter::new(file);
    array.write_npy(&mut writer).map_err(|e| ExportError::Npy {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    writer.flush().map_err(ExportError::io(path))?;
    let written = std::fs::metadata(path).map_err(ExportError::io(path))?.len();
    tracing::trace!("wrote {} ({written} bytes)", path.display());
    Ok(written)
}

/// Reads a leaf file written with `encoding`.
///
/// `rank` is the rank of the stored value and is needed to split the dims
/// from the values of a shape-prefixed leaf; scalars have rank 1 there.
pub fn read_leaf(path: &Path, encoding: LeafEncoding, rank: usize) -> Result<Leaf, ExportError> {
    let file = File::open(path).map_err(ExportError::io(path))?;
    let array = ArrayD::<f32>::read_npy(BufReader::new(file)).map_err(|e| ExportError::Npy {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let bad = |detail: String| ExportError::Npy {
        path: path.to_path_buf(),
        detail,
    };

    match encoding {
        LeafEncoding::Native => Ok(Leaf {
            shape: array.shape().to_vec(),
            values: array.iter().copied().collect(),
        }),
        LeafEncoding::ShapePrefixed => {
            if array.ndim() != 1 {
                return Err(bad(format!(
                    "shape-prefixed leaf must be 1-D, found shape {:?}",
                    array.shape()
                )));
            }
            let flat: Vec<f32> = array.iter().copied().collect();
            if flat.len() < rank {
                return Err(bad(format!(
                    "{} values cannot hold a rank-{rank} shape",
                    flat.len()
                )));
            }
            let (head, values) = flat.split_at(rank);
            let shape: Vec<usize> = head.iter().map(|&d| d as usize).collect();
            let expected: usize = shape.iter().product();
            if values.len() != expected {
                return Err(bad(format!(
                    "header {shape:?} promises {expected} values, found {}",
                    values.len()
                )));
            }
            Ok(Leaf {
                shape,
                values: values.to_vec(),
            })
        }
    }
}
