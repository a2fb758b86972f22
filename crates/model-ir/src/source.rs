// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Read-only model sources.
//!
//! A [`ModelSource`] is the model graph as the exporter sees it: a flat,
//! ordered map from dotted parameter paths to tensors. Whether a submodule
//! exists, and what kind of module it is, is answered from key prefixes and
//! tensor ranks; no source is ever mutated by the exporter.
//!
//! Two implementations are provided:
//! - [`SafeTensorsSource`]: a memory-mapped `.safetensors` checkpoint. Only
//!   the header is parsed up front; tensor bytes are copied out on demand.
//! - [`InMemorySource`]: an owned map of tensors, used for stub models and
//!   tests.

use crate::ModelError;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use tensor_core::{DType, Shape, Tensor};

/// Shape and element type of a tensor, without its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorMeta {
    /// Shape of the tensor.
    pub shape: Shape,
    /// Element type as stored in the source.
    pub dtype: DType,
}

impl TensorMeta {
    /// Size of the stored tensor in bytes.
    pub fn size_bytes(&self) -> usize {
        self.shape.size_bytes(self.dtype)
    }
}

/// A read-only view of a model's parameters.
pub trait ModelSource {
    /// Human-readable name for log messages.
    fn name(&self) -> &str;

    /// Every tensor key, in ascending order.
    fn keys(&self) -> Vec<&str>;

    /// Shape and dtype of the tensor at `key`, if present.
    fn tensor_meta(&self, key: &str) -> Option<TensorMeta>;

    /// Returns `true` if any tensor key starts with `prefix`.
    fn has_prefix(&self, prefix: &str) -> bool;

    /// Loads the tensor at `key`.
    fn load(&self, key: &str) -> Result<Tensor, ModelError>;
}

/// Returns `true` if an ordered key map holds a key starting with `prefix`.
fn map_has_prefix<V>(map: &BTreeMap<String, V>, prefix: &str) -> bool {
    map.range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
        .next()
        .is_some_and(|(k, _)| k.starts_with(prefix))
}

// ── SafeTensors ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Entry {
    meta: TensorMeta,
    offset: usize,
    len: usize,
}

/// A checkpoint stored in HuggingFace SafeTensors format.
///
/// # Example
/// ```no_run
/// use model_ir::{ModelSource, SafeTensorsSource};
/// use std::path::Path;
///
/// let source = SafeTensorsSource::open(Path::new("./sd_xl_base_1.0.safetensors")).unwrap();
/// println!("{} tensors", source.keys().len());
/// ```
pub struct SafeTensorsSource {
    path: PathBuf,
    name: String,
    mmap: memmap2::Mmap,
    index: BTreeMap<String, Entry>,
}

impl SafeTensorsSource {
    /// Memory-maps `path` and indexes its SafeTensors header.
    pub fn open(path: &Path) -> Result<Self, ModelError> {
        let file = std::fs::File::open(path).map_err(|source| ModelError::Open {
            path: path.display().to_string(),
            source,
        })?;

        // SAFETY: the mapping is read-only and the exporter never writes to
        // the checkpoint while it is mapped.
        let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(|source| ModelError::Open {
            path: path.display().to_string(),
            source,
        })?;

        let index = Self::build_index(&mmap)?;

        tracing::info!(
            "checkpoint: mmap'd {} ({:.2} MB, {} tensors)",
            path.display(),
            mmap.len() as f64 / (1024.0 * 1024.0),
            index.len(),
        );

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            path: path.to_path_buf(),
            name,
            mmap,
            index,
        })
    }

    /// Returns the checkpoint path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses the header once and records where each tensor's bytes live.
    fn build_index(mmap: &memmap2::Mmap) -> Result<BTreeMap<String, Entry>, ModelError> {
        let tensors = safetensors::SafeTensors::deserialize(mmap).map_err(|e| {
            ModelError::SafeTensorsError(format!("SafeTensors parse error: {e}"))
        })?;

        let base = mmap.as_ptr() as usize;
        let mut index = BTreeMap::new();
        for (name, view) in tensors.tensors() {
            let dtype = convert_safetensor_dtype(&name, view.dtype())?;
            let data = view.data();
            index.insert(
                name,
                Entry {
                    meta: TensorMeta {
                        shape: Shape::new(view.shape().to_vec()),
                        dtype,
                    },
                    offset: data.as_ptr() as usize - base,
                    len: data.len(),
                },
            );
        }
        Ok(index)
    }
}

impl ModelSource for SafeTensorsSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn keys(&self) -> Vec<&str> {
        self.index.keys().map(String::as_str).collect()
    }

    fn tensor_meta(&self, key: &str) -> Option<TensorMeta> {
        self.index.get(key).map(|e| e.meta.clone())
    }

    fn has_prefix(&self, prefix: &str) -> bool {
        map_has_prefix(&self.index, prefix)
    }

    fn load(&self, key: &str) -> Result<Tensor, ModelError> {
        let entry = self.index.get(key).ok_or_else(|| ModelError::TensorNotFound {
            name: key.to_string(),
        })?;
        let bytes = self.mmap[entry.offset..entry.offset + entry.len].to_vec();
        Tensor::from_bytes(entry.meta.shape.clone(), entry.meta.dtype, bytes).map_err(|source| {
            ModelError::Tensor {
                name: key.to_string(),
                source,
            }
        })
    }
}

impl std::fmt::Debug for SafeTensorsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeTensorsSource")
            .field("path", &self.path)
            .field("tensors", &self.index.len())
            .finish()
    }
}

/// Converts a SafeTensors `Dtype` to our [`DType`].
fn convert_safetensor_dtype(name: &str, st_dtype: safetensors::Dtype) -> Result<DType, ModelError> {
    match st_dtype {
        safetensors::Dtype::F32 => Ok(DType::F32),
        safetensors::Dtype::F16 => Ok(DType::F16),
        safetensors::Dtype::BF16 => Ok(DType::BF16),
        safetensors::Dtype::F64 => Ok(DType::F64),
        other => Err(ModelError::UnsupportedDType {
            name: name.to_string(),
            dtype: format!("{other:?}"),
        }),
    }
}

// ── In-memory ──────────────────────────────────────────────────────

/// An owned, ordered collection of named tensors.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    name: String,
    tensors: BTreeMap<String, Tensor>,
}

impl InMemorySource {
    /// Creates an empty source.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tensors: BTreeMap::new(),
        }
    }

    /// Adds or replaces a tensor.
    pub fn insert(&mut self, key: impl Into<String>, tensor: Tensor) {
        self.tensors.insert(key.into(), tensor);
    }

    /// Removes a tensor, returning it if it was present.
    pub fn remove(&mut self, key: &str) -> Option<Tensor> {
        self.tensors.remove(key)
    }

    /// Number of tensors held.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Returns `true` if the source holds no tensors.
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Serialises every tensor into a SafeTensors file at `path`.
    ///
    /// Used to turn stub models into real checkpoints for end-to-end runs.
    pub fn save_safetensors(&self, path: &Path) -> Result<(), ModelError> {
        let views = self
            .tensors
            .iter()
            .map(|(name, t)| {
                let dtype = match t.dtype() {
                    DType::F32 => safetensors::Dtype::F32,
                    DType::F16 => safetensors::Dtype::F16,
                    DType::BF16 => safetensors::Dtype::BF16,
                    DType::F64 => safetensors::Dtype::F64,
                };
                let view = safetensors::tensor::TensorView::new(
                    dtype,
                    t.shape().dims().to_vec(),
                    t.as_bytes(),
                )
                .map_err(|e| ModelError::SafeTensorsError(format!("tensor '{name}': {e}")))?;
                Ok((name.clone(), view))
            })
            .collect::<Result<Vec<_>, ModelError>>()?;

        safetensors::tensor::serialize_to_file(views, &None, path)
            .map_err(|e| ModelError::SafeTensorsError(format!("serialise failed: {e}")))
    }
}

impl FromIterator<(String, Tensor)> for InMemorySource {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self {
            name: "<in-memory>".to_string(),
            tensors: iter.into_iter().collect(),
        }
    }
}

impl ModelSource for InMemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn keys(&self) -> Vec<&str> {
        self.tensors.keys().map(String::as_str).collect()
    }

    fn tensor_meta(&self, key: &str) -> Option<TensorMeta> {
        self.tensors.get(key).map(|t| TensorMeta {
            shape: t.shape().clone(),
            dtype: t.dtype(),
        })
    }

    fn has_prefix(&self, prefix: &str) -> bool {
        map_has_prefix(&self.tensors, prefix)
    }

    fn load(&self, key: &str) -> Result<Tensor, ModelError> {
        self.tensors
            .get(key)
            .cloned()
            .ok_or_else(|| ModelError::TensorNotFound {
                name: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InMemorySource {
        let mut s = InMemorySource::new("sample");
        s.insert(
            "out.0.weight",
            Tensor::from_f32(Shape::vector(2), &[1.0, 2.0]).unwrap(),
        );
        s.insert(
            "out.0.bias",
            Tensor::from_f32(Shape::vector(2), &[0.5, 0.25]).unwrap(),
        );
        s.insert(
            "out.2.weight",
            Tensor::zeros(Shape::new(vec![2, 2, 3, 3]), DType::F32),
        );
        s
    }

    #[test]
    fn test_in_memory_meta_and_load() {
        let s = sample();
        assert_eq!(s.len(), 3);
        let meta = s.tensor_meta("out.2.weight").unwrap();
        assert_eq!(meta.shape, Shape::new(vec![2, 2, 3, 3]));
        assert_eq!(meta.size_bytes(), 2 * 2 * 3 * 3 * 4);
        assert_eq!(s.load("out.0.bias").unwrap().to_f32_vec(), vec![0.5, 0.25]);
        assert!(matches!(
            s.load("missing"),
            Err(ModelError::TensorNotFound { .. })
        ));
    }

    #[test]
    fn test_has_prefix() {
        let s = sample();
        assert!(s.has_prefix("out.0."));
        assert!(s.has_prefix("out.2"));
        assert!(!s.has_prefix("out.1."));
        assert!(!s.has_prefix("time_embed"));
        assert!(!s.has_prefix("zzz"));
    }

    #[test]
    fn test_keys_sorted() {
        let s = sample();
        assert_eq!(s.keys(), vec!["out.0.bias", "out.0.weight", "out.2.weight"]);
    }

    #[test]
    fn test_safetensors_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        let s = sample();
        s.save_safetensors(&path).unwrap();

        let st = SafeTensorsSource::open(&path).unwrap();
        assert_eq!(st.name(), "model.safetensors");
        assert_eq!(st.keys(), s.keys());
        assert!(st.has_prefix("out.0."));
        assert_eq!(
            st.load("out.0.weight").unwrap().to_f32_vec(),
            vec![1.0, 2.0]
        );
        assert_eq!(
            st.tensor_meta("out.2.weight").unwrap().shape,
            Shape::new(vec![2, 2, 3, 3])
        );
    }

    #[test]
    fn test_safetensors_half_precision() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("half.safetensors");
        let bytes: Vec<u8> = [0.5f32, -1.0]
            .iter()
            .flat_map(|v| half::f16::from_f32(*v).to_le_bytes())
            .collect();
        let mut s = InMemorySource::new("half");
        s.insert(
            "w",
            Tensor::from_bytes(Shape::vector(2), DType::F16, bytes).unwrap(),
        );
        s.save_safetensors(&path).unwrap();

        let st = SafeTensorsSource::open(&path).unwrap();
        assert_eq!(st.tensor_meta("w").unwrap().dtype, DType::F16);
        assert_eq!(st.load("w").unwrap().to_f32_vec(), vec![0.5, -1.0]);
    }

    #[test]
    fn test_open_missing_file() {
        let result = SafeTensorsSource::open(Path::new("/nonexistent/model.safetensors"));
        assert!(matches!(result, Err(ModelError::Open { .. })));
    }

    #[test]
    fn test_open_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.safetensors");
        std::fs::write(&path, b"not a checkpoint").unwrap();
        assert!(matches!(
            SafeTensorsSource::open(&path),
            Err(ModelError::SafeTensorsError(_))
        ));
    }
}
