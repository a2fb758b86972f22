// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Core tensor type.

use crate::{DType, Shape, TensorError};
use half::{bf16, f16};

/// An owned, n-dimensional tensor stored in contiguous memory.
///
/// `Tensor` carries one checkpoint parameter from the model source to the
/// leaf writer.
///
/// # Memory Layout
/// Data is stored in row-major (C) order as a flat little-endian byte
/// buffer, exactly as SafeTensors lays it out. Element access goes through
/// [`to_f32_vec`](Tensor::to_f32_vec), which decodes and widens in one pass,
/// so the buffer never needs to be aligned for its element type.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    dtype: DType,
    data: Vec<u8>,
}

impl Tensor {
    /// Creates a new tensor filled with zeros.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape, DType};
    /// let t = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
    /// assert_eq!(t.size_bytes(), 24); // 2 * 3 * 4 bytes
    /// ```
    pub fn zeros(shape: Shape, dtype: DType) -> Self {
        let size = shape.size_bytes(dtype);
        Self {
            shape,
            dtype,
            data: vec![0u8; size],
        }
    }

    /// Creates a tensor from raw little-endian bytes.
    ///
    /// Returns an error if the buffer size does not match `shape.size_bytes(dtype)`.
    pub fn from_bytes(shape: Shape, dtype: DType, data: Vec<u8>) -> Result<Self, TensorError> {
        let expected = shape.size_bytes(dtype);
        if data.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, dtype, data })
    }

    /// Creates a tensor from a slice of `f32` values.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape};
    /// let t = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(t.to_f32_vec(), vec![1.0, 2.0, 3.0]);
    /// ```
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        let expected_elements = shape.num_elements();
        if values.len() != expected_elements {
            return Err(TensorError::BufferSizeMismatch {
                expected: expected_elements * DType::F32.size_bytes(),
                actual: values.len() * DType::F32.size_bytes(),
            });
        }
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Ok(Self {
            shape,
            dtype: DType::F32,
            data,
        })
    }

    /// Returns the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the raw byte slice backing this tensor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the memory footprint of this tensor in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Decodes every element as `f32` in row-major order.
    ///
    /// Half-precision values widen exactly; `f64` values are rounded to the
    /// nearest `f32`.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self.dtype {
            DType::F32 => self
                .data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            DType::F16 => self
                .data
                .chunks_exact(2)
                .map(|b| f16::from_le_bytes([b[0], b[1]]).to_f32())
                .collect(),
            DType::BF16 => self
                .data
                .chunks_exact(2)
                .map(|b| bf16::from_le_bytes([b[0], b[1]]).to_f32())
                .collect(),
            DType::F64 => self
                .data
                .chunks_exact(8)
                .map(|b| {
                    f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32
                })
                .collect(),
        }
    }

    /// Returns the transpose of a 2-D tensor, keeping its data type.
    ///
    /// # Errors
    /// Returns [`TensorError::RankMismatch`] if the tensor is not a matrix.
    pub fn transpose_2d(&self) -> Result<Tensor, TensorError> {
        let (rows, cols) = match self.shape.dims() {
            [r, c] => (*r, *c),
            _ => {
                return Err(TensorError::RankMismatch {
                    op: "transpose_2d",
                    expected: 2,
                    shape: self.shape.clone(),
                })
            }
        };

        let elem = self.dtype.size_bytes();
        let mut data = vec![0u8; self.data.len()];
        for r in 0..rows {
            for c in 0..cols {
                let src = (r * cols + c) * elem;
                let dst = (c * rows + r) * elem;
                data[dst..dst + elem].copy_from_slice(&self.data[src..src + elem]);
            }
        }

        Ok(Tensor {
            shape: Shape::matrix(cols, rows),
            dtype: self.dtype,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let t = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
        assert_eq!(t.size_bytes(), 24);
        assert_eq!(t.shape(), &Shape::matrix(2, 3));
        assert_eq!(t.dtype(), DType::F32);
        assert!(t.to_f32_vec().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_from_f32() {
        let data = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let t = Tensor::from_f32(Shape::matrix(2, 3), &data).unwrap();
        assert_eq!(t.to_f32_vec(), data);
    }

    #[test]
    fn test_from_bytes_size_mismatch() {
        let result = Tensor::from_bytes(Shape::matrix(2, 3), DType::F32, vec![0u8; 10]);
        assert!(result.is_err());
    }

    #[test]
    fn test_f16_widening() {
        let values = [f16::from_f32(0.5), f16::from_f32(-2.0)];
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let t = Tensor::from_bytes(Shape::vector(2), DType::F16, bytes).unwrap();
        assert_eq!(t.to_f32_vec(), vec![0.5, -2.0]);
    }

    #[test]
    fn test_bf16_widening() {
        let bytes: Vec<u8> = bf16::from_f32(1.5).to_le_bytes().to_vec();
        let t = Tensor::from_bytes(Shape::scalar(), DType::BF16, bytes).unwrap();
        assert_eq!(t.to_f32_vec(), vec![1.5]);
    }

    #[test]
    fn test_f64_narrowing() {
        let bytes: Vec<u8> = 0.25f64.to_le_bytes().to_vec();
        let t = Tensor::from_bytes(Shape::vector(1), DType::F64, bytes).unwrap();
        assert_eq!(t.to_f32_vec(), vec![0.25]);
    }

    #[test]
    fn test_transpose() {
        let t = Tensor::from_f32(Shape::matrix(2, 3), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let tt = t.transpose_2d().unwrap();
        assert_eq!(tt.shape(), &Shape::matrix(3, 2));
        assert_eq!(tt.to_f32_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_transpose_half_keeps_dtype() {
        let values = [1.0f32, 2.0, 3.0, 4.0].map(f16::from_f32);
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let t = Tensor::from_bytes(Shape::matrix(2, 2), DType::F16, bytes).unwrap();
        let tt = t.transpose_2d().unwrap();
        assert_eq!(tt.dtype(), DType::F16);
        assert_eq!(tt.to_f32_vec(), vec![1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_transpose_rejects_non_matrix() {
        let t = Tensor::zeros(Shape::new(vec![2, 2, 2]), DType::F32);
        assert!(matches!(
            t.transpose_2d(),
            Err(TensorError::RankMismatch { expected: 2, .. })
        ));
    }
}
