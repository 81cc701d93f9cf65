// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Core tensor type with shared, copy-on-write storage.

use crate::{DType, Shape, TensorError};
use std::sync::Arc;

/// An n-dimensional `f32` tensor stored in contiguous row-major memory.
///
/// Storage is reference-counted: `clone()` shares the buffer, and
/// [`as_mut_slice`](Tensor::as_mut_slice) detaches it first if another
/// handle still refers to it. This lets a layer hand the same blob to
/// several consumers without copying, while in-place layers never
/// clobber a buffer someone else can still observe.
#[derive(Debug, Clone)]
pub struct Tensor {
    shape: Shape,
    data: Arc<Vec<f32>>,
}

impl Tensor {
    /// Creates a new tensor filled with zeros.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape};
    /// let t = Tensor::zeros(Shape::matrix(2, 3));
    /// assert_eq!(t.size_bytes(), 24); // 2 * 3 * 4 bytes
    /// ```
    pub fn zeros(shape: Shape) -> Self {
        Self::filled(shape, 0.0)
    }

    /// Creates a tensor with every element set to `value`.
    pub fn filled(shape: Shape, value: f32) -> Self {
        let n = shape.num_elements();
        Self {
            shape,
            data: Arc::new(vec![value; n]),
        }
    }

    /// Creates a tensor that takes ownership of `values`.
    ///
    /// Returns an error if `values.len()` does not match the shape.
    pub fn from_vec(shape: Shape, values: Vec<f32>) -> Result<Self, TensorError> {
        let expected = shape.num_elements();
        if values.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            shape,
            data: Arc::new(values),
        })
    }

    /// Creates a tensor from a slice of `f32` values.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape};
    /// let t = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(t.as_slice(), &[1.0, 2.0, 3.0]);
    /// ```
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        Self::from_vec(shape, values.to_vec())
    }

    /// Returns the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Tensors always hold `f32` elements.
    pub fn dtype(&self) -> DType {
        DType::F32
    }

    /// Returns the number of elements.
    pub fn num_elements(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the memory footprint of this tensor in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len() * DType::F32.size_bytes()
    }

    /// Returns the elements as a flat slice.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Returns the elements as a mutable slice, detaching shared storage first.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        Arc::make_mut(&mut self.data).as_mut_slice()
    }

    /// Returns the elements of channel `q`.
    ///
    /// # Panics
    /// Panics if `q >= self.shape().channels()`.
    pub fn channel(&self, q: usize) -> &[f32] {
        let size = self.shape.channel_size();
        &self.data[q * size..(q + 1) * size]
    }

    /// Returns a new tensor with the same storage and a different shape.
    pub fn reshape(&self, shape: Shape) -> Result<Self, TensorError> {
        if shape.num_elements() != self.num_elements() {
            return Err(TensorError::ShapeMismatch {
                op: "reshape",
                lhs: self.shape.clone(),
                rhs: shape,
            });
        }
        Ok(Self {
            shape,
            data: Arc::clone(&self.data),
        })
    }

    /// Returns `true` if both tensors refer to the same storage.
    pub fn shares_storage(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Consumes the tensor and returns its elements, copying only if shared.
    pub fn into_vec(self) -> Vec<f32> {
        Arc::try_unwrap(self.data).unwrap_or_else(|shared| (*shared).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let t = Tensor::zeros(Shape::matrix(2, 3));
        assert_eq!(t.size_bytes(), 24);
        assert!(t.as_slice().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_from_vec_size_mismatch() {
        let result = Tensor::from_vec(Shape::vector(4), vec![1.0; 3]);
        assert!(matches!(
            result,
            Err(TensorError::BufferSizeMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_clone_shares_storage() {
        let a = Tensor::filled(Shape::vector(4), 1.5);
        let b = a.clone();
        assert!(a.shares_storage(&b));
    }

    #[test]
    fn test_mutation_detaches_shared_storage() {
        let a = Tensor::filled(Shape::vector(3), 1.0);
        let mut b = a.clone();
        b.as_mut_slice()[0] = 9.0;
        assert!(!a.shares_storage(&b));
        assert_eq!(a.as_slice(), &[1.0, 1.0, 1.0]);
        assert_eq!(b.as_slice(), &[9.0, 1.0, 1.0]);
    }

    #[test]
    fn test_unique_mutation_keeps_storage() {
        let mut a = Tensor::zeros(Shape::vector(2));
        let before = a.as_slice().as_ptr();
        a.as_mut_slice()[1] = 2.0;
        assert_eq!(a.as_slice().as_ptr(), before);
    }

    #[test]
    fn test_channel_access() {
        let t = Tensor::from_f32(Shape::chw(2, 1, 2), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(t.channel(0), &[1.0, 2.0]);
        assert_eq!(t.channel(1), &[3.0, 4.0]);
    }

    #[test]
    fn test_reshape() {
        let t = Tensor::from_f32(Shape::vector(6), &[0.0; 6]).unwrap();
        let r = t.reshape(Shape::matrix(2, 3)).unwrap();
        assert_eq!(r.shape(), &Shape::matrix(2, 3));
        assert!(r.shares_storage(&t));
        assert!(t.reshape(Shape::vector(5)).is_err());
    }

    #[test]
    fn test_into_vec() {
        let t = Tensor::from_f32(Shape::vector(2), &[1.0, 2.0]).unwrap();
        let shared = t.clone();
        assert_eq!(t.into_vec(), vec![1.0, 2.0]);
        assert_eq!(shared.into_vec(), vec![1.0, 2.0]);
    }
}
