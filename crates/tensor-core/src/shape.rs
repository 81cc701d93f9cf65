// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Blob dimensions.

use std::fmt;

/// Dimensions of a [`crate::Tensor`], outermost first.
///
/// Layers address data by channel. A rank-3 shape is `[channels, height,
/// width]`; any other rank is treated as one channel holding every element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// # Examples
    /// ```
    /// use tensor_core::Shape;
    /// let s = Shape::new(vec![2, 3, 4]);
    /// assert_eq!(s.channels(), 2);
    /// assert_eq!(s.channel_size(), 12);
    /// ```
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    pub fn vector(len: usize) -> Self {
        Self { dims: vec![len] }
    }

    /// `rows` x `cols`, used for per-row results such as top-k indices.
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self {
            dims: vec![rows, cols],
        }
    }

    pub fn chw(channels: usize, height: usize, width: usize) -> Self {
        Self {
            dims: vec![channels, height, width],
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total element count (1 for rank 0).
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// The outermost dimension of a rank-3 shape, 1 otherwise.
    pub fn channels(&self) -> usize {
        match self.dims.as_slice() {
            [c, _, _] => *c,
            _ => 1,
        }
    }

    /// Elements per channel.
    pub fn channel_size(&self) -> usize {
        match self.channels() {
            0 => 0,
            c => self.num_elements() / c,
        }
    }
}

/// `3x224x224`, the same notation the CLI accepts for inputs.
impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dims = self.dims.iter();
        match dims.next() {
            Some(first) => write!(f, "{first}")?,
            None => return f.write_str("scalar"),
        }
        for d in dims {
            write!(f, "x{d}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank0_is_one_element() {
        let s = Shape::new(vec![]);
        assert_eq!(s.rank(), 0);
        assert_eq!(s.num_elements(), 1);
        assert_eq!(s.channels(), 1);
    }

    #[test]
    fn test_non_chw_is_single_channel() {
        assert_eq!(Shape::vector(5).channel_size(), 5);
        assert_eq!(Shape::matrix(2, 3).channels(), 1);
        assert_eq!(Shape::matrix(2, 3).channel_size(), 6);
    }

    #[test]
    fn test_chw_channels() {
        let s = Shape::chw(3, 4, 5);
        assert_eq!(s.channels(), 3);
        assert_eq!(s.channel_size(), 20);
    }

    #[test]
    fn test_zero_channels() {
        let s = Shape::chw(0, 4, 4);
        assert_eq!(s.num_elements(), 0);
        assert_eq!(s.channel_size(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::chw(3, 4, 5).to_string(), "3x4x5");
        assert_eq!(Shape::vector(7).to_string(), "7");
        assert_eq!(Shape::new(vec![]).to_string(), "scalar");
    }
}
