// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fan-out of one blob to several consumers.

use crate::{Layer, LayerCaps, LayerError, RunOptions};
use tensor_core::Tensor;

/// Produces `num_tops` outputs that share the input's storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct Split;

impl Split {
    pub fn new() -> Self {
        Self
    }
}

impl Layer for Split {
    fn kind(&self) -> &'static str {
        "Split"
    }

    fn caps(&self) -> LayerCaps {
        LayerCaps {
            supports_multi_input: true,
            ..Default::default()
        }
    }

    fn forward_multi(
        &self,
        bottoms: &[Tensor],
        num_tops: usize,
        _opt: &RunOptions,
    ) -> Result<Vec<Tensor>, LayerError> {
        let [bottom] = bottoms else {
            return Err(LayerError::ShapeMismatch {
                kind: self.kind(),
                detail: format!("expected 1 input, got {}", bottoms.len()),
            });
        };
        Ok(vec![bottom.clone(); num_tops])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::Shape;

    #[test]
    fn test_shallow_copies() {
        let input = Tensor::from_f32(Shape::vector(2), &[1.0, 2.0]).unwrap();
        let tops = Split
            .forward_multi(std::slice::from_ref(&input), 3, &RunOptions::default())
            .unwrap();
        assert_eq!(tops.len(), 3);
        assert!(tops.iter().all(|t| t.shares_storage(&input)));
    }

    #[test]
    fn test_copy_on_write_isolates_consumers() {
        let input = Tensor::from_f32(Shape::vector(1), &[1.0]).unwrap();
        let mut tops = Split
            .forward_multi(std::slice::from_ref(&input), 2, &RunOptions::default())
            .unwrap();
        tops[0].as_mut_slice()[0] = 9.0;
        assert_eq!(tops[1].as_slice(), &[1.0]);
        assert_eq!(input.as_slice(), &[1.0]);
    }

    #[test]
    fn test_requires_single_input() {
        let t = Tensor::zeros(Shape::vector(1));
        assert!(matches!(
            Split.forward_multi(&[t.clone(), t], 2, &RunOptions::default()),
            Err(LayerError::ShapeMismatch { .. })
        ));
        assert!(Split.caps().supports_multi_input);
        assert!(!Split.caps().supports_inplace);
    }
}
