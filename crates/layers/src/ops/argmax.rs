// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Top-k selection over all elements of a blob.
//!
//! Parameters: `0` = out_max_val (emit values as well as indices),
//! `1` = topk (default 1).
//!
//! Output is `[rows, topk]`. Without out_max_val there is one row of
//! indices; with it, row 0 holds the values and row 1 their indices.
//! Ties are ordered by descending index.

use crate::{Layer, LayerError, RunOptions};
use model_io::{ModelError, ParamDict};
use std::cmp::Ordering;
use tensor_core::{Shape, Tensor};

#[derive(Debug, Clone, PartialEq)]
pub struct ArgMax {
    pub out_max_val: bool,
    pub topk: usize,
}

impl Default for ArgMax {
    fn default() -> Self {
        Self {
            out_max_val: false,
            topk: 1,
        }
    }
}

impl ArgMax {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Layer for ArgMax {
    fn kind(&self) -> &'static str {
        "ArgMax"
    }

    fn load_param(&mut self, pd: &ParamDict) -> Result<(), LayerError> {
        self.out_max_val = pd.get_int(0, 0) != 0;
        let topk = pd.get_int(1, 1);
        if topk < 1 {
            return Err(ModelError::ParamError {
                id: 1,
                detail: format!("topk must be at least 1, got {topk}"),
            }
            .into());
        }
        self.topk = topk as usize;
        Ok(())
    }

    fn forward(&self, bottom: &Tensor, _opt: &RunOptions) -> Result<Tensor, LayerError> {
        let values = bottom.as_slice();
        let topk = self.topk.min(values.len());

        let mut ranked: Vec<(f32, usize)> = values.iter().copied().zip(0..).collect();
        let by_rank = |a: &(f32, usize), b: &(f32, usize)| -> Ordering {
            b.0.total_cmp(&a.0).then(b.1.cmp(&a.1))
        };
        if topk > 0 && topk < ranked.len() {
            ranked.select_nth_unstable_by(topk - 1, by_rank);
        }
        ranked.truncate(topk);
        ranked.sort_unstable_by(by_rank);

        let indices = ranked.iter().map(|&(_, i)| i as f32);
        let out: Vec<f32> = if self.out_max_val {
            ranked.iter().map(|&(v, _)| v).chain(indices).collect()
        } else {
            indices.collect()
        };
        let rows = if self.out_max_val { 2 } else { 1 };
        Ok(Tensor::from_vec(Shape::matrix(rows, topk), out)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_io::ParamValue;

    fn input(values: &[f32]) -> Tensor {
        Tensor::from_f32(Shape::vector(values.len()), values).unwrap()
    }

    #[test]
    fn test_load_param() {
        let mut layer = ArgMax::new();
        let pd = ParamDict::new()
            .with(0, ParamValue::Int(1))
            .with(1, ParamValue::Int(3));
        layer.load_param(&pd).unwrap();
        assert!(layer.out_max_val);
        assert_eq!(layer.topk, 3);

        let mut defaults = ArgMax::new();
        defaults.load_param(&ParamDict::new()).unwrap();
        assert_eq!(defaults, ArgMax::default());
    }

    #[test]
    fn test_invalid_topk() {
        let mut layer = ArgMax::new();
        let pd = ParamDict::new().with(1, ParamValue::Int(0));
        assert!(matches!(
            layer.load_param(&pd),
            Err(LayerError::ParamError(ModelError::ParamError { id: 1, .. }))
        ));
    }

    #[test]
    fn test_top1_index_only() {
        let out = ArgMax::new()
            .forward(&input(&[0.1, 0.7, 0.2]), &RunOptions::default())
            .unwrap();
        assert_eq!(out.shape().dims(), &[1, 1]);
        assert_eq!(out.as_slice(), &[1.0]);
    }

    #[test]
    fn test_topk_with_values() {
        let layer = ArgMax {
            out_max_val: true,
            topk: 2,
        };
        let out = layer
            .forward(&input(&[3.0, 9.0, 1.0, 5.0]), &RunOptions::default())
            .unwrap();
        assert_eq!(out.shape().dims(), &[2, 2]);
        assert_eq!(out.as_slice(), &[9.0, 5.0, 1.0, 3.0]);
    }

    #[test]
    fn test_ties_prefer_higher_index() {
        let layer = ArgMax {
            out_max_val: false,
            topk: 2,
        };
        let out = layer
            .forward(&input(&[2.0, 2.0, 2.0]), &RunOptions::default())
            .unwrap();
        assert_eq!(out.as_slice(), &[2.0, 1.0]);
    }

    #[test]
    fn test_topk_clamped_to_input() {
        let layer = ArgMax {
            out_max_val: false,
            topk: 10,
        };
        let out = layer
            .forward(&input(&[1.0, 4.0]), &RunOptions::default())
            .unwrap();
        assert_eq!(out.as_slice(), &[1.0, 0.0]);
    }

    #[test]
    fn test_no_inplace_entry() {
        let mut t = input(&[1.0]);
        assert!(matches!(
            ArgMax::new().forward_inplace(&mut t, &RunOptions::default()),
            Err(LayerError::Unsupported { .. })
        ));
        assert!(!ArgMax::new().caps().supports_inplace);
    }

    proptest::proptest! {
        #[test]
        fn test_top1_is_maximum(values in proptest::collection::vec(-1e3f32..1e3, 1..64)) {
            let out = ArgMax::new().forward(&input(&values), &RunOptions::default()).unwrap();
            let idx = out.as_slice()[0] as usize;
            let max = values.iter().copied().fold(f32::MIN, f32::max);
            proptest::prop_assert_eq!(values[idx], max);
        }
    }
}
