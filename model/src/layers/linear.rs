use std::fmt;

use ndarray::Dimension;

use crate::{
    Result,
    shape::{Shape, expect_extent, expect_min_rank, shape},
};

/// A fully connected layer applied over the last axis of its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Linear {
    in_features: usize,
    out_features: usize,
    bias: bool,
}

impl Linear {
    /// Returns a new `Linear`.
    ///
    /// # Arguments
    /// * `in_features` - Extent of the last input axis.
    /// * `out_features` - Extent of the last output axis.
    /// * `bias` - Whether a bias is added to every output.
    pub fn new(in_features: usize, out_features: usize, bias: bool) -> Self {
        Self {
            in_features,
            out_features,
            bias,
        }
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    pub fn has_bias(&self) -> bool {
        self.bias
    }

    pub fn num_params(&self) -> usize {
        let bias = if self.bias { self.out_features } else { 0 };
        self.in_features * self.out_features + bias
    }

    pub fn output_shape(&self, input: &Shape) -> Result<Shape> {
        expect_min_rank("Linear", input, 1)?;
        let last = input.ndim() - 1;
        expect_extent("Linear", "in_features", input, last, self.in_features)?;

        let mut out = input.slice().to_vec();
        out[last] = self.out_features;
        Ok(shape(&out))
    }
}

impl fmt::Display for Linear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bias = if self.bias { "True" } else { "False" };
        write!(
            f,
            "in_features={}, out_features={}, bias={bias}",
            self.in_features, self.out_features
        )
    }
}
