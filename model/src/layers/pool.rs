use std::fmt;

use ndarray::Dimension;

use super::conv::broadcast;
use crate::{
    ModelErr, Result,
    shape::{Shape, expect_rank, shape, tuple, window_len},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Max,
    Avg,
    AdaptiveMax,
    AdaptiveAvg,
}

/// Max or average pooling over 1 to 3 spatial axes, with a fixed window or an adaptive output
/// size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    kind: PoolKind,
    dims: usize,
    /// Window for fixed pools, output size for adaptive ones.
    window: Vec<usize>,
    stride: Vec<usize>,
    padding: Vec<usize>,
}

impl Pool {
    /// A max pool; `stride` defaults to the kernel size like the usual frameworks do.
    pub fn max(
        dims: usize,
        kernel_size: &[usize],
        stride: Option<&[usize]>,
        padding: &[usize],
    ) -> Self {
        Self::fixed(PoolKind::Max, dims, kernel_size, stride, padding)
    }

    pub fn avg(
        dims: usize,
        kernel_size: &[usize],
        stride: Option<&[usize]>,
        padding: &[usize],
    ) -> Self {
        Self::fixed(PoolKind::Avg, dims, kernel_size, stride, padding)
    }

    pub fn adaptive_max(dims: usize, output_size: &[usize]) -> Self {
        Self::adaptive(PoolKind::AdaptiveMax, dims, output_size)
    }

    pub fn adaptive_avg(dims: usize, output_size: &[usize]) -> Self {
        Self::adaptive(PoolKind::AdaptiveAvg, dims, output_size)
    }

    fn fixed(
        kind: PoolKind,
        dims: usize,
        kernel_size: &[usize],
        stride: Option<&[usize]>,
        padding: &[usize],
    ) -> Self {
        let window = broadcast(kernel_size, dims);
        let stride = stride.map_or_else(|| window.clone(), |s| broadcast(s, dims));

        Self {
            kind,
            dims,
            window,
            stride,
            padding: broadcast(padding, dims),
        }
    }

    fn adaptive(kind: PoolKind, dims: usize, output_size: &[usize]) -> Self {
        Self {
            kind,
            dims,
            window: broadcast(output_size, dims),
            stride: vec![1; dims],
            padding: vec![0; dims],
        }
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    fn is_adaptive(&self) -> bool {
        matches!(self.kind, PoolKind::AdaptiveMax | PoolKind::AdaptiveAvg)
    }

    pub fn type_name(&self) -> &'static str {
        use PoolKind::*;
        match (self.kind, self.dims) {
            (Max, 1) => "MaxPool1d",
            (Max, 2) => "MaxPool2d",
            (Max, _) => "MaxPool3d",
            (Avg, 1) => "AvgPool1d",
            (Avg, 2) => "AvgPool2d",
            (Avg, _) => "AvgPool3d",
            (AdaptiveMax, 1) => "AdaptiveMaxPool1d",
            (AdaptiveMax, 2) => "AdaptiveMaxPool2d",
            (AdaptiveMax, _) => "AdaptiveMaxPool3d",
            (AdaptiveAvg, 1) => "AdaptiveAvgPool1d",
            (AdaptiveAvg, 2) => "AdaptiveAvgPool2d",
            (AdaptiveAvg, _) => "AdaptiveAvgPool3d",
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let name = self.type_name();
        if !(1..=3).contains(&self.dims) {
            return Err(ModelErr::InvalidConfig(format!(
                "{name} needs 1 to 3 spatial axes, got {}",
                self.dims
            )));
        }
        if [&self.window, &self.stride, &self.padding]
            .iter()
            .any(|v| v.len() != self.dims)
        {
            return Err(ModelErr::InvalidConfig(format!(
                "{name}: window, stride and padding need {} extents",
                self.dims
            )));
        }
        if self.window.contains(&0) || self.stride.contains(&0) {
            return Err(ModelErr::InvalidConfig(format!(
                "{name}: window and stride must be positive"
            )));
        }

        Ok(())
    }

    pub fn output_shape(&self, input: &Shape) -> Result<Shape> {
        let name = self.type_name();
        expect_rank(name, input, self.dims + 2)?;

        let mut out = input.slice().to_vec();
        for axis in 0..self.dims {
            out[axis + 2] = if self.is_adaptive() {
                self.window[axis]
            } else {
                window_len(
                    input[axis + 2],
                    self.window[axis],
                    self.stride[axis],
                    self.padding[axis],
                    1,
                )
                .ok_or_else(|| ModelErr::EmptyOutput {
                    layer: name.to_string(),
                })?
            };
        }

        Ok(shape(&out))
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_adaptive() {
            return write!(f, "output_size={}", tuple(&self.window));
        }

        write!(
            f,
            "kernel_size={}, stride={}, padding={}",
            tuple(&self.window),
            tuple(&self.stride),
            tuple(&self.padding)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_pool_defaults_stride_to_kernel() {
        let pool = Pool::max(2, &[2], None, &[0]);
        let out = pool.output_shape(&shape(&[1, 8, 32, 32])).unwrap();
        assert_eq!(out, shape(&[1, 8, 16, 16]));
    }

    #[test]
    fn resnet_max_pool() {
        let pool = Pool::max(2, &[3], Some(&[2]), &[1]);
        assert_eq!(pool.type_name(), "MaxPool2d");
        let out = pool.output_shape(&shape(&[1, 64, 112, 112])).unwrap();
        assert_eq!(out, shape(&[1, 64, 56, 56]));
    }

    #[test]
    fn adaptive_pool_fixes_the_output() {
        let pool = Pool::adaptive_avg(2, &[1]);
        assert_eq!(pool.type_name(), "AdaptiveAvgPool2d");
        let out = pool.output_shape(&shape(&[2, 512, 7, 7])).unwrap();
        assert_eq!(out, shape(&[2, 512, 1, 1]));
    }
}
