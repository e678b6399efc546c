use std::fmt;

use ndarray::Dimension;

use crate::{
    ModelErr, Result,
    shape::{Shape, expect_extent, expect_rank, shape, transposed_len, tuple, window_len},
};

/// A 1d, 2d or 3d convolution, optionally transposed.
///
/// Strides, paddings and dilations are given per spatial axis; the constructors broadcast a
/// single value to every axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conv {
    in_channels: usize,
    out_channels: usize,
    kernel_size: Vec<usize>,
    stride: Vec<usize>,
    padding: Vec<usize>,
    dilation: Vec<usize>,
    output_padding: Vec<usize>,
    groups: usize,
    bias: bool,
    transposed: bool,
}

impl Conv {
    /// Creates a new `Conv` with unit strides and dilations, no padding, a single group and a
    /// bias.
    ///
    /// # Arguments
    /// * `in_channels` - Channels of the input.
    /// * `out_channels` - Channels produced.
    /// * `kernel_size` - Kernel extent per spatial axis, its length sets the dimensionality.
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: &[usize]) -> Self {
        let dims = kernel_size.len();

        Self {
            in_channels,
            out_channels,
            kernel_size: kernel_size.to_vec(),
            stride: vec![1; dims],
            padding: vec![0; dims],
            dilation: vec![1; dims],
            output_padding: vec![0; dims],
            groups: 1,
            bias: true,
            transposed: false,
        }
    }

    pub fn with_stride(mut self, stride: &[usize]) -> Self {
        self.stride = broadcast(stride, self.dims());
        self
    }

    pub fn with_padding(mut self, padding: &[usize]) -> Self {
        self.padding = broadcast(padding, self.dims());
        self
    }

    pub fn with_dilation(mut self, dilation: &[usize]) -> Self {
        self.dilation = broadcast(dilation, self.dims());
        self
    }

    pub fn with_groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    /// Turns this convolution into a transposed one.
    pub fn transposed(mut self, output_padding: &[usize]) -> Self {
        self.transposed = true;
        self.output_padding = broadcast(output_padding, self.dims());
        self
    }

    /// The amount of spatial axes.
    pub fn dims(&self) -> usize {
        self.kernel_size.len()
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn kernel_size(&self) -> &[usize] {
        &self.kernel_size
    }

    pub fn groups(&self) -> usize {
        self.groups
    }

    pub fn has_bias(&self) -> bool {
        self.bias
    }

    pub fn is_transposed(&self) -> bool {
        self.transposed
    }

    pub fn type_name(&self) -> &'static str {
        match (self.transposed, self.dims()) {
            (false, 1) => "Conv1d",
            (false, 2) => "Conv2d",
            (false, _) => "Conv3d",
            (true, 1) => "ConvTranspose1d",
            (true, 2) => "ConvTranspose2d",
            (true, _) => "ConvTranspose3d",
        }
    }

    pub fn num_params(&self) -> usize {
        let kernel: usize = self.kernel_size.iter().product();
        let weights = self.out_channels * (self.in_channels / self.groups) * kernel;
        let bias = if self.bias { self.out_channels } else { 0 };
        weights + bias
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let name = self.type_name();
        let dims = self.dims();

        if !(1..=3).contains(&dims) {
            return Err(ModelErr::InvalidConfig(format!(
                "{name} needs 1 to 3 kernel extents, got {dims}"
            )));
        }
        let per_axis = [&self.stride, &self.padding, &self.dilation, &self.output_padding];
        if per_axis.iter().any(|v| v.len() != dims) {
            return Err(ModelErr::InvalidConfig(format!(
                "{name}: stride, padding and dilation need {dims} extents"
            )));
        }
        if self.kernel_size.contains(&0) || self.stride.contains(&0) || self.dilation.contains(&0)
        {
            return Err(ModelErr::InvalidConfig(format!(
                "{name}: kernel, stride and dilation must be positive"
            )));
        }
        if self.groups == 0
            || self.in_channels % self.groups != 0
            || self.out_channels % self.groups != 0
        {
            return Err(ModelErr::InvalidConfig(format!(
                "{name}: {} groups do not divide {} input and {} output channels",
                self.groups, self.in_channels, self.out_channels
            )));
        }

        Ok(())
    }

    pub fn output_shape(&self, input: &Shape) -> Result<Shape> {
        let name = self.type_name();
        let dims = self.dims();
        expect_rank(name, input, dims + 2)?;
        expect_extent(name, "channels", input, 1, self.in_channels)?;

        let mut out = input.slice().to_vec();
        out[1] = self.out_channels;

        for axis in 0..dims {
            let len = input[axis + 2];
            let (k, s, p, d) = (
                self.kernel_size[axis],
                self.stride[axis],
                self.padding[axis],
                self.dilation[axis],
            );
            let out_len = if self.transposed {
                transposed_len(len, k, s, p, d, self.output_padding[axis])
            } else {
                window_len(len, k, s, p, d)
            };

            out[axis + 2] = out_len.ok_or_else(|| ModelErr::EmptyOutput {
                layer: name.to_string(),
            })?;
        }

        Ok(shape(&out))
    }
}

impl fmt::Display for Conv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, kernel_size={}, stride={}",
            self.in_channels,
            self.out_channels,
            tuple(&self.kernel_size),
            tuple(&self.stride)
        )?;

        if self.padding.iter().any(|&p| p != 0) {
            write!(f, ", padding={}", tuple(&self.padding))?;
        }
        if self.dilation.iter().any(|&d| d != 1) {
            write!(f, ", dilation={}", tuple(&self.dilation))?;
        }
        if self.transposed && self.output_padding.iter().any(|&p| p != 0) {
            write!(f, ", output_padding={}", tuple(&self.output_padding))?;
        }
        if self.groups != 1 {
            write!(f, ", groups={}", self.groups)?;
        }
        if !self.bias {
            write!(f, ", bias=False")?;
        }

        Ok(())
    }
}

/// Repeats a single extent over `dims` axes, leaves anything else untouched.
pub(crate) fn broadcast(values: &[usize], dims: usize) -> Vec<usize> {
    match values {
        [v] => vec![*v; dims],
        _ => values.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resnet_stem_conv() {
        let conv = Conv::new(3, 64, &[7, 7])
            .with_stride(&[2])
            .with_padding(&[3])
            .with_bias(false);

        assert_eq!(conv.type_name(), "Conv2d");
        assert_eq!(conv.num_params(), 9408);
        let out = conv.output_shape(&shape(&[1, 3, 224, 224])).unwrap();
        assert_eq!(out, shape(&[1, 64, 112, 112]));
        assert_eq!(
            conv.to_string(),
            "3, 64, kernel_size=(7, 7), stride=(2, 2), padding=(3, 3), bias=False"
        );
    }

    #[test]
    fn grouped_conv_divides_weights() {
        let conv = Conv::new(32, 32, &[3, 3]).with_groups(32);
        assert_eq!(conv.num_params(), 32 * 9 + 32);
        assert!(conv.validate().is_ok());
        assert!(Conv::new(32, 30, &[3, 3]).with_groups(4).validate().is_err());
    }

    #[test]
    fn transposed_conv_upsamples() {
        let conv = Conv::new(16, 8, &[3, 3])
            .with_stride(&[2])
            .with_padding(&[1])
            .transposed(&[1]);

        assert_eq!(conv.type_name(), "ConvTranspose2d");
        let out = conv.output_shape(&shape(&[2, 16, 8, 8])).unwrap();
        assert_eq!(out, shape(&[2, 8, 16, 16]));
    }

    #[test]
    fn rejects_wrong_channels() {
        let conv = Conv::new(3, 8, &[3]);
        let err = conv.output_shape(&shape(&[1, 4, 10])).unwrap_err();
        assert!(matches!(err, ModelErr::ShapeMismatch { got: 4, expected: 3, .. }));
    }

    #[test]
    fn rejects_too_small_input() {
        let conv = Conv::new(1, 1, &[5]);
        let err = conv.output_shape(&shape(&[1, 1, 3])).unwrap_err();
        assert!(matches!(err, ModelErr::EmptyOutput { .. }));
    }
}
