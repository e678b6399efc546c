use std::fmt;

use ndarray::Dimension;

use crate::{
    ModelErr, Result,
    shape::{Shape, expect_extent, expect_min_rank, expect_rank},
};

/// The flavours of normalization that work over the channel axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormKind {
    Batch,
    Instance,
    Group { groups: usize },
}

/// Batch, instance or group normalization over axis 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelNorm {
    kind: NormKind,
    /// Spatial axes expected after the channel axis, unused by group norm.
    dims: usize,
    num_channels: usize,
    affine: bool,
    track_running_stats: bool,
}

impl ChannelNorm {
    /// Batch normalization with affine parameters and running statistics.
    pub fn batch(dims: usize, num_features: usize) -> Self {
        Self {
            kind: NormKind::Batch,
            dims,
            num_channels: num_features,
            affine: true,
            track_running_stats: true,
        }
    }

    /// Instance normalization, without affine parameters nor running statistics.
    pub fn instance(dims: usize, num_features: usize) -> Self {
        Self {
            kind: NormKind::Instance,
            dims,
            num_channels: num_features,
            affine: false,
            track_running_stats: false,
        }
    }

    /// Group normalization with affine parameters.
    pub fn group(groups: usize, num_channels: usize) -> Self {
        Self {
            kind: NormKind::Group { groups },
            dims: 0,
            num_channels,
            affine: true,
            track_running_stats: false,
        }
    }

    pub fn with_affine(mut self, affine: bool) -> Self {
        self.affine = affine;
        self
    }

    pub fn with_running_stats(mut self, track: bool) -> Self {
        if !matches!(self.kind, NormKind::Group { .. }) {
            self.track_running_stats = track;
        }
        self
    }

    pub fn kind(&self) -> NormKind {
        self.kind
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn is_affine(&self) -> bool {
        self.affine
    }

    pub fn type_name(&self) -> &'static str {
        match (self.kind, self.dims) {
            (NormKind::Batch, 1) => "BatchNorm1d",
            (NormKind::Batch, 2) => "BatchNorm2d",
            (NormKind::Batch, _) => "BatchNorm3d",
            (NormKind::Instance, 1) => "InstanceNorm1d",
            (NormKind::Instance, 2) => "InstanceNorm2d",
            (NormKind::Instance, _) => "InstanceNorm3d",
            (NormKind::Group { .. }, _) => "GroupNorm",
        }
    }

    pub fn num_params(&self) -> usize {
        if self.affine { 2 * self.num_channels } else { 0 }
    }

    /// Running mean, running variance and the tracked batch counter.
    pub fn num_buffers(&self) -> usize {
        if self.track_running_stats {
            2 * self.num_channels + 1
        } else {
            0
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match self.kind {
            NormKind::Group { groups } if groups == 0 || self.num_channels % groups != 0 => {
                Err(ModelErr::InvalidConfig(format!(
                    "GroupNorm: {groups} groups do not divide {} channels",
                    self.num_channels
                )))
            }
            NormKind::Batch | NormKind::Instance if !(1..=3).contains(&self.dims) => {
                Err(ModelErr::InvalidConfig(format!(
                    "{} needs 1 to 3 spatial axes, got {}",
                    self.type_name(),
                    self.dims
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn output_shape(&self, input: &Shape) -> Result<Shape> {
        let name = self.type_name();
        match self.kind {
            // BatchNorm1d also takes (N, C) inputs.
            NormKind::Batch if self.dims == 1 && input.ndim() == 2 => {}
            NormKind::Group { .. } => expect_min_rank(name, input, 2)?,
            _ => expect_rank(name, input, self.dims + 2)?,
        }
        expect_extent(name, "channels", input, 1, self.num_channels)?;

        Ok(input.clone())
    }
}

impl fmt::Display for ChannelNorm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |b: bool| if b { "True" } else { "False" };
        match self.kind {
            NormKind::Group { groups } => write!(
                f,
                "{groups}, {}, affine={}",
                self.num_channels,
                flag(self.affine)
            ),
            _ => write!(
                f,
                "{}, affine={}, track_running_stats={}",
                self.num_channels,
                flag(self.affine),
                flag(self.track_running_stats)
            ),
        }
    }
}

/// Layer normalization over the trailing axes of its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerNorm {
    normalized_shape: Vec<usize>,
    elementwise_affine: bool,
}

impl LayerNorm {
    pub fn new(normalized_shape: &[usize]) -> Self {
        Self {
            normalized_shape: normalized_shape.to_vec(),
            elementwise_affine: true,
        }
    }

    pub fn with_affine(mut self, affine: bool) -> Self {
        self.elementwise_affine = affine;
        self
    }

    pub fn is_affine(&self) -> bool {
        self.elementwise_affine
    }

    pub fn num_params(&self) -> usize {
        if self.elementwise_affine {
            2 * self.normalized_shape.iter().product::<usize>()
        } else {
            0
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.normalized_shape.is_empty() {
            return Err(ModelErr::InvalidConfig(
                "LayerNorm needs a non-empty normalized shape".into(),
            ));
        }

        Ok(())
    }

    pub fn output_shape(&self, input: &Shape) -> Result<Shape> {
        let n = self.normalized_shape.len();
        expect_min_rank("LayerNorm", input, n)?;

        let offset = input.ndim() - n;
        for (i, &extent) in self.normalized_shape.iter().enumerate() {
            expect_extent("LayerNorm", "normalized axis", input, offset + i, extent)?;
        }

        Ok(input.clone())
    }
}

impl fmt::Display for LayerNorm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let affine = if self.elementwise_affine { "True" } else { "False" };
        write!(
            f,
            "{}, elementwise_affine={affine}",
            crate::shape::tuple(&self.normalized_shape)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::shape;

    #[test]
    fn batch_norm_counts_params_and_buffers() {
        let bn = ChannelNorm::batch(2, 64);
        assert_eq!(bn.type_name(), "BatchNorm2d");
        assert_eq!(bn.num_params(), 128);
        assert_eq!(bn.num_buffers(), 129);
        let x = shape(&[1, 64, 56, 56]);
        assert_eq!(bn.output_shape(&x).unwrap(), x);
    }

    #[test]
    fn batch_norm_1d_accepts_flat_input() {
        let bn = ChannelNorm::batch(1, 10);
        assert!(bn.output_shape(&shape(&[8, 10])).is_ok());
        assert!(bn.output_shape(&shape(&[8, 10, 4])).is_ok());
        assert!(bn.output_shape(&shape(&[8, 10, 4, 4])).is_err());
    }

    #[test]
    fn instance_norm_defaults_to_stateless() {
        let inorm = ChannelNorm::instance(2, 16);
        assert_eq!(inorm.num_params(), 0);
        assert_eq!(inorm.num_buffers(), 0);
    }

    #[test]
    fn group_norm_must_divide_channels() {
        assert!(ChannelNorm::group(4, 30).validate().is_err());
        let gn = ChannelNorm::group(4, 32);
        assert!(gn.validate().is_ok());
        assert_eq!(gn.num_params(), 64);
        assert_eq!(gn.num_buffers(), 0);
    }

    #[test]
    fn layer_norm_checks_trailing_axes() {
        let ln = LayerNorm::new(&[16, 32]);
        assert_eq!(ln.num_params(), 1024);
        assert!(ln.output_shape(&shape(&[2, 16, 32])).is_ok());
        assert!(ln.output_shape(&shape(&[2, 32, 16])).is_err());
    }
}
