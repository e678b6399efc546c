use std::fmt;

use ndarray::Dimension;

use crate::{
    ModelErr, Result,
    shape::{Shape, expect_min_rank, shape, tuple},
};

/// Spatial upsampling, either by an integer factor or to a fixed size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsample {
    Scale(usize),
    Size(Vec<usize>),
}

impl Upsample {
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Upsample::Scale(0) => Err(ModelErr::InvalidConfig(
                "Upsample scale factor must be positive".into(),
            )),
            Upsample::Size(size) if size.is_empty() || size.contains(&0) => Err(
                ModelErr::InvalidConfig("Upsample size must have positive extents".into()),
            ),
            _ => Ok(()),
        }
    }

    pub fn output_shape(&self, input: &Shape) -> Result<Shape> {
        expect_min_rank("Upsample", input, 3)?;

        let mut out = input.slice().to_vec();
        let spatial = &mut out[2..];
        match self {
            Upsample::Scale(factor) => spatial.iter_mut().for_each(|l| *l *= factor),
            Upsample::Size(size) => {
                if size.len() != spatial.len() {
                    return Err(ModelErr::RankMismatch {
                        layer: "Upsample".into(),
                        got: input.ndim(),
                        expected: size.len() + 2,
                    });
                }
                spatial.copy_from_slice(size);
            }
        }

        Ok(shape(&out))
    }
}

impl fmt::Display for Upsample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Upsample::Scale(factor) => write!(f, "scale_factor={factor}.0, mode='nearest'"),
            Upsample::Size(size) => write!(f, "size={}, mode='nearest'", tuple(size)),
        }
    }
}
