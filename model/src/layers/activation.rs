use std::fmt;

use crate::{
    Result,
    shape::{Shape, expect_extent, expect_min_rank},
};

/// Element-wise activation functions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    ReLU,
    ReLU6,
    LeakyReLU { negative_slope: f32 },
    ELU { alpha: f32 },
    PReLU { num_parameters: usize },
    Sigmoid,
    Tanh,
    GELU,
}
use Activation::*;

impl Activation {
    pub fn type_name(&self) -> &'static str {
        match self {
            ReLU => "ReLU",
            ReLU6 => "ReLU6",
            LeakyReLU { .. } => "LeakyReLU",
            ELU { .. } => "ELU",
            PReLU { .. } => "PReLU",
            Sigmoid => "Sigmoid",
            Tanh => "Tanh",
            GELU => "GELU",
        }
    }

    /// Whether this is one of the rectifier-like functions costed as one op per output.
    pub fn is_rectifier(&self) -> bool {
        matches!(
            self,
            ReLU | ReLU6 | LeakyReLU { .. } | ELU { .. } | PReLU { .. }
        )
    }

    pub fn num_params(&self) -> usize {
        match self {
            PReLU { num_parameters } => *num_parameters,
            _ => 0,
        }
    }

    pub fn output_shape(&self, input: &Shape) -> Result<Shape> {
        if let PReLU { num_parameters } = self
            && *num_parameters > 1
        {
            expect_min_rank("PReLU", input, 2)?;
            expect_extent("PReLU", "channels", input, 1, *num_parameters)?;
        }

        Ok(input.clone())
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeakyReLU { negative_slope } => write!(f, "negative_slope={negative_slope}"),
            ELU { alpha } => write!(f, "alpha={alpha}"),
            PReLU { num_parameters } => write!(f, "num_parameters={num_parameters}"),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::shape;

    #[test]
    fn prelu_owns_one_slope_per_channel() {
        let act = PReLU { num_parameters: 8 };
        assert_eq!(act.num_params(), 8);
        assert!(act.output_shape(&shape(&[1, 8, 4, 4])).is_ok());
        assert!(act.output_shape(&shape(&[1, 4, 4, 4])).is_err());
    }

    #[test]
    fn rectifiers_are_told_apart() {
        assert!(ReLU.is_rectifier());
        assert!(LeakyReLU { negative_slope: 0.01 }.is_rectifier());
        assert!(!Sigmoid.is_rectifier());
        assert!(!GELU.is_rectifier());
    }
}
