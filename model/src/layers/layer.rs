use std::fmt;

use super::{
    Activation, ChannelNorm, Conv, Custom, Embedding, Flatten, LayerNorm, Linear,
    MultiheadAttention, Pool, Recurrent, RecurrentCell, Upsample,
};
use crate::{ModelErr, Result, shape::Shape};

/// Every layer a network can be made of.
#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    Conv(Conv),
    Linear(Linear),
    ChannelNorm(ChannelNorm),
    LayerNorm(LayerNorm),
    Activation(Activation),
    Pool(Pool),
    Upsample(Upsample),
    Recurrent(Recurrent),
    RecurrentCell(RecurrentCell),
    Attention(MultiheadAttention),
    Dropout { p: f32 },
    Identity,
    Flatten(Flatten),
    Embedding(Embedding),
    Custom(Custom),
}
use Layer::*;

impl Layer {
    pub fn conv2d(in_channels: usize, out_channels: usize, kernel: usize) -> Self {
        Self::Conv(Conv::new(in_channels, out_channels, &[kernel, kernel]))
    }

    pub fn linear(in_features: usize, out_features: usize) -> Self {
        Self::Linear(Linear::new(in_features, out_features, true))
    }

    pub fn batch_norm2d(num_features: usize) -> Self {
        Self::ChannelNorm(ChannelNorm::batch(2, num_features))
    }

    pub fn relu() -> Self {
        Self::Activation(Activation::ReLU)
    }

    /// The framework style name of this layer's type, e.g. `Conv2d`. Counting hooks and ignore
    /// lists are keyed by it.
    pub fn type_name(&self) -> &str {
        match self {
            Conv(l) => l.type_name(),
            Linear(_) => "Linear",
            ChannelNorm(l) => l.type_name(),
            LayerNorm(_) => "LayerNorm",
            Activation(l) => l.type_name(),
            Pool(l) => l.type_name(),
            Upsample(_) => "Upsample",
            Recurrent(l) => l.type_name(),
            RecurrentCell(l) => l.type_name(),
            Attention(_) => "MultiheadAttention",
            Dropout { .. } => "Dropout",
            Identity => "Identity",
            Flatten(_) => "Flatten",
            Embedding(_) => "Embedding",
            Custom(l) => l.type_name(),
        }
    }

    /// Returns the amount of learnable scalars this layer owns.
    pub fn num_params(&self) -> usize {
        match self {
            Conv(l) => l.num_params(),
            Linear(l) => l.num_params(),
            ChannelNorm(l) => l.num_params(),
            LayerNorm(l) => l.num_params(),
            Activation(l) => l.num_params(),
            Recurrent(l) => l.num_params(),
            RecurrentCell(l) => l.num_params(),
            Attention(l) => l.num_params(),
            Embedding(l) => l.num_params(),
            Custom(l) => l.num_params(),
            Pool(_) | Upsample(_) | Dropout { .. } | Identity | Flatten(_) => 0,
        }
    }

    /// Returns the amount of non-learnable scalars this layer keeps as state.
    pub fn num_buffers(&self) -> usize {
        match self {
            ChannelNorm(l) => l.num_buffers(),
            Custom(l) => l.num_buffers(),
            _ => 0,
        }
    }

    /// Checks the layer's own configuration, independently of any input.
    pub fn validate(&self) -> Result<()> {
        match self {
            Conv(l) => l.validate(),
            ChannelNorm(l) => l.validate(),
            LayerNorm(l) => l.validate(),
            Pool(l) => l.validate(),
            Upsample(l) => l.validate(),
            Recurrent(l) => l.validate(),
            Attention(l) => l.validate(),
            Custom(l) => l.validate(),
            Dropout { p } if !(0.0..=1.0).contains(p) => Err(ModelErr::InvalidConfig(format!(
                "dropout probability {p} is outside [0, 1]"
            ))),
            _ => Ok(()),
        }
    }

    /// Infers the shape this layer produces for `input`.
    ///
    /// # Errors
    /// Returns `ModelErr` when `input` cannot be consumed by this layer.
    pub fn output_shape(&self, input: &Shape) -> Result<Shape> {
        match self {
            Conv(l) => l.output_shape(input),
            Linear(l) => l.output_shape(input),
            ChannelNorm(l) => l.output_shape(input),
            LayerNorm(l) => l.output_shape(input),
            Activation(l) => l.output_shape(input),
            Pool(l) => l.output_shape(input),
            Upsample(l) => l.output_shape(input),
            Recurrent(l) => l.output_shape(input),
            RecurrentCell(l) => l.output_shape(input),
            Attention(l) => l.output_shape(input),
            Flatten(l) => l.output_shape(input),
            Embedding(l) => l.output_shape(input),
            Custom(l) => l.output_shape(input),
            Dropout { .. } | Identity => Ok(input.clone()),
        }
    }
}

/// The layer's constructor arguments, the way `extra_repr` reads.
impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conv(l) => write!(f, "{l}"),
            Linear(l) => write!(f, "{l}"),
            ChannelNorm(l) => write!(f, "{l}"),
            LayerNorm(l) => write!(f, "{l}"),
            Activation(l) => write!(f, "{l}"),
            Pool(l) => write!(f, "{l}"),
            Upsample(l) => write!(f, "{l}"),
            Recurrent(l) => write!(f, "{l}"),
            RecurrentCell(l) => write!(f, "{l}"),
            Attention(l) => write!(f, "{l}"),
            Flatten(l) => write!(f, "{l}"),
            Embedding(l) => write!(f, "{l}"),
            Custom(l) => write!(f, "{l}"),
            Dropout { p } => write!(f, "p={p}"),
            Identity => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::shape;

    #[test]
    fn dispatches_to_the_wrapped_layer() {
        let conv = Layer::conv2d(3, 8, 3);
        assert_eq!(conv.type_name(), "Conv2d");
        assert_eq!(conv.num_params(), 3 * 8 * 9 + 8);
        assert_eq!(
            conv.output_shape(&shape(&[1, 3, 10, 10])).unwrap(),
            shape(&[1, 8, 8, 8])
        );
    }

    #[test]
    fn stateless_layers_have_no_params() {
        for layer in [Layer::relu(), Layer::Identity, Layer::Dropout { p: 0.5 }] {
            assert_eq!(layer.num_params(), 0);
            assert_eq!(layer.num_buffers(), 0);
        }
    }

    #[test]
    fn custom_layers_keep_their_name() {
        let layer = Layer::Custom(super::Custom::new("SwiGLU", 42).with_buffers(3));
        assert_eq!(layer.type_name(), "SwiGLU");
        assert_eq!(layer.num_params(), 42);
        assert_eq!(layer.num_buffers(), 3);
    }

    #[test]
    fn dropout_probability_is_checked() {
        assert!(Layer::Dropout { p: 1.5 }.validate().is_err());
        assert!(Layer::Dropout { p: 0.1 }.validate().is_ok());
    }
}
