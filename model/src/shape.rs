use ndarray::{Dimension, IxDyn};

use crate::{ModelErr, Result};

/// The shape of a tensor flowing through a network. The first axis is the batch axis unless the
/// layer consuming it says otherwise.
pub type Shape = IxDyn;

/// Builds a `Shape` out of its extents.
pub fn shape(dims: &[usize]) -> Shape {
    IxDyn(dims)
}

/// Returns the amount of elements of a tensor with the given shape.
pub fn numel(shape: &Shape) -> usize {
    shape.size()
}

/// Fails unless `input` has exactly `expected` axes.
pub(crate) fn expect_rank(layer: &str, input: &Shape, expected: usize) -> Result<()> {
    if input.ndim() != expected {
        return Err(ModelErr::RankMismatch {
            layer: layer.to_string(),
            got: input.ndim(),
            expected,
        });
    }

    Ok(())
}

/// Fails unless `input` has at least `min` axes.
pub(crate) fn expect_min_rank(layer: &str, input: &Shape, min: usize) -> Result<()> {
    if input.ndim() < min {
        return Err(ModelErr::RankMismatch {
            layer: layer.to_string(),
            got: input.ndim(),
            expected: min,
        });
    }

    Ok(())
}

/// Fails unless axis `axis` of `input` has extent `expected`.
pub(crate) fn expect_extent(
    layer: &str,
    what: &'static str,
    input: &Shape,
    axis: usize,
    expected: usize,
) -> Result<()> {
    if input[axis] != expected {
        return Err(ModelErr::ShapeMismatch {
            layer: layer.to_string(),
            what,
            got: input[axis],
            expected,
        });
    }

    Ok(())
}

/// Length of a sliding window axis: `floor((len + 2p - d(k - 1) - 1) / s) + 1`.
///
/// # Returns
/// `None` when the window does not fit even once.
pub(crate) fn window_len(
    len: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> Option<usize> {
    let span = dilation * (kernel - 1) + 1;
    let padded = len + 2 * padding;
    padded.checked_sub(span).map(|rest| rest / stride + 1)
}

/// Length of a transposed convolution axis:
/// `(len - 1)s - 2p + d(k - 1) + output_padding + 1`.
pub(crate) fn transposed_len(
    len: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
    output_padding: usize,
) -> Option<usize> {
    let grown = (len.checked_sub(1)?) * stride + dilation * (kernel - 1) + output_padding + 1;
    grown.checked_sub(2 * padding).filter(|&l| l > 0)
}

/// Formats extents the way tuple reprs read, `(7, 7)` or `(3,)`.
pub(crate) fn tuple(dims: &[usize]) -> String {
    match dims {
        [d] => format!("({d},)"),
        _ => {
            let inner: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
            format!("({})", inner.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_len_matches_conv_arithmetic() {
        // 224 input, 7x7 kernel, stride 2, padding 3 -> 112
        assert_eq!(window_len(224, 7, 2, 3, 1), Some(112));
        // 112 input, 3x3 kernel, stride 2, padding 1 -> 56
        assert_eq!(window_len(112, 3, 2, 1, 1), Some(56));
        // dilation widens the receptive field
        assert_eq!(window_len(10, 3, 1, 0, 2), Some(6));
        assert_eq!(window_len(2, 3, 1, 0, 1), None);
    }

    #[test]
    fn transposed_len_inverts_strided_conv() {
        assert_eq!(transposed_len(56, 3, 2, 1, 1, 1), Some(112));
        assert_eq!(transposed_len(0, 3, 2, 1, 1, 0), None);
    }

    #[test]
    fn tuple_formats_like_a_repr() {
        assert_eq!(tuple(&[7, 7]), "(7, 7)");
        assert_eq!(tuple(&[3]), "(3,)");
    }

    #[test]
    fn numel_multiplies_extents() {
        assert_eq!(numel(&shape(&[1, 3, 224, 224])), 150_528);
    }
}
