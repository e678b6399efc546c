use std::fmt;

use ndarray::Dimension;

use crate::{
    ModelErr, Result,
    shape::{Shape, expect_min_rank, shape, tuple},
};

/// Collapses every axis from `start_dim` on into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flatten {
    start_dim: usize,
}

impl Flatten {
    pub fn new(start_dim: usize) -> Self {
        Self { start_dim }
    }

    pub fn output_shape(&self, input: &Shape) -> Result<Shape> {
        expect_min_rank("Flatten", input, self.start_dim + 1)?;

        let dims = input.slice();
        let mut out = dims[..self.start_dim].to_vec();
        out.push(dims[self.start_dim..].iter().product());
        Ok(shape(&out))
    }
}

impl Default for Flatten {
    fn default() -> Self {
        Self::new(1)
    }
}

impl fmt::Display for Flatten {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "start_dim={}, end_dim=-1", self.start_dim)
    }
}

/// A lookup table from indices to dense vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Embedding {
    num_embeddings: usize,
    embedding_dim: usize,
}

impl Embedding {
    pub fn new(num_embeddings: usize, embedding_dim: usize) -> Self {
        Self {
            num_embeddings,
            embedding_dim,
        }
    }

    pub fn num_params(&self) -> usize {
        self.num_embeddings * self.embedding_dim
    }

    /// Every index of the input becomes an `embedding_dim` vector.
    pub fn output_shape(&self, input: &Shape) -> Result<Shape> {
        let mut out = input.slice().to_vec();
        out.push(self.embedding_dim);
        Ok(shape(&out))
    }
}

impl fmt::Display for Embedding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.num_embeddings, self.embedding_dim)
    }
}

/// A user defined layer. Its cost is only known through a custom counting hook registered under
/// its type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Custom {
    type_name: String,
    params: usize,
    buffers: usize,
    /// Per-sample output extents; `None` keeps the input shape.
    output: Option<Vec<usize>>,
}

impl Custom {
    pub fn new(type_name: impl Into<String>, params: usize) -> Self {
        Self {
            type_name: type_name.into(),
            params,
            buffers: 0,
            output: None,
        }
    }

    pub fn with_buffers(mut self, buffers: usize) -> Self {
        self.buffers = buffers;
        self
    }

    pub fn with_output(mut self, output: &[usize]) -> Self {
        self.output = Some(output.to_vec());
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn num_params(&self) -> usize {
        self.params
    }

    pub fn num_buffers(&self) -> usize {
        self.buffers
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.type_name.is_empty() {
            return Err(ModelErr::InvalidConfig(
                "custom layers need a type name".into(),
            ));
        }

        Ok(())
    }

    pub fn output_shape(&self, input: &Shape) -> Result<Shape> {
        let Some(output) = &self.output else {
            return Ok(input.clone());
        };

        expect_min_rank(&self.type_name, input, 1)?;
        let mut out = vec![input[0]];
        out.extend_from_slice(output);
        Ok(shape(&out))
    }
}

impl fmt::Display for Custom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.output {
            Some(output) => write!(f, "output={}", tuple(output)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_collapses_trailing_axes() {
        let out = Flatten::default()
            .output_shape(&shape(&[2, 512, 1, 1]))
            .unwrap();
        assert_eq!(out, shape(&[2, 512]));
        assert!(Flatten::new(3).output_shape(&shape(&[2, 3])).is_err());
    }

    #[test]
    fn embedding_appends_a_feature_axis() {
        let emb = Embedding::new(100, 16);
        assert_eq!(emb.num_params(), 1600);
        assert_eq!(
            emb.output_shape(&shape(&[4, 12])).unwrap(),
            shape(&[4, 12, 16])
        );
    }

    #[test]
    fn custom_layer_keeps_batch_axis() {
        let custom = Custom::new("Squeeze", 10).with_output(&[5]);
        assert_eq!(
            custom.output_shape(&shape(&[3, 7, 7])).unwrap(),
            shape(&[3, 5])
        );
        let identity = Custom::new("Noop", 0);
        assert_eq!(
            identity.output_shape(&shape(&[3, 7])).unwrap(),
            shape(&[3, 7])
        );
    }
}
