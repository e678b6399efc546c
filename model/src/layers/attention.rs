use std::fmt;

use crate::{
    ModelErr, Result,
    shape::{Shape, expect_extent, expect_rank},
};

/// Multi-head attention used as self-attention: queries, keys and values all come from the
/// layer's single input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiheadAttention {
    embed_dim: usize,
    num_heads: usize,
    kdim: Option<usize>,
    vdim: Option<usize>,
    bias: bool,
    batch_first: bool,
}

impl MultiheadAttention {
    pub fn new(embed_dim: usize, num_heads: usize) -> Self {
        Self {
            embed_dim,
            num_heads,
            kdim: None,
            vdim: None,
            bias: true,
            batch_first: false,
        }
    }

    /// Sets distinct key and value feature sizes.
    pub fn with_kv_dims(mut self, kdim: usize, vdim: usize) -> Self {
        self.kdim = Some(kdim);
        self.vdim = Some(vdim);
        self
    }

    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    pub fn batch_first(mut self, batch_first: bool) -> Self {
        self.batch_first = batch_first;
        self
    }

    pub fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    pub fn kdim(&self) -> usize {
        self.kdim.unwrap_or(self.embed_dim)
    }

    pub fn vdim(&self) -> usize {
        self.vdim.unwrap_or(self.embed_dim)
    }

    pub fn has_bias(&self) -> bool {
        self.bias
    }

    /// Splits a `(batch, seq)` pair out of a 3-axis input.
    pub fn batch_and_seq(&self, input: &Shape) -> (usize, usize) {
        if self.batch_first {
            (input[0], input[1])
        } else {
            (input[1], input[0])
        }
    }

    pub fn num_params(&self) -> usize {
        let e = self.embed_dim;
        let in_proj = e * e + e * self.kdim() + e * self.vdim();
        let in_bias = if self.bias { 3 * e } else { 0 };
        let out_proj = e * e + if self.bias { e } else { 0 };
        in_proj + in_bias + out_proj
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.num_heads == 0 || self.embed_dim % self.num_heads != 0 {
            return Err(ModelErr::InvalidConfig(format!(
                "MultiheadAttention: {} heads do not divide embed_dim {}",
                self.num_heads, self.embed_dim
            )));
        }

        Ok(())
    }

    pub fn output_shape(&self, input: &Shape) -> Result<Shape> {
        expect_rank("MultiheadAttention", input, 3)?;
        expect_extent("MultiheadAttention", "embed_dim", input, 2, self.embed_dim)?;
        // Keys and values are the input itself.
        expect_extent("MultiheadAttention", "kdim", input, 2, self.kdim())?;
        expect_extent("MultiheadAttention", "vdim", input, 2, self.vdim())?;

        Ok(input.clone())
    }
}

impl fmt::Display for MultiheadAttention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "embed_dim={}, num_heads={}",
            self.embed_dim, self.num_heads
        )?;
        if self.batch_first {
            write!(f, ", batch_first=True")?;
        }

        Ok(())
    }
}
