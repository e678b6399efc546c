//! Counting hooks: one function per layer family estimating the multiply-accumulate operations of
//! a single call, for the whole batch, out of the layer and the shapes it consumed and produced.

use std::collections::{HashMap, HashSet};

use model::{
    Layer, Shape,
    layers::{
        Cell, ChannelNorm, Conv, LayerNorm, Linear, MultiheadAttention, Recurrent, RecurrentCell,
    },
    numel,
};
use ndarray::Dimension;

/// A user supplied counting function for some layer type.
pub type CustomHook = Box<dyn Fn(&Layer, &Shape, &Shape) -> u64>;

fn prod(dims: &[usize]) -> u64 {
    dims.iter().map(|&d| d as u64).product()
}

fn elements(shape: &Shape) -> u64 {
    numel(shape) as u64
}

/// Every output position multiplies a `kernel * in_channels / groups` window for each output
/// channel. Transposed convolutions scatter from input positions instead.
pub fn conv_flops(conv: &Conv, input: &Shape, output: &Shape) -> u64 {
    let batch = input[0] as u64;
    let per_position = prod(conv.kernel_size())
        * conv.in_channels() as u64
        * (conv.out_channels() / conv.groups()) as u64;

    let output_positions = batch * prod(&output.slice()[2..]);
    let active_positions = if conv.is_transposed() {
        batch * prod(&input.slice()[2..])
    } else {
        output_positions
    };

    let bias = if conv.has_bias() {
        conv.out_channels() as u64 * output_positions
    } else {
        0
    };

    per_position * active_positions + bias
}

/// Every input element is multiplied into each output feature; the bias is added once per
/// output feature.
pub fn linear_flops(linear: &Linear, input: &Shape) -> u64 {
    let out = linear.out_features() as u64;
    let bias = if linear.has_bias() { out } else { 0 };
    elements(input) * out + bias
}

/// One op per output element.
pub fn rectifier_flops(output: &Shape) -> u64 {
    elements(output)
}

/// One op per input element, whatever the window.
pub fn pool_flops(input: &Shape) -> u64 {
    elements(input)
}

/// Normalizing costs one op per element, the affine transform one more.
pub fn channel_norm_flops(norm: &ChannelNorm, input: &Shape) -> u64 {
    let factor = if norm.is_affine() { 2 } else { 1 };
    elements(input) * factor
}

pub fn layer_norm_flops(norm: &LayerNorm, input: &Shape) -> u64 {
    let factor = if norm.is_affine() { 2 } else { 1 };
    elements(input) * factor
}

pub fn upsample_flops(output: &Shape) -> u64 {
    elements(output)
}

/// Cost of a single time step of one recurrent layer, biases excluded.
fn recurrent_step_flops(cell: Cell, input_size: usize, hidden_size: usize) -> u64 {
    let gh = (cell.gates() * hidden_size) as u64;
    let h = hidden_size as u64;

    // input-hidden and hidden-hidden products
    let products = gh * input_size as u64 + gh * h;

    let elementwise = match cell {
        // sum of both products
        Cell::Rnn => h,
        // reset gate product, sums of both states, two products and a sum for the new state
        Cell::Gru => h + 3 * h + 3 * h,
        // sums of both states, cell state update, hidden state update
        Cell::Lstm => 4 * h + 3 * h + 3 * h,
    };

    products + elementwise
}

fn recurrent_bias_flops(cell: Cell, hidden_size: usize) -> u64 {
    2 * (cell.gates() * hidden_size) as u64
}

pub fn recurrent_flops(rnn: &Recurrent, input: &Shape) -> u64 {
    let per_step: u64 = (0..rnn.num_layers())
        .map(|layer| {
            let step =
                recurrent_step_flops(rnn.cell(), rnn.layer_input_size(layer), rnn.hidden_size());
            let bias = if rnn.has_bias() {
                recurrent_bias_flops(rnn.cell(), rnn.hidden_size())
            } else {
                0
            };
            step + bias
        })
        .sum();

    let (batch, seq) = rnn.batch_and_seq(input);
    per_step * batch as u64 * seq as u64 * rnn.directions() as u64
}

pub fn recurrent_cell_flops(cell: &RecurrentCell, input: &Shape) -> u64 {
    let step = recurrent_step_flops(cell.cell(), cell.input_size(), cell.hidden_size());
    let bias = if cell.has_bias() {
        recurrent_bias_flops(cell.cell(), cell.hidden_size())
    } else {
        0
    };

    (step + bias) * input[0] as u64
}

/// Self-attention over a `(len, embed)` sequence: query scaling, the three input projections,
/// per-head scores, softmax and weighted sums, then the output projection.
pub fn attention_flops(mha: &MultiheadAttention, input: &Shape) -> u64 {
    let (batch, len) = mha.batch_and_seq(input);
    let (l, e) = (len as u64, input[2] as u64);
    let heads = mha.num_heads() as u64;
    let head_dim = e / heads;

    let scaling = l * e;
    let projections = 3 * l * e * e;
    let projection_bias = if mha.has_bias() { 3 * l * e } else { 0 };
    let per_head = l * l * head_dim + l * l + l * l * head_dim;
    let out_projection = l * e * (e + 1);

    (scaling + projections + projection_bias + heads * per_head + out_projection) * batch as u64
}

/// The built-in hook of a layer, if its type has one.
pub fn default_flops(layer: &Layer, input: &Shape, output: &Shape) -> Option<u64> {
    let flops = match layer {
        Layer::Conv(conv) => conv_flops(conv, input, output),
        Layer::Linear(linear) => linear_flops(linear, input),
        Layer::ChannelNorm(norm) => channel_norm_flops(norm, input),
        Layer::LayerNorm(norm) => layer_norm_flops(norm, input),
        Layer::Activation(act) if act.is_rectifier() => rectifier_flops(output),
        Layer::Pool(_) => pool_flops(input),
        Layer::Upsample(_) => upsample_flops(output),
        Layer::Recurrent(rnn) => recurrent_flops(rnn, input),
        Layer::RecurrentCell(cell) => recurrent_cell_flops(cell, input),
        Layer::Attention(mha) => attention_flops(mha, input),
        Layer::Activation(_)
        | Layer::Dropout { .. }
        | Layer::Identity
        | Layer::Flatten(_)
        | Layer::Embedding(_)
        | Layer::Custom(_) => return None,
    };

    Some(flops)
}

/// Chooses which counting function runs for each layer type.
///
/// Ignored types get no hook at all, custom hooks win over the built-in ones.
#[derive(Default)]
pub struct HookTable {
    custom: HashMap<String, CustomHook>,
    ignored: HashSet<String>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `hook` for every layer whose type name is `type_name`.
    pub fn with_custom<F>(mut self, type_name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&Layer, &Shape, &Shape) -> u64 + 'static,
    {
        self.insert_custom(type_name, Box::new(hook));
        self
    }

    pub fn insert_custom(&mut self, type_name: impl Into<String>, hook: CustomHook) {
        self.custom.insert(type_name.into(), hook);
    }

    pub fn ignore(&mut self, type_name: impl Into<String>) {
        self.ignored.insert(type_name.into());
    }

    pub fn is_ignored(&self, type_name: &str) -> bool {
        self.ignored.contains(type_name)
    }

    /// Counts one call of `layer`.
    ///
    /// # Returns
    /// The forward MACs of the call for the whole batch, or `None` when no hook applies to the
    /// layer's type.
    pub fn count(&self, layer: &Layer, input: &Shape, output: &Shape) -> Option<u64> {
        let type_name = layer.type_name();
        if self.is_ignored(type_name) {
            return None;
        }

        match self.custom.get(type_name) {
            Some(hook) => Some(hook(layer, input, output)),
            None => default_flops(layer, input, output),
        }
    }
}
