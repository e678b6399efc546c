use std::fmt;

use crate::{
    ModelErr, Result,
    shape::{Shape, expect_extent, expect_rank, shape},
};

/// The recurrent cell families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Rnn,
    Gru,
    Lstm,
}

impl Cell {
    /// The amount of gates stacked in the input-hidden and hidden-hidden weights.
    pub fn gates(&self) -> usize {
        match self {
            Cell::Rnn => 1,
            Cell::Gru => 3,
            Cell::Lstm => 4,
        }
    }
}

/// A possibly stacked and bidirectional recurrent layer over whole sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recurrent {
    cell: Cell,
    input_size: usize,
    hidden_size: usize,
    num_layers: usize,
    bias: bool,
    bidirectional: bool,
    batch_first: bool,
}

impl Recurrent {
    /// A single layer, unidirectional, sequence-first recurrent layer with biases.
    pub fn new(cell: Cell, input_size: usize, hidden_size: usize) -> Self {
        Self {
            cell,
            input_size,
            hidden_size,
            num_layers: 1,
            bias: true,
            bidirectional: false,
            batch_first: false,
        }
    }

    pub fn with_layers(mut self, num_layers: usize) -> Self {
        self.num_layers = num_layers;
        self
    }

    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    pub fn bidirectional(mut self, bidirectional: bool) -> Self {
        self.bidirectional = bidirectional;
        self
    }

    pub fn batch_first(mut self, batch_first: bool) -> Self {
        self.batch_first = batch_first;
        self
    }

    pub fn cell(&self) -> Cell {
        self.cell
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn num_layers(&self) -> usize {
        self.num_layers
    }

    pub fn has_bias(&self) -> bool {
        self.bias
    }

    pub fn is_bidirectional(&self) -> bool {
        self.bidirectional
    }

    pub fn directions(&self) -> usize {
        if self.bidirectional { 2 } else { 1 }
    }

    /// Input features seen by the `layer`-th stacked layer.
    pub fn layer_input_size(&self, layer: usize) -> usize {
        if layer == 0 {
            self.input_size
        } else {
            self.hidden_size * self.directions()
        }
    }

    /// Splits a `(batch, seq)` pair out of a 3-axis input.
    pub fn batch_and_seq(&self, input: &Shape) -> (usize, usize) {
        if self.batch_first {
            (input[0], input[1])
        } else {
            (input[1], input[0])
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.cell {
            Cell::Rnn => "RNN",
            Cell::Gru => "GRU",
            Cell::Lstm => "LSTM",
        }
    }

    pub fn num_params(&self) -> usize {
        let gh = self.cell.gates() * self.hidden_size;
        let per_direction = |layer: usize| {
            let weights = gh * (self.layer_input_size(layer) + self.hidden_size);
            let biases = if self.bias { 2 * gh } else { 0 };
            weights + biases
        };

        (0..self.num_layers).map(per_direction).sum::<usize>() * self.directions()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.num_layers == 0 || self.hidden_size == 0 {
            return Err(ModelErr::InvalidConfig(format!(
                "{} needs at least one layer and a positive hidden size",
                self.type_name()
            )));
        }

        Ok(())
    }

    pub fn output_shape(&self, input: &Shape) -> Result<Shape> {
        let name = self.type_name();
        expect_rank(name, input, 3)?;
        expect_extent(name, "input_size", input, 2, self.input_size)?;

        Ok(shape(&[
            input[0],
            input[1],
            self.hidden_size * self.directions(),
        ]))
    }
}

impl fmt::Display for Recurrent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.input_size, self.hidden_size)?;
        if self.num_layers != 1 {
            write!(f, ", num_layers={}", self.num_layers)?;
        }
        if !self.bias {
            write!(f, ", bias=False")?;
        }
        if self.batch_first {
            write!(f, ", batch_first=True")?;
        }
        if self.bidirectional {
            write!(f, ", bidirectional=True")?;
        }

        Ok(())
    }
}

/// A single recurrent step over a `(batch, input_size)` input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrentCell {
    cell: Cell,
    input_size: usize,
    hidden_size: usize,
    bias: bool,
}

impl RecurrentCell {
    pub fn new(cell: Cell, input_size: usize, hidden_size: usize, bias: bool) -> Self {
        Self {
            cell,
            input_size,
            hidden_size,
            bias,
        }
    }

    pub fn cell(&self) -> Cell {
        self.cell
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn has_bias(&self) -> bool {
        self.bias
    }

    pub fn type_name(&self) -> &'static str {
        match self.cell {
            Cell::Rnn => "RNNCell",
            Cell::Gru => "GRUCell",
            Cell::Lstm => "LSTMCell",
        }
    }

    pub fn num_params(&self) -> usize {
        let gh = self.cell.gates() * self.hidden_size;
        let biases = if self.bias { 2 * gh } else { 0 };
        gh * (self.input_size + self.hidden_size) + biases
    }

    pub fn output_shape(&self, input: &Shape) -> Result<Shape> {
        let name = self.type_name();
        expect_rank(name, input, 2)?;
        expect_extent(name, "input_size", input, 1, self.input_size)?;

        Ok(shape(&[input[0], self.hidden_size]))
    }
}

impl fmt::Display for RecurrentCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.input_size, self.hidden_size)?;
        if !self.bias {
            write!(f, ", bias=False")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lstm_params_follow_gate_layout() {
        // 4 gates * 20 hidden * (10 input + 20 hidden) + 2 * 4 * 20 biases
        let lstm = Recurrent::new(Cell::Lstm, 10, 20);
        assert_eq!(lstm.num_params(), 2400 + 160);
    }

    #[test]
    fn stacked_bidirectional_gru_params() {
        let gru = Recurrent::new(Cell::Gru, 8, 16)
            .with_layers(2)
            .bidirectional(true);

        let gh = 3 * 16;
        let first = gh * (8 + 16) + 2 * gh;
        let second = gh * (32 + 16) + 2 * gh;
        assert_eq!(gru.num_params(), 2 * (first + second));
    }

    #[test]
    fn output_carries_both_directions() {
        let rnn = Recurrent::new(Cell::Rnn, 5, 7)
            .bidirectional(true)
            .batch_first(true);

        let x = shape(&[3, 11, 5]);
        assert_eq!(rnn.output_shape(&x).unwrap(), shape(&[3, 11, 14]));
        assert_eq!(rnn.batch_and_seq(&x), (3, 11));
    }

    #[test]
    fn cell_maps_input_to_hidden() {
        let cell = RecurrentCell::new(Cell::Gru, 6, 9, true);
        assert_eq!(cell.type_name(), "GRUCell");
        assert_eq!(cell.output_shape(&shape(&[4, 6])).unwrap(), shape(&[4, 9]));
        assert_eq!(cell.num_params(), 27 * 15 + 54);
    }
}
