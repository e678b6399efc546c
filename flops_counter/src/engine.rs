//! The counting engine: traces a network once over shapes, hooking every layer call, and keeps
//! forward and backward MACs per registered layer.

use std::collections::HashSet;

use log::{debug, info, warn};
use model::{ForwardHook, LayerEntry, LayerId, Network, Shape, shape};
use ndarray::Dimension;

use crate::{FlopsErr, Result, groups::Counts, hooks::HookTable};

/// Builds the traced input shape out of the requested resolution.
pub type InputConstructor = Box<dyn Fn(&[usize]) -> Shape>;

/// What one registered layer cost over every call, for the whole batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerStats {
    pub forward: u64,
    pub backward: u64,
    pub calls: usize,
}

/// The outcome of tracing a network.
#[derive(Debug, Clone)]
pub struct Profile {
    batch: u64,
    stats: Vec<LayerStats>,
    output: Shape,
}

impl Profile {
    pub fn batch_size(&self) -> u64 {
        self.batch
    }

    /// The shape the network produced.
    pub fn output_shape(&self) -> &Shape {
        &self.output
    }

    /// Stats of the layer `id` for the whole batch.
    pub fn batch_layer(&self, id: LayerId) -> LayerStats {
        self.stats.get(id.index()).copied().unwrap_or_default()
    }

    /// Per-sample stats of the layer `id`.
    pub fn layer(&self, id: LayerId) -> LayerStats {
        let stats = self.batch_layer(id);
        LayerStats {
            forward: stats.forward / self.batch,
            backward: stats.backward / self.batch,
            calls: stats.calls,
        }
    }

    /// Per-sample counts of the layers `select` accepts.
    ///
    /// Flops are summed over the whole batch before being divided by the batch size, parameters
    /// are those that receive gradients.
    pub fn counts<F>(&self, network: &Network, mut select: F) -> Counts
    where
        F: FnMut(&LayerEntry) -> bool,
    {
        let mut counts = Counts::default();
        for (id, entry) in network.entries().filter(|(_, e)| select(e)) {
            let stats = self.batch_layer(id);
            counts += Counts {
                forward: stats.forward,
                backward: stats.backward,
                params: entry.trainable_params(),
            };
        }

        counts.forward /= self.batch;
        counts.backward /= self.batch;
        counts
    }

    pub fn total(&self, network: &Network) -> Counts {
        self.counts(network, |_| true)
    }
}

/// Input gradients cost as much as the forward pass. Layers with trainable parameters pay the
/// same again for their weight gradients.
pub fn backward_flops(forward: u64, entry: &LayerEntry) -> u64 {
    if entry.trainable_params() > 0 {
        2 * forward
    } else {
        forward
    }
}

/// The default input: one sample of the requested resolution.
pub fn batch_of_one(input_res: &[usize]) -> Shape {
    let mut dims = Vec::with_capacity(input_res.len() + 1);
    dims.push(1);
    dims.extend_from_slice(input_res);
    shape(&dims)
}

struct Counter<'a> {
    hooks: &'a HookTable,
    stats: Vec<LayerStats>,
    verbose: bool,
    zero_op_types: HashSet<String>,
}

impl ForwardHook for Counter<'_> {
    fn on_call(
        &mut self,
        id: LayerId,
        entry: &LayerEntry,
        input: &Shape,
        output: &Shape,
    ) -> model::Result<()> {
        let layer = entry.layer();
        let stats = &mut self.stats[id.index()];
        stats.calls += 1;

        match self.hooks.count(layer, input, output) {
            Some(forward) => {
                stats.forward += forward;
                stats.backward += backward_flops(forward, entry);
                debug!(layer = entry.path(), forward; "counted call");
            }
            None => {
                let type_name = layer.type_name();
                if self.verbose && self.zero_op_types.insert(type_name.to_string()) {
                    warn!("module {type_name} is treated as a zero-op");
                }
            }
        }

        Ok(())
    }
}

/// Counts the MACs of one forward pass of `network`.
///
/// # Arguments
/// * `network` - The network to profile.
/// * `input_res` - The input resolution of a single sample, e.g. `[3, 224, 224]`.
/// * `input_constructor` - Builds the traced input out of `input_res`, batch of one by default.
/// * `hooks` - The counting hooks to dispatch to.
/// * `verbose` - Whether to warn about layer types counted as zero-op.
///
/// # Errors
/// Returns `FlopsErr` if the input is empty or the network fails to trace.
pub fn get_flops(
    network: &Network,
    input_res: &[usize],
    input_constructor: Option<&InputConstructor>,
    hooks: &HookTable,
    verbose: bool,
) -> Result<Profile> {
    if input_res.is_empty() {
        return Err(FlopsErr::InvalidInput(
            "the input resolution needs at least one dimension".into(),
        ));
    }

    let input = match input_constructor {
        Some(construct) => {
            let input = construct(input_res);
            if input.ndim() == input_res.len() {
                warn!(
                    "the constructed input {:?} has no extra batch axis, its first axis is taken as the batch",
                    input.slice()
                );
            }
            input
        }
        None => batch_of_one(input_res),
    };

    let batch = match input.slice().first() {
        Some(&batch) if batch > 0 => batch as u64,
        _ => {
            return Err(FlopsErr::InvalidInput(format!(
                "cannot trace an input of shape {:?}",
                input.slice()
            )));
        }
    };

    let mut counter = Counter {
        hooks,
        stats: vec![LayerStats::default(); network.layers().len()],
        verbose,
        zero_op_types: HashSet::new(),
    };
    let output = network.trace(&input, &mut counter)?;

    let profile = Profile {
        batch,
        stats: counter.stats,
        output,
    };
    let total = profile.total(network);
    info!(
        "traced {:?} -> {:?}: {} forward MACs, {} backward MACs per sample",
        input.slice(),
        profile.output.slice(),
        total.forward,
        total.backward
    );

    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{
        Layer, NetworkBuilder, Node,
        layers::{Activation, Linear},
        zoo,
    };

    fn tiny() -> Network {
        let mut b = NetworkBuilder::new();
        let fc = b.add("fc", Layer::Linear(Linear::new(4, 4, false)));
        let relu = b.add("relu", Layer::relu());
        b.build(Node::repeat(3, Node::chain([fc, relu]))).unwrap()
    }

    #[test]
    fn reused_layers_count_every_call() {
        let net = tiny();
        let profile = get_flops(&net, &[4], None, &HookTable::new(), false).unwrap();

        let fc = profile.layer(net.find("fc").unwrap());
        assert_eq!(fc.calls, 3);
        assert_eq!(fc.forward, 3 * 16);
        assert_eq!(fc.backward, 3 * 32);

        let total = profile.total(&net);
        assert_eq!(total.forward, 3 * 16 + 3 * 4);
        assert_eq!(total.backward, 3 * 32 + 3 * 4);
        assert_eq!(total.params, 16);
    }

    #[test]
    fn frozen_layers_skip_weight_gradients() {
        let mut b = NetworkBuilder::new();
        let fc = b.add_frozen("fc", Layer::Linear(Linear::new(4, 2, false)));
        let net = b.build(Node::Call(fc)).unwrap();

        let total = get_flops(&net, &[4], None, &HookTable::new(), false)
            .unwrap()
            .total(&net);
        assert_eq!(total.forward, 8);
        assert_eq!(total.backward, 8);
        assert_eq!(total.params, 0);
    }

    #[test]
    fn flops_are_per_sample() {
        let net = tiny();
        let construct: InputConstructor = Box::new(|res| {
            let mut dims = vec![8];
            dims.extend_from_slice(res);
            shape(&dims)
        });

        let batched = get_flops(&net, &[4], Some(&construct), &HookTable::new(), false).unwrap();
        let single = get_flops(&net, &[4], None, &HookTable::new(), false).unwrap();
        assert_eq!(batched.batch_size(), 8);
        assert_eq!(batched.total(&net), single.total(&net));
        assert_eq!(batched.output_shape(), &shape(&[8, 4]));
    }

    #[test]
    fn rejects_empty_inputs() {
        let net = tiny();
        let err = get_flops(&net, &[], None, &HookTable::new(), false).unwrap_err();
        assert!(matches!(err, FlopsErr::InvalidInput(_)));

        let zero_batch: InputConstructor = Box::new(|res| {
            let mut dims = vec![0];
            dims.extend_from_slice(res);
            shape(&dims)
        });
        let err = get_flops(&net, &[4], Some(&zero_batch), &HookTable::new(), false).unwrap_err();
        assert!(matches!(err, FlopsErr::InvalidInput(_)));
    }

    #[test]
    fn shape_errors_surface_as_model_errors() {
        let net = tiny();
        let err = get_flops(&net, &[5], None, &HookTable::new(), true).unwrap_err();
        assert!(matches!(err, FlopsErr::Model(_)));
    }

    #[test]
    fn resnet18_stem_counts() {
        let _ = env_logger::builder().is_test(true).try_init();
        let net = zoo::resnet18(1000).unwrap();
        let profile = get_flops(&net, &[3, 224, 224], None, &HookTable::new(), true).unwrap();

        let conv1 = profile.layer(net.find("conv1").unwrap());
        assert_eq!(conv1.forward, 118_013_952);
        assert_eq!(conv1.backward, 2 * 118_013_952);

        // called twice per block
        let relu = profile.layer(net.find("layer1.0.relu").unwrap());
        assert_eq!(relu.calls, 2);
        assert_eq!(relu.forward, 2 * 64 * 56 * 56);
        assert_eq!(relu.backward, relu.forward);
    }

    #[test]
    fn zero_op_types_are_reported_once() {
        let mut b = NetworkBuilder::new();
        let first = b.add("gate.0", Layer::Activation(Activation::Sigmoid));
        let second = b.add("gate.1", Layer::Activation(Activation::Sigmoid));
        let net = b.build(Node::chain([first, second])).unwrap();
        let hooks = HookTable::new();

        for verbose in [true, false] {
            let mut counter = Counter {
                hooks: &hooks,
                stats: vec![LayerStats::default(); net.layers().len()],
                verbose,
                zero_op_types: HashSet::new(),
            };
            net.trace(&shape(&[1, 4]), &mut counter).unwrap();

            assert_eq!(counter.stats.iter().map(|s| s.calls).sum::<usize>(), 2);
            assert!(counter.stats.iter().all(|s| s.forward == 0));
            let expected = if verbose { 1 } else { 0 };
            assert_eq!(counter.zero_op_types.len(), expected);
        }
    }
}
