use std::collections::HashSet;

use log::debug;
use ndarray::Dimension;

use crate::{
    ModelErr, Result,
    layers::Layer,
    shape::{Shape, shape},
};

/// Index of a layer registered in a `Network`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(usize);

impl LayerId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A registered layer together with where it lives in the network.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerEntry {
    path: String,
    layer: Layer,
    trainable: bool,
}

impl LayerEntry {
    /// The dotted path of this layer, e.g. `layer1.0.conv1`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    /// Whether the parameters of this layer receive gradients.
    pub fn is_trainable(&self) -> bool {
        self.trainable
    }

    /// Parameters that receive gradients, frozen layers have none.
    pub fn trainable_params(&self) -> usize {
        if self.trainable {
            self.layer.num_params()
        } else {
            0
        }
    }
}

/// How the outputs of parallel branches are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// Element-wise sum, every branch must produce the same shape.
    Add,
    /// Concatenation along `axis`, every other axis must agree.
    Concat { axis: usize },
}

/// The forward program of a network.
///
/// Nodes only reference layers, so one layer may be called from many places. The tree itself
/// never loops.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Call(LayerId),
    Seq(Vec<Node>),
    /// `body(x) + shortcut(x)`, the shortcut being the identity when missing.
    Residual {
        body: Box<Node>,
        shortcut: Option<Box<Node>>,
    },
    Parallel {
        branches: Vec<Node>,
        merge: Merge,
    },
    /// Feeds the body its own output `times` times.
    Repeat { times: usize, body: Box<Node> },
}

impl Node {
    pub fn seq<I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = Node>,
    {
        Self::Seq(nodes.into_iter().collect())
    }

    /// Calls every layer in order.
    pub fn chain<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = LayerId>,
    {
        Self::Seq(ids.into_iter().map(Node::Call).collect())
    }

    pub fn residual(body: Node, shortcut: Option<Node>) -> Self {
        Self::Residual {
            body: Box::new(body),
            shortcut: shortcut.map(Box::new),
        }
    }

    pub fn parallel<I>(branches: I, merge: Merge) -> Self
    where
        I: IntoIterator<Item = Node>,
    {
        Self::Parallel {
            branches: branches.into_iter().collect(),
            merge,
        }
    }

    pub fn repeat(times: usize, body: Node) -> Self {
        Self::Repeat {
            times,
            body: Box::new(body),
        }
    }
}

/// Called on every layer invocation while tracing a network.
pub trait ForwardHook {
    /// # Arguments
    /// * `id` - The called layer.
    /// * `entry` - Its registration.
    /// * `input` - The shape it consumed.
    /// * `output` - The shape it produced.
    fn on_call(&mut self, id: LayerId, entry: &LayerEntry, input: &Shape, output: &Shape)
    -> Result<()>;
}

impl<F> ForwardHook for F
where
    F: FnMut(LayerId, &LayerEntry, &Shape, &Shape) -> Result<()>,
{
    fn on_call(
        &mut self,
        id: LayerId,
        entry: &LayerEntry,
        input: &Shape,
        output: &Shape,
    ) -> Result<()> {
        self(id, entry, input, output)
    }
}

/// A network: a table of layers plus the program that calls them.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    layers: Vec<LayerEntry>,
    root: Node,
}

impl Network {
    pub fn layers(&self) -> &[LayerEntry] {
        &self.layers
    }

    pub fn layer(&self, id: LayerId) -> Option<&LayerEntry> {
        self.layers.get(id.0)
    }

    /// Iterates the layers together with their ids, in registration order.
    pub fn entries(&self) -> impl Iterator<Item = (LayerId, &LayerEntry)> {
        self.layers.iter().enumerate().map(|(i, e)| (LayerId(i), e))
    }

    /// Looks a layer up by its path.
    pub fn find(&self, path: &str) -> Option<LayerId> {
        self.layers.iter().position(|e| e.path == path).map(LayerId)
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Returns the amount of trainable parameters. A layer called several times is counted once.
    pub fn num_params(&self) -> usize {
        self.layers.iter().map(LayerEntry::trainable_params).sum()
    }

    pub fn num_buffers(&self) -> usize {
        self.layers.iter().map(|e| e.layer.num_buffers()).sum()
    }

    /// Runs a forward pass over shapes only.
    ///
    /// # Arguments
    /// * `input` - The shape of the network's input.
    /// * `hook` - Invoked once per layer call, in execution order.
    ///
    /// # Returns
    /// The shape of the network's output or the first error found.
    pub fn trace<H: ForwardHook>(&self, input: &Shape, hook: &mut H) -> Result<Shape> {
        self.visit(&self.root, input.clone(), hook)
    }

    fn visit<H: ForwardHook>(&self, node: &Node, x: Shape, hook: &mut H) -> Result<Shape> {
        match node {
            Node::Call(id) => {
                let entry = self
                    .layer(*id)
                    .ok_or_else(|| ModelErr::UnknownLayer(format!("#{}", id.0)))?;
                let y = entry
                    .layer
                    .output_shape(&x)
                    .map_err(|e| e.at(&entry.path))?;

                debug!("{} {:?} -> {:?}", entry.path, x.slice(), y.slice());
                hook.on_call(*id, entry, &x, &y)?;
                Ok(y)
            }
            Node::Seq(nodes) => nodes
                .iter()
                .try_fold(x, |x, node| self.visit(node, x, hook)),
            Node::Residual { body, shortcut } => {
                let y = self.visit(body, x.clone(), hook)?;
                let skip = match shortcut {
                    Some(shortcut) => self.visit(shortcut, x, hook)?,
                    None => x,
                };
                merge_shapes(&[y, skip], Merge::Add)
            }
            Node::Parallel { branches, merge } => {
                let outputs = branches
                    .iter()
                    .map(|branch| self.visit(branch, x.clone(), hook))
                    .collect::<Result<Vec<_>>>()?;
                merge_shapes(&outputs, *merge)
            }
            Node::Repeat { times, body } => {
                (0..*times).try_fold(x, |x, _| self.visit(body, x, hook))
            }
        }
    }
}

fn merge_shapes(shapes: &[Shape], merge: Merge) -> Result<Shape> {
    let (first, rest) = shapes
        .split_first()
        .ok_or_else(|| ModelErr::InvalidConfig("nothing to merge".into()))?;

    let mismatch = |other: &Shape| ModelErr::MergeMismatch {
        left: first.slice().to_vec(),
        right: other.slice().to_vec(),
    };

    match merge {
        Merge::Add => {
            if let Some(other) = rest.iter().find(|s| *s != first) {
                return Err(mismatch(other));
            }

            Ok(first.clone())
        }
        Merge::Concat { axis } => {
            if axis >= first.ndim() {
                return Err(ModelErr::InvalidConfig(format!(
                    "cannot concatenate along axis {axis} of a {}-axis shape",
                    first.ndim()
                )));
            }

            let mut out = first.slice().to_vec();
            for other in rest {
                let agrees = other.ndim() == first.ndim()
                    && (0..first.ndim()).all(|i| i == axis || other[i] == first[i]);
                if !agrees {
                    return Err(mismatch(other));
                }
                out[axis] += other[axis];
            }

            Ok(shape(&out))
        }
    }
}

/// Registers layers and assembles them into a `Network`.
#[derive(Debug, Default)]
pub struct NetworkBuilder {
    layers: Vec<LayerEntry>,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a trainable layer under `path`.
    pub fn add(&mut self, path: impl Into<String>, layer: Layer) -> LayerId {
        self.register(path.into(), layer, true)
    }

    /// Registers a layer whose parameters receive no gradients.
    pub fn add_frozen(&mut self, path: impl Into<String>, layer: Layer) -> LayerId {
        self.register(path.into(), layer, false)
    }

    fn register(&mut self, path: String, layer: Layer, trainable: bool) -> LayerId {
        self.layers.push(LayerEntry {
            path,
            layer,
            trainable,
        });
        LayerId(self.layers.len() - 1)
    }

    /// Finishes the network.
    ///
    /// # Errors
    /// Returns `ModelErr` if two layers share a path, a layer is misconfigured or `root`
    /// references something that is not registered.
    pub fn build(self, root: Node) -> Result<Network> {
        let mut seen = HashSet::with_capacity(self.layers.len());
        for entry in &self.layers {
            if entry.path.is_empty() {
                return Err(ModelErr::InvalidConfig("layer paths must not be empty".into()));
            }
            if !seen.insert(entry.path.as_str()) {
                return Err(ModelErr::DuplicateLayer(entry.path.clone()));
            }
            entry.layer.validate().map_err(|e| e.at(&entry.path))?;
        }

        check_node(&root, self.layers.len())?;

        Ok(Network {
            layers: self.layers,
            root,
        })
    }
}

fn check_node(node: &Node, nlayers: usize) -> Result<()> {
    match node {
        Node::Call(id) if id.0 >= nlayers => Err(ModelErr::UnknownLayer(format!("#{}", id.0))),
        Node::Call(_) => Ok(()),
        Node::Seq(nodes) if nodes.is_empty() => {
            Err(ModelErr::InvalidConfig("sequences must not be empty".into()))
        }
        Node::Seq(nodes) => nodes.iter().try_for_each(|n| check_node(n, nlayers)),
        Node::Residual { body, shortcut } => {
            check_node(body, nlayers)?;
            shortcut
                .as_deref()
                .map_or(Ok(()), |shortcut| check_node(shortcut, nlayers))
        }
        Node::Parallel { branches, .. } if branches.is_empty() => {
            Err(ModelErr::InvalidConfig("parallel nodes need a branch".into()))
        }
        Node::Parallel { branches, .. } => branches.iter().try_for_each(|n| check_node(n, nlayers)),
        Node::Repeat { times: 0, .. } => {
            Err(ModelErr::InvalidConfig("repeat count must be positive".into()))
        }
        Node::Repeat { body, .. } => check_node(body, nlayers),
    }
}
