use std::{collections::HashMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    ModelErr, Result,
    graph::{LayerId, Merge, Network, NetworkBuilder, Node},
    layers::{
        Activation, Cell, ChannelNorm, Conv, Custom, Embedding, Flatten, Layer, LayerNorm,
        Linear, MultiheadAttention, Pool, Recurrent, RecurrentCell, Upsample,
    },
};

/// Either a single extent, broadcast to every spatial axis, or one extent per axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DimsSpec {
    One(usize),
    Many(Vec<usize>),
}

impl DimsSpec {
    fn expand(&self, dims: usize) -> Vec<usize> {
        match self {
            DimsSpec::One(v) => vec![*v; dims],
            DimsSpec::Many(v) => v.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellSpec {
    Rnn,
    Gru,
    Lstm,
}

impl From<CellSpec> for Cell {
    fn from(value: CellSpec) -> Self {
        match value {
            CellSpec::Rnn => Cell::Rnn,
            CellSpec::Gru => Cell::Gru,
            CellSpec::Lstm => Cell::Lstm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolSpec {
    Max,
    Avg,
    AdaptiveMax,
    AdaptiveAvg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormSpec {
    Batch,
    Instance,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationSpec {
    Relu,
    Relu6,
    LeakyRelu { negative_slope: f32 },
    Elu { alpha: f32 },
    Prelu { num_parameters: usize },
    Sigmoid,
    Tanh,
    Gelu,
}

impl From<ActivationSpec> for Activation {
    fn from(value: ActivationSpec) -> Self {
        match value {
            ActivationSpec::Relu => Activation::ReLU,
            ActivationSpec::Relu6 => Activation::ReLU6,
            ActivationSpec::LeakyRelu { negative_slope } => Activation::LeakyReLU { negative_slope },
            ActivationSpec::Elu { alpha } => Activation::ELU { alpha },
            ActivationSpec::Prelu { num_parameters } => Activation::PReLU { num_parameters },
            ActivationSpec::Sigmoid => Activation::Sigmoid,
            ActivationSpec::Tanh => Activation::Tanh,
            ActivationSpec::Gelu => Activation::GELU,
        }
    }
}

fn yes() -> bool {
    true
}

fn one() -> usize {
    1
}

/// Serialized form of a `Layer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum LayerSpec {
    Conv {
        in_channels: usize,
        out_channels: usize,
        kernel_size: Vec<usize>,
        #[serde(default)]
        stride: Option<DimsSpec>,
        #[serde(default)]
        padding: Option<DimsSpec>,
        #[serde(default)]
        dilation: Option<DimsSpec>,
        #[serde(default = "one")]
        groups: usize,
        #[serde(default = "yes")]
        bias: bool,
        /// Present for transposed convolutions.
        #[serde(default)]
        output_padding: Option<DimsSpec>,
    },
    Linear {
        in_features: usize,
        out_features: usize,
        #[serde(default = "yes")]
        bias: bool,
    },
    Norm {
        kind: NormSpec,
        num_channels: usize,
        #[serde(default = "one")]
        dims: usize,
        #[serde(default)]
        groups: Option<usize>,
        #[serde(default)]
        affine: Option<bool>,
        #[serde(default)]
        track_running_stats: Option<bool>,
    },
    LayerNorm {
        normalized_shape: Vec<usize>,
        #[serde(default = "yes")]
        elementwise_affine: bool,
    },
    Activation {
        function: ActivationSpec,
    },
    Pool {
        kind: PoolSpec,
        dims: usize,
        /// Kernel size for fixed pools, output size for adaptive ones.
        size: DimsSpec,
        #[serde(default)]
        stride: Option<DimsSpec>,
        #[serde(default)]
        padding: Option<DimsSpec>,
    },
    Upsample {
        #[serde(default)]
        scale_factor: Option<usize>,
        #[serde(default)]
        size: Option<Vec<usize>>,
    },
    Recurrent {
        cell: CellSpec,
        input_size: usize,
        hidden_size: usize,
        #[serde(default = "one")]
        num_layers: usize,
        #[serde(default = "yes")]
        bias: bool,
        #[serde(default)]
        bidirectional: bool,
        #[serde(default)]
        batch_first: bool,
    },
    RecurrentCell {
        cell: CellSpec,
        input_size: usize,
        hidden_size: usize,
        #[serde(default = "yes")]
        bias: bool,
    },
    Attention {
        embed_dim: usize,
        num_heads: usize,
        #[serde(default)]
        kdim: Option<usize>,
        #[serde(default)]
        vdim: Option<usize>,
        #[serde(default = "yes")]
        bias: bool,
        #[serde(default)]
        batch_first: bool,
    },
    Dropout {
        #[serde(default)]
        p: f32,
    },
    Identity,
    Flatten {
        #[serde(default = "one")]
        start_dim: usize,
    },
    Embedding {
        num_embeddings: usize,
        embedding_dim: usize,
    },
    Custom {
        name: String,
        #[serde(default)]
        params: usize,
        #[serde(default)]
        buffers: usize,
        #[serde(default)]
        output: Option<Vec<usize>>,
    },
}

impl LayerSpec {
    /// Builds the layer this spec describes.
    ///
    /// # Errors
    /// Returns `ModelErr::InvalidConfig` for combinations no layer accepts.
    pub fn to_layer(&self) -> Result<Layer> {
        let layer = match self {
            LayerSpec::Conv {
                in_channels,
                out_channels,
                kernel_size,
                stride,
                padding,
                dilation,
                groups,
                bias,
                output_padding,
            } => {
                let dims = kernel_size.len();
                let mut conv = Conv::new(*in_channels, *out_channels, kernel_size)
                    .with_groups(*groups)
                    .with_bias(*bias);
                if let Some(stride) = stride {
                    conv = conv.with_stride(&stride.expand(dims));
                }
                if let Some(padding) = padding {
                    conv = conv.with_padding(&padding.expand(dims));
                }
                if let Some(dilation) = dilation {
                    conv = conv.with_dilation(&dilation.expand(dims));
                }
                if let Some(output_padding) = output_padding {
                    conv = conv.transposed(&output_padding.expand(dims));
                }
                Layer::Conv(conv)
            }
            LayerSpec::Linear {
                in_features,
                out_features,
                bias,
            } => Layer::Linear(Linear::new(*in_features, *out_features, *bias)),
            LayerSpec::Norm {
                kind,
                num_channels,
                dims,
                groups,
                affine,
                track_running_stats,
            } => {
                let mut norm = match (kind, groups) {
                    (NormSpec::Batch, _) => ChannelNorm::batch(*dims, *num_channels),
                    (NormSpec::Instance, _) => ChannelNorm::instance(*dims, *num_channels),
                    (NormSpec::Group, Some(groups)) => ChannelNorm::group(*groups, *num_channels),
                    (NormSpec::Group, None) => {
                        return Err(ModelErr::InvalidConfig(
                            "group norm needs a `groups` field".into(),
                        ));
                    }
                };
                if let Some(affine) = affine {
                    norm = norm.with_affine(*affine);
                }
                if let Some(track) = track_running_stats {
                    norm = norm.with_running_stats(*track);
                }
                Layer::ChannelNorm(norm)
            }
            LayerSpec::LayerNorm {
                normalized_shape,
                elementwise_affine,
            } => Layer::LayerNorm(
                LayerNorm::new(normalized_shape).with_affine(*elementwise_affine),
            ),
            LayerSpec::Activation { function } => Layer::Activation((*function).into()),
            LayerSpec::Pool {
                kind,
                dims,
                size,
                stride,
                padding,
            } => {
                let size = size.expand(*dims);
                let stride = stride.as_ref().map(|s| s.expand(*dims));
                let padding = padding
                    .as_ref()
                    .map_or_else(|| vec![0; *dims], |p| p.expand(*dims));
                Layer::Pool(match kind {
                    PoolSpec::Max => Pool::max(*dims, &size, stride.as_deref(), &padding),
                    PoolSpec::Avg => Pool::avg(*dims, &size, stride.as_deref(), &padding),
                    PoolSpec::AdaptiveMax => Pool::adaptive_max(*dims, &size),
                    PoolSpec::AdaptiveAvg => Pool::adaptive_avg(*dims, &size),
                })
            }
            LayerSpec::Upsample { scale_factor, size } => match (scale_factor, size) {
                (Some(factor), None) => Layer::Upsample(Upsample::Scale(*factor)),
                (None, Some(size)) => Layer::Upsample(Upsample::Size(size.clone())),
                _ => {
                    return Err(ModelErr::InvalidConfig(
                        "upsample needs exactly one of `scale_factor` and `size`".into(),
                    ));
                }
            },
            LayerSpec::Recurrent {
                cell,
                input_size,
                hidden_size,
                num_layers,
                bias,
                bidirectional,
                batch_first,
            } => Layer::Recurrent(
                Recurrent::new((*cell).into(), *input_size, *hidden_size)
                    .with_layers(*num_layers)
                    .with_bias(*bias)
                    .bidirectional(*bidirectional)
                    .batch_first(*batch_first),
            ),
            LayerSpec::RecurrentCell {
                cell,
                input_size,
                hidden_size,
                bias,
            } => Layer::RecurrentCell(RecurrentCell::new(
                (*cell).into(),
                *input_size,
                *hidden_size,
                *bias,
            )),
            LayerSpec::Attention {
                embed_dim,
                num_heads,
                kdim,
                vdim,
                bias,
                batch_first,
            } => {
                let mut mha = MultiheadAttention::new(*embed_dim, *num_heads)
                    .with_bias(*bias)
                    .batch_first(*batch_first);
                if kdim.is_some() || vdim.is_some() {
                    mha = mha.with_kv_dims(
                        kdim.unwrap_or(*embed_dim),
                        vdim.unwrap_or(*embed_dim),
                    );
                }
                Layer::Attention(mha)
            }
            LayerSpec::Dropout { p } => Layer::Dropout { p: *p },
            LayerSpec::Identity => Layer::Identity,
            LayerSpec::Flatten { start_dim } => Layer::Flatten(Flatten::new(*start_dim)),
            LayerSpec::Embedding {
                num_embeddings,
                embedding_dim,
            } => Layer::Embedding(Embedding::new(*num_embeddings, *embedding_dim)),
            LayerSpec::Custom {
                name,
                params,
                buffers,
                output,
            } => {
                let mut custom = Custom::new(name.clone(), *params).with_buffers(*buffers);
                if let Some(output) = output {
                    custom = custom.with_output(output);
                }
                Layer::Custom(custom)
            }
        };

        Ok(layer)
    }
}

/// A layer declaration: its path, whether it trains and what it is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDecl {
    pub path: String,
    #[serde(default = "yes")]
    pub trainable: bool,
    #[serde(flatten)]
    pub layer: LayerSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeSpec {
    Add,
    Concat { axis: usize },
}

impl From<MergeSpec> for Merge {
    fn from(value: MergeSpec) -> Self {
        match value {
            MergeSpec::Add => Merge::Add,
            MergeSpec::Concat { axis } => Merge::Concat { axis },
        }
    }
}

/// Serialized form of a `Node`, layers are referenced by path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeSpec {
    Call(String),
    Seq(Vec<NodeSpec>),
    Residual {
        body: Box<NodeSpec>,
        #[serde(default)]
        shortcut: Option<Box<NodeSpec>>,
    },
    Parallel {
        branches: Vec<NodeSpec>,
        merge: MergeSpec,
    },
    Repeat {
        times: usize,
        body: Box<NodeSpec>,
    },
}

impl NodeSpec {
    fn resolve(&self, ids: &HashMap<&str, LayerId>) -> Result<Node> {
        let node = match self {
            NodeSpec::Call(path) => Node::Call(
                *ids
                    .get(path.as_str())
                    .ok_or_else(|| ModelErr::UnknownLayer(path.clone()))?,
            ),
            NodeSpec::Seq(nodes) => Node::Seq(
                nodes
                    .iter()
                    .map(|n| n.resolve(ids))
                    .collect::<Result<_>>()?,
            ),
            NodeSpec::Residual { body, shortcut } => Node::residual(
                body.resolve(ids)?,
                shortcut.as_ref().map(|s| s.resolve(ids)).transpose()?,
            ),
            NodeSpec::Parallel { branches, merge } => Node::parallel(
                branches
                    .iter()
                    .map(|n| n.resolve(ids))
                    .collect::<Result<Vec<_>>>()?,
                (*merge).into(),
            ),
            NodeSpec::Repeat { times, body } => Node::repeat(*times, body.resolve(ids)?),
        };

        Ok(node)
    }
}

/// Serialized form of a whole `Network`.
///
/// ```json
/// {
///   "layers": [
///     { "path": "fc1", "type": "linear", "in_features": 4, "out_features": 8 },
///     { "path": "act", "type": "activation", "function": "relu" },
///     { "path": "fc2", "type": "linear", "in_features": 8, "out_features": 2 }
///   ],
///   "root": { "seq": [{ "call": "fc1" }, { "call": "act" }, { "call": "fc2" }] }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub layers: Vec<LayerDecl>,
    pub root: NodeSpec,
}

impl NetworkSpec {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a `NetworkSpec` from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Builds the described network.
    ///
    /// # Errors
    /// Returns `ModelErr` if a layer is misconfigured or the root calls an unknown path.
    pub fn build(&self) -> Result<Network> {
        let mut builder = NetworkBuilder::new();
        let mut ids = HashMap::with_capacity(self.layers.len());

        for decl in &self.layers {
            let layer = decl.layer.to_layer().map_err(|e| e.at(&decl.path))?;
            let id = if decl.trainable {
                builder.add(decl.path.clone(), layer)
            } else {
                builder.add_frozen(decl.path.clone(), layer)
            };
            ids.insert(decl.path.as_str(), id);
        }

        let root = self.root.resolve(&ids)?;
        builder.build(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MLP: &str = r#"{
        "layers": [
            { "path": "fc1", "type": "linear", "in_features": 4, "out_features": 8 },
            { "path": "act", "type": "activation", "function": "relu" },
            { "path": "fc2", "type": "linear", "in_features": 8, "out_features": 2, "bias": false }
        ],
        "root": { "seq": [{ "call": "fc1" }, { "call": "act" }, { "call": "fc2" }] }
    }"#;

    #[test]
    fn builds_a_network_from_json() {
        let net = NetworkSpec::from_json_str(MLP).unwrap().build().unwrap();
        assert_eq!(net.layers().len(), 3);
        assert_eq!(net.num_params(), 40 + 16);
        assert_eq!(net.layers()[1].layer().type_name(), "ReLU");
    }

    #[test]
    fn broadcasts_single_extents() {
        let json = r#"{
            "layers": [
                { "path": "conv", "type": "conv", "in_channels": 3, "out_channels": 8,
                  "kernel_size": [3, 3], "stride": 2, "padding": [1, 1], "bias": false },
                { "path": "pool", "type": "pool", "kind": "adaptive_avg", "dims": 2, "size": 1 }
            ],
            "root": { "seq": [{ "call": "conv" }, { "call": "pool" }] }
        }"#;
        let net = NetworkSpec::from_json_str(json).unwrap().build().unwrap();
        assert_eq!(
            net.layers()[0].layer().to_string(),
            "3, 8, kernel_size=(3, 3), stride=(2, 2), padding=(1, 1), bias=False"
        );
        assert_eq!(net.layers()[1].layer().type_name(), "AdaptiveAvgPool2d");
    }

    #[test]
    fn frozen_flag_is_honoured() {
        let json = r#"{
            "layers": [
                { "path": "emb", "type": "embedding", "num_embeddings": 10, "embedding_dim": 4,
                  "trainable": false }
            ],
            "root": { "call": "emb" }
        }"#;
        let net = NetworkSpec::from_json_str(json).unwrap().build().unwrap();
        assert_eq!(net.num_params(), 0);
    }

    #[test]
    fn unknown_paths_are_rejected() {
        let json = r#"{
            "layers": [{ "path": "a", "type": "identity" }],
            "root": { "call": "b" }
        }"#;
        let err = NetworkSpec::from_json_str(json).unwrap().build().unwrap_err();
        assert!(matches!(err, ModelErr::UnknownLayer(path) if path == "b"));
    }

    #[test]
    fn group_norm_requires_groups() {
        let json = r#"{
            "layers": [{ "path": "gn", "type": "norm", "kind": "group", "num_channels": 8 }],
            "root": { "call": "gn" }
        }"#;
        assert!(NetworkSpec::from_json_str(json).unwrap().build().is_err());
    }
}
