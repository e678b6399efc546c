//! Reference networks, wired the way their usual framework definitions are so that layer paths
//! read the same.

use crate::{
    Result,
    graph::{Network, NetworkBuilder, Node},
    layers::{Cell, Conv, Embedding, Flatten, Layer, Linear, Pool, Recurrent},
};

fn conv3x3(in_channels: usize, out_channels: usize, stride: usize) -> Layer {
    Layer::Conv(
        Conv::new(in_channels, out_channels, &[3, 3])
            .with_stride(&[stride])
            .with_padding(&[1])
            .with_bias(false),
    )
}

fn conv1x1(in_channels: usize, out_channels: usize, stride: usize) -> Layer {
    Layer::Conv(
        Conv::new(in_channels, out_channels, &[1, 1])
            .with_stride(&[stride])
            .with_bias(false),
    )
}

/// A ResNet basic block. Its ReLU is called twice, once inside the residual body and once after
/// the sum.
fn basic_block(
    b: &mut NetworkBuilder,
    prefix: &str,
    in_channels: usize,
    out_channels: usize,
    stride: usize,
) -> Node {
    let conv1 = b.add(format!("{prefix}.conv1"), conv3x3(in_channels, out_channels, stride));
    let bn1 = b.add(format!("{prefix}.bn1"), Layer::batch_norm2d(out_channels));
    let relu = b.add(format!("{prefix}.relu"), Layer::relu());
    let conv2 = b.add(format!("{prefix}.conv2"), conv3x3(out_channels, out_channels, 1));
    let bn2 = b.add(format!("{prefix}.bn2"), Layer::batch_norm2d(out_channels));

    let shortcut = (stride != 1 || in_channels != out_channels).then(|| {
        let conv = b.add(
            format!("{prefix}.downsample.0"),
            conv1x1(in_channels, out_channels, stride),
        );
        let bn = b.add(
            format!("{prefix}.downsample.1"),
            Layer::batch_norm2d(out_channels),
        );
        Node::chain([conv, bn])
    });

    Node::seq([
        Node::residual(Node::chain([conv1, bn1, relu, conv2, bn2]), shortcut),
        Node::Call(relu),
    ])
}

/// ResNet-18 for `(3, H, W)` images.
///
/// The stem is `conv1, bn1, relu, maxpool`, the four stages are `layer1` to `layer4` and the
/// classifier is `fc`.
pub fn resnet18(num_classes: usize) -> Result<Network> {
    let mut b = NetworkBuilder::new();

    let conv1 = b.add(
        "conv1",
        Layer::Conv(
            Conv::new(3, 64, &[7, 7])
                .with_stride(&[2])
                .with_padding(&[3])
                .with_bias(false),
        ),
    );
    let bn1 = b.add("bn1", Layer::batch_norm2d(64));
    let relu = b.add("relu", Layer::relu());
    let maxpool = b.add("maxpool", Layer::Pool(Pool::max(2, &[3], Some(&[2]), &[1])));

    let mut program = vec![Node::chain([conv1, bn1, relu, maxpool])];
    let mut in_channels = 64;
    for (stage, out_channels) in [64, 128, 256, 512].into_iter().enumerate() {
        let stride = if stage == 0 { 1 } else { 2 };
        for block in 0..2 {
            let prefix = format!("layer{}.{block}", stage + 1);
            let block_stride = if block == 0 { stride } else { 1 };
            program.push(basic_block(
                &mut b,
                &prefix,
                in_channels,
                out_channels,
                block_stride,
            ));
            in_channels = out_channels;
        }
    }

    let avgpool = b.add("avgpool", Layer::Pool(Pool::adaptive_avg(2, &[1])));
    let flatten = b.add("flatten", Layer::Flatten(Flatten::default()));
    let fc = b.add("fc", Layer::linear(512, num_classes));
    program.push(Node::chain([avgpool, flatten, fc]));

    b.build(Node::Seq(program))
}

/// A multi layer perceptron with ReLUs between its `Linear` layers, which live at
/// `layers.0`, `layers.2`, and so on.
pub fn mlp(sizes: &[usize]) -> Result<Network> {
    let mut b = NetworkBuilder::new();
    let mut ids = Vec::new();

    for (i, pair) in sizes.windows(2).enumerate() {
        if i > 0 {
            ids.push(b.add(format!("layers.{}", 2 * i - 1), Layer::relu()));
        }
        ids.push(b.add(
            format!("layers.{}", 2 * i),
            Layer::Linear(Linear::new(pair[0], pair[1], true)),
        ));
    }

    b.build(Node::chain(ids))
}

/// A token classifier: `embedding`, a batch-first `lstm` and a per-token `fc` head.
pub fn lstm_classifier(
    vocab: usize,
    embedding_dim: usize,
    hidden_size: usize,
    num_classes: usize,
) -> Result<Network> {
    let mut b = NetworkBuilder::new();

    let embedding = b.add(
        "embedding",
        Layer::Embedding(Embedding::new(vocab, embedding_dim)),
    );
    let lstm = b.add(
        "lstm",
        Layer::Recurrent(
            Recurrent::new(Cell::Lstm, embedding_dim, hidden_size).batch_first(true),
        ),
    );
    let fc = b.add("fc", Layer::linear(hidden_size, num_classes));

    b.build(Node::chain([embedding, lstm, fc]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::{LayerEntry, LayerId},
        shape::{Shape, shape},
    };

    #[test]
    fn resnet18_has_the_reference_parameter_count() {
        let net = resnet18(1000).unwrap();
        assert_eq!(net.num_params(), 11_689_512);
    }

    #[test]
    fn resnet18_maps_images_to_logits() {
        let net = resnet18(10).unwrap();
        let mut calls = 0;
        let mut hook = |_: LayerId, _: &LayerEntry, _: &Shape, _: &Shape| -> Result<()> {
            calls += 1;
            Ok(())
        };
        let y = net.trace(&shape(&[1, 3, 224, 224]), &mut hook).unwrap();
        assert_eq!(y, shape(&[1, 10]));
        // 4 stem + 8 blocks * 6 calls + 3 downsample blocks * 2 + 3 head
        assert_eq!(calls, 4 + 8 * 6 + 3 * 2 + 3);
    }

    #[test]
    fn mlp_interleaves_activations() {
        let net = mlp(&[784, 128, 10]).unwrap();
        let paths: Vec<&str> = net.layers().iter().map(|e| e.path()).collect();
        assert_eq!(paths, ["layers.0", "layers.1", "layers.2"]);
        assert_eq!(net.num_params(), 784 * 128 + 128 + 128 * 10 + 10);
    }

    #[test]
    fn lstm_classifier_tags_every_token() {
        let net = lstm_classifier(1000, 32, 64, 5).unwrap();
        let mut noop = |_: LayerId, _: &LayerEntry, _: &Shape, _: &Shape| -> Result<()> {
            Ok(())
        };
        let y = net.trace(&shape(&[2, 12]), &mut noop).unwrap();
        assert_eq!(y, shape(&[2, 12, 5]));
    }
}
