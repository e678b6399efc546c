//! Prints the MACs and parameters of a network.
//!
//! ```bash
//! # ResNet-18 on 224x224 images with the per-layer table
//! model-profiler --zoo resnet18 --per-layer
//!
//! # A network described in JSON, raw counts as JSON
//! model-profiler --model net.json --input 3,32,32 --raw --json
//! ```

use std::{collections::HashSet, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use flops_counter::{
    ComplexityInfo, FlopsUnit, GroupRules, Options, ParamUnit, get_model_complexity_info,
};
use log::info;
use model::{Network, NetworkSpec, zoo};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ZooModel {
    /// ResNet-18 with 1000 classes, input 3,224,224
    Resnet18,
    /// 784-256-10 perceptron, input 784
    Mlp,
    /// LSTM token classifier, input is the sequence length (32 by default)
    Lstm,
}

impl ZooModel {
    fn default_input(self) -> Vec<usize> {
        match self {
            ZooModel::Resnet18 => vec![3, 224, 224],
            ZooModel::Mlp => vec![784],
            ZooModel::Lstm => vec![32],
        }
    }
}

/// Estimate the MACs and parameters of a layer graph
#[derive(Parser, Debug)]
#[command(name = "model-profiler")]
#[command(version, about, long_about = None)]
struct Args {
    /// Network description (JSON format)
    #[arg(short, long, required_unless_present = "zoo", conflicts_with = "zoo")]
    model: Option<PathBuf>,

    /// Built-in reference network
    #[arg(short, long, value_enum)]
    zoo: Option<ZooModel>,

    /// Resolution of a single sample, without the batch axis [default: 3,224,224, or the
    /// preset's own input]
    #[arg(short, long, value_delimiter = ',')]
    input: Option<Vec<usize>>,

    /// Print the per-layer table
    #[arg(long)]
    per_layer: bool,

    /// Print raw counts instead of formatted ones
    #[arg(long)]
    raw: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Fixed unit for MACs (GMac, MMac, KMac, Mac)
    #[arg(long)]
    flops_units: Option<FlopsUnit>,

    /// Fixed unit for parameters (M, K, plain)
    #[arg(long)]
    param_units: Option<ParamUnit>,

    /// Decimals kept in formatted counts
    #[arg(long, default_value_t = 2)]
    precision: usize,

    /// Layer types counted as zero MACs, comma separated (e.g. BatchNorm2d,ReLU)
    #[arg(long, value_delimiter = ',')]
    ignore: Vec<String>,

    /// Layer group rules (JSON format), ResNet naming by default
    #[arg(short, long)]
    groups: Option<PathBuf>,

    /// Counting backend
    #[arg(long, default_value = "pytorch")]
    backend: String,

    /// Debug logging and zero-op warnings
    #[arg(short, long)]
    verbose: bool,
}

fn load_network(args: &Args) -> Result<Network> {
    if let Some(path) = &args.model {
        info!("loading network from {path:?}");
        let spec = NetworkSpec::load(path).with_context(|| format!("reading {path:?}"))?;
        return Ok(spec.build()?);
    }

    let network = match args.zoo {
        Some(ZooModel::Resnet18) | None => zoo::resnet18(1000),
        Some(ZooModel::Mlp) => zoo::mlp(&[784, 256, 10]),
        Some(ZooModel::Lstm) => zoo::lstm_classifier(10_000, 128, 256, 10),
    };
    Ok(network?)
}

fn input_res(args: &Args) -> Vec<usize> {
    match (&args.input, args.zoo) {
        (Some(input), _) => input.clone(),
        (None, Some(model)) => model.default_input(),
        (None, None) => ZooModel::Resnet18.default_input(),
    }
}

fn print_summary(total: [String; 5], groups: Vec<(String, [String; 3])>) {
    let [forward, backward, params, fc_params, buffers] = total;
    println!("{:<28}{forward}", "Computational complexity:");
    println!("{:<28}{backward}", "Backward complexity:");
    println!("{:<28}{params}", "Number of parameters:");
    println!("{:<28}{fc_params}", "Number of fc parameters:");
    println!("{:<28}{buffers}", "Number of buffers:");

    for (name, [forward, backward, params]) in groups {
        println!("{name:<12}forward {forward:>14}  backward {backward:>14}  params {params:>10}");
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let network = load_network(&args)?;
    let group_rules = match &args.groups {
        Some(path) => GroupRules::load(path).with_context(|| format!("reading {path:?}"))?,
        None => GroupRules::default(),
    };

    let options = Options {
        print_per_layer_stat: args.per_layer,
        as_strings: !args.raw,
        verbose: args.verbose,
        ignore_modules: args.ignore.iter().cloned().collect::<HashSet<_>>(),
        backend: args.backend.clone(),
        flops_units: args.flops_units,
        param_units: args.param_units,
        output_precision: args.precision,
        group_rules,
        ..Default::default()
    };
    let complexity = get_model_complexity_info(&network, &input_res(&args), options)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&complexity)?);
        return Ok(());
    }

    match complexity {
        ComplexityInfo::Formatted(r) => {
            let groups = [("initial".to_string(), r.initial)]
                .into_iter()
                .chain(r.stages.into_iter().map(|g| (g.name, g.counts)))
                .chain([("fc".to_string(), r.fc)])
                .map(|(name, c)| (name, [c.forward, c.backward, c.params]))
                .collect();
            let t = r.total;
            print_summary([t.forward, t.backward, t.params, t.fc_params, t.buffers], groups);
        }
        ComplexityInfo::Raw(r) => {
            let groups = [("initial".to_string(), r.initial)]
                .into_iter()
                .chain(r.stages.into_iter().map(|g| (g.name, g.counts)))
                .chain([("fc".to_string(), r.fc)])
                .map(|(name, c)| {
                    let fields = [c.forward.to_string(), c.backward.to_string(), c.params.to_string()];
                    (name, fields)
                })
                .collect();
            let t = r.total;
            print_summary(
                [
                    t.forward.to_string(),
                    t.backward.to_string(),
                    t.params.to_string(),
                    t.fc_params.to_string(),
                    t.buffers.to_string(),
                ],
                groups,
            );
        }
    }

    Ok(())
}
