use std::{
    collections::{HashMap, HashSet},
    io::{self, Write},
    str::FromStr,
};

use log::info;
use model::Network;
use serde::Serialize;

use crate::{
    FlopsErr, Result,
    engine::{self, InputConstructor, Profile},
    groups::{Counts, Group, GroupCounts, GroupRules},
    hooks::{CustomHook, HookTable},
    report,
    units::{FlopsUnit, Formatting, ParamUnit},
};

/// The engines able to count a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Per-layer hooks dispatched on every call of a shape trace.
    Pytorch,
}

impl FromStr for Backend {
    type Err = FlopsErr;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pytorch" => Ok(Backend::Pytorch),
            other => Err(FlopsErr::InvalidBackend(other.to_string())),
        }
    }
}

/// Knobs of `get_model_complexity_info`.
pub struct Options<'a> {
    /// Print the per-layer table.
    pub print_per_layer_stat: bool,
    /// Return formatted strings instead of raw counts.
    pub as_strings: bool,
    /// Builds the traced input, a batch of one by default.
    pub input_constructor: Option<InputConstructor>,
    /// Where the per-layer table goes, standard output when `None`.
    pub ost: Option<&'a mut dyn Write>,
    pub verbose: bool,
    /// Layer types counted as zero-op.
    pub ignore_modules: HashSet<String>,
    /// Counting hooks by layer type, taking precedence over the built-in ones.
    pub custom_modules_hooks: HashMap<String, CustomHook>,
    pub backend: String,
    pub flops_units: Option<FlopsUnit>,
    pub param_units: Option<ParamUnit>,
    pub output_precision: usize,
    pub group_rules: GroupRules,
}

impl Default for Options<'_> {
    fn default() -> Self {
        Self {
            print_per_layer_stat: true,
            as_strings: true,
            input_constructor: None,
            ost: None,
            verbose: false,
            ignore_modules: HashSet::new(),
            custom_modules_hooks: HashMap::new(),
            backend: "pytorch".to_string(),
            flops_units: None,
            param_units: None,
            output_precision: 2,
            group_rules: GroupRules::default(),
        }
    }
}

/// Whole-network counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TotalCounts {
    pub forward: u64,
    pub backward: u64,
    pub params: usize,
    /// Trainable parameters of the fc group.
    pub fc_params: usize,
    /// Non-learnable state, e.g. running statistics.
    pub buffers: usize,
}

/// Raw complexity of a network: its totals, the initial group, the stage groups and the fc
/// group. All flops are per sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplexityReport {
    pub total: TotalCounts,
    pub initial: Counts,
    pub stages: Vec<GroupCounts>,
    pub fc: Counts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedTotal {
    pub forward: String,
    pub backward: String,
    pub params: String,
    pub fc_params: String,
    pub buffers: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedCounts {
    pub forward: String,
    pub backward: String,
    pub params: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedGroup {
    pub name: String,
    #[serde(flatten)]
    pub counts: FormattedCounts,
}

/// `ComplexityReport` rendered with units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedReport {
    pub total: FormattedTotal,
    pub initial: FormattedCounts,
    pub stages: Vec<FormattedGroup>,
    pub fc: FormattedCounts,
}

impl ComplexityReport {
    /// Renders every count of this report with `fmt`.
    pub fn to_strings(&self, fmt: Formatting) -> FormattedReport {
        let counts = |c: &Counts| FormattedCounts {
            forward: fmt.flops(c.forward),
            backward: fmt.flops(c.backward),
            params: fmt.params(c.params),
        };

        FormattedReport {
            total: FormattedTotal {
                forward: fmt.flops(self.total.forward),
                backward: fmt.flops(self.total.backward),
                params: fmt.params(self.total.params),
                fc_params: fmt.params(self.total.fc_params),
                buffers: fmt.params(self.total.buffers),
            },
            initial: counts(&self.initial),
            stages: self
                .stages
                .iter()
                .map(|g| FormattedGroup {
                    name: g.name.clone(),
                    counts: counts(&g.counts),
                })
                .collect(),
            fc: counts(&self.fc),
        }
    }

    /// Sums a profile into totals and groups.
    pub fn from_profile(network: &Network, profile: &Profile, rules: &GroupRules) -> Self {
        let group_of = |group: Group| {
            profile.counts(network, |entry| rules.classify(entry.path()) == Some(group))
        };

        let total = profile.total(network);
        let fc = group_of(Group::Fc);
        let stages = rules
            .stages
            .iter()
            .enumerate()
            .map(|(i, rule)| GroupCounts {
                name: rule.name.clone(),
                counts: group_of(Group::Stage(i)),
            })
            .collect();

        Self {
            total: TotalCounts {
                forward: total.forward,
                backward: total.backward,
                params: total.params,
                fc_params: fc.params,
                buffers: network.num_buffers(),
            },
            initial: group_of(Group::Initial),
            stages,
            fc,
        }
    }
}

/// Either projection of a network's complexity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ComplexityInfo {
    Raw(ComplexityReport),
    Formatted(FormattedReport),
}

/// Estimates the MACs and parameters of `network` for inputs of resolution `input_res`.
///
/// # Arguments
/// * `network` - The network to profile.
/// * `input_res` - The resolution of a single sample, without the batch axis.
/// * `options` - Output, hook and grouping options.
///
/// # Returns
/// The raw counts, or their formatted strings when `options.as_strings` is set.
///
/// # Errors
/// Returns `FlopsErr` if `input_res` is empty, the backend is unknown, the network fails to
/// trace or the per-layer table cannot be written.
pub fn get_model_complexity_info(
    network: &Network,
    input_res: &[usize],
    options: Options<'_>,
) -> Result<ComplexityInfo> {
    if input_res.is_empty() {
        return Err(FlopsErr::InvalidInput(
            "the input resolution needs at least one dimension".into(),
        ));
    }
    let backend: Backend = options.backend.parse()?;

    let mut hooks = HookTable::new();
    for type_name in options.ignore_modules {
        hooks.ignore(type_name);
    }
    for (type_name, hook) in options.custom_modules_hooks {
        hooks.insert_custom(type_name, hook);
    }

    let profile = match backend {
        Backend::Pytorch => engine::get_flops(
            network,
            input_res,
            options.input_constructor.as_ref(),
            &hooks,
            options.verbose,
        )?,
    };

    let fmt = Formatting {
        flops_units: options.flops_units,
        param_units: options.param_units,
        precision: options.output_precision,
    };

    if options.print_per_layer_stat {
        match options.ost {
            Some(out) => report::print_model_with_flops(network, &profile, fmt, out)?,
            None => report::print_model_with_flops(network, &profile, fmt, &mut io::stdout())?,
        }
    }

    let report = ComplexityReport::from_profile(network, &profile, &options.group_rules);
    info!(
        "{} forward, {} backward, {} params",
        fmt.flops(report.total.forward),
        fmt.flops(report.total.backward),
        fmt.params(report.total.params)
    );

    if options.as_strings {
        Ok(ComplexityInfo::Formatted(report.to_strings(fmt)))
    } else {
        Ok(ComplexityInfo::Raw(report))
    }
}
