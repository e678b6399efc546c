//! MAC and parameter counting for `model` networks.
//!
//! A network is traced once over shapes. Every layer call is dispatched by type to a counting
//! hook, and the counts are gathered per layer, per group and for the whole network.

pub mod complexity;
pub mod engine;
mod error;
pub mod groups;
pub mod hooks;
pub mod report;
pub mod units;

pub use complexity::{
    Backend, ComplexityInfo, ComplexityReport, FormattedReport, Options, TotalCounts,
    get_model_complexity_info,
};
pub use engine::{InputConstructor, Profile, get_flops};
pub use error::{FlopsErr, Result};
pub use groups::{Counts, GroupCounts, GroupRules, StageRule};
pub use hooks::{CustomHook, HookTable};
pub use report::print_model_with_flops;
pub use units::{FlopsUnit, Formatting, ParamUnit, flops_to_string, params_to_string};
