use std::{fmt, str::FromStr};

use crate::{FlopsErr, Result};

/// Fixed unit for printing MAC counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlopsUnit {
    GMac,
    MMac,
    KMac,
    Mac,
}

impl FlopsUnit {
    fn scale(self) -> u64 {
        match self {
            FlopsUnit::GMac => 1_000_000_000,
            FlopsUnit::MMac => 1_000_000,
            FlopsUnit::KMac => 1_000,
            FlopsUnit::Mac => 1,
        }
    }

    /// The largest unit `flops` holds at least one whole of.
    fn fitting(flops: u64) -> Self {
        [FlopsUnit::GMac, FlopsUnit::MMac, FlopsUnit::KMac]
            .into_iter()
            .find(|unit| flops / unit.scale() > 0)
            .unwrap_or(FlopsUnit::Mac)
    }
}

impl fmt::Display for FlopsUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlopsUnit::GMac => "GMac",
            FlopsUnit::MMac => "MMac",
            FlopsUnit::KMac => "KMac",
            FlopsUnit::Mac => "Mac",
        };
        write!(f, "{name}")
    }
}

impl FromStr for FlopsUnit {
    type Err = FlopsErr;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GMac" => Ok(FlopsUnit::GMac),
            "MMac" => Ok(FlopsUnit::MMac),
            "KMac" => Ok(FlopsUnit::KMac),
            "Mac" => Ok(FlopsUnit::Mac),
            other => Err(FlopsErr::InvalidInput(format!(
                "unknown flops unit {other}, expected GMac, MMac, KMac or Mac"
            ))),
        }
    }
}

/// Fixed unit for printing parameter counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamUnit {
    /// Millions, printed as `M`.
    M,
    /// Thousands, printed as `k` when picked automatically and `K` when fixed.
    K,
    /// The bare integer.
    Plain,
}

impl ParamUnit {
    fn fitting(params: usize) -> Self {
        if params / 1_000_000 > 0 {
            ParamUnit::M
        } else if params / 1_000 > 0 {
            ParamUnit::K
        } else {
            ParamUnit::Plain
        }
    }
}

impl FromStr for ParamUnit {
    type Err = FlopsErr;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "M" => Ok(ParamUnit::M),
            "K" | "k" => Ok(ParamUnit::K),
            "plain" | "" => Ok(ParamUnit::Plain),
            other => Err(FlopsErr::InvalidInput(format!(
                "unknown param unit {other}, expected M, K or plain"
            ))),
        }
    }
}

/// Rounds `value` to `precision` decimals and prints it with the shortest tail, keeping at
/// least one decimal: `1.8`, `2.0`, `11.69`.
fn rounded(value: f64, precision: usize) -> String {
    let fixed = format!("{value:.precision$}");
    if !fixed.contains('.') {
        return format!("{fixed}.0");
    }

    let trimmed = fixed.trim_end_matches('0');
    if trimmed.ends_with('.') {
        format!("{trimmed}0")
    } else {
        trimmed.to_string()
    }
}

/// Formats a MAC count.
///
/// # Arguments
/// * `flops` - The amount of multiply-accumulate operations.
/// * `units` - A fixed unit, or `None` to pick the largest one the value reaches.
/// * `precision` - Decimals kept after rounding.
///
/// # Returns
/// The count with its unit, e.g. `1.82 GMac`. Plain `Mac` counts print the integer.
pub fn flops_to_string(flops: u64, units: Option<FlopsUnit>, precision: usize) -> String {
    let unit = units.unwrap_or_else(|| FlopsUnit::fitting(flops));
    match unit {
        FlopsUnit::Mac => format!("{flops} Mac"),
        unit => {
            let value = flops as f64 / unit.scale() as f64;
            format!("{} {unit}", rounded(value, precision))
        }
    }
}

/// Formats a parameter count as `11.69 M`, `2.5 k` or the bare integer.
pub fn params_to_string(params: usize, units: Option<ParamUnit>, precision: usize) -> String {
    let thousands = if units.is_some() { "K" } else { "k" };
    match units.unwrap_or_else(|| ParamUnit::fitting(params)) {
        ParamUnit::M => format!("{} M", rounded(params as f64 / 1e6, precision)),
        ParamUnit::K => format!("{} {thousands}", rounded(params as f64 / 1e3, precision)),
        ParamUnit::Plain => params.to_string(),
    }
}

/// How counts are printed: fixed units, or `None` for automatic ones, and decimals kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Formatting {
    pub flops_units: Option<FlopsUnit>,
    pub param_units: Option<ParamUnit>,
    pub precision: usize,
}

impl Default for Formatting {
    fn default() -> Self {
        Self {
            flops_units: None,
            param_units: None,
            precision: 2,
        }
    }
}

impl Formatting {
    pub fn flops(&self, flops: u64) -> String {
        flops_to_string(flops, self.flops_units, self.precision)
    }

    pub fn params(&self, params: usize) -> String {
        params_to_string(params, self.param_units, self.precision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_largest_reached_unit() {
        assert_eq!(flops_to_string(1_822_177_768, None, 2), "1.82 GMac");
        assert_eq!(flops_to_string(513_000, None, 2), "513.0 KMac");
        assert_eq!(flops_to_string(2_000_000, None, 2), "2.0 MMac");
        assert_eq!(flops_to_string(999, None, 2), "999 Mac");
        assert_eq!(flops_to_string(0, None, 2), "0 Mac");
    }

    #[test]
    fn honours_fixed_units_and_precision() {
        assert_eq!(
            flops_to_string(1_822_177_768, Some(FlopsUnit::MMac), 3),
            "1822.178 MMac"
        );
        assert_eq!(flops_to_string(1_822_177_768, Some(FlopsUnit::GMac), 0), "2.0 GMac");
        assert_eq!(flops_to_string(1_234, Some(FlopsUnit::Mac), 2), "1234 Mac");
    }

    #[test]
    fn formats_params() {
        assert_eq!(params_to_string(11_689_512, None, 2), "11.69 M");
        assert_eq!(params_to_string(2_500, None, 2), "2.5 k");
        assert_eq!(params_to_string(999, None, 2), "999");
        assert_eq!(params_to_string(11_689_512, Some(ParamUnit::K), 1), "11689.5 K");
        assert_eq!(params_to_string(2_500, Some(ParamUnit::K), 2), "2.5 K");
        assert_eq!(params_to_string(11_689_512, Some(ParamUnit::Plain), 2), "11689512");
    }

    #[test]
    fn parses_unit_names() {
        assert_eq!("MMac".parse::<FlopsUnit>().unwrap(), FlopsUnit::MMac);
        assert_eq!("k".parse::<ParamUnit>().unwrap(), ParamUnit::K);
        assert!("TMac".parse::<FlopsUnit>().is_err());
    }
}
