//! Named layer subsets whose costs are summed apart from the whole network: the stem, the
//! backbone stages and the classifier.

use std::{fs, ops::AddAssign, path::Path};

use serde::{Deserialize, Serialize};

use crate::{FlopsErr, Result};

/// A backbone stage and the path prefixes of the layers it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRule {
    pub name: String,
    pub prefixes: Vec<String>,
}

impl StageRule {
    pub fn new(name: impl Into<String>, prefixes: &[&str]) -> Self {
        Self {
            name: name.into(),
            prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Where a layer ends up once classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    Initial,
    Stage(usize),
    Fc,
}

/// Assigns layers to groups by dotted path prefix.
///
/// A prefix matches a path equal to it or nested under it, so `layer1` matches `layer1.0.conv1`
/// but not `layer10.conv`. Groups are tried in order: initial, the stages, then fc.
///
/// Groups missing from a JSON description are empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRules {
    #[serde(default)]
    pub initial: Vec<String>,
    #[serde(default)]
    pub stages: Vec<StageRule>,
    #[serde(default)]
    pub fc: Vec<String>,
}

impl Default for GroupRules {
    /// ResNet naming: `conv1, bn1, relu, maxpool`, then `layer1` to `layer4`, then `fc`.
    fn default() -> Self {
        Self {
            initial: ["conv1", "bn1", "relu", "maxpool"].map(String::from).to_vec(),
            stages: (1..=4)
                .map(|i| StageRule::new(format!("group{i}"), &[format!("layer{i}").as_str()]))
                .collect(),
            fc: vec!["fc".to_string()],
        }
    }
}

impl GroupRules {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let rules: Self = serde_json::from_str(json)?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<()> {
        let prefixes = self
            .initial
            .iter()
            .chain(self.stages.iter().flat_map(|s| &s.prefixes))
            .chain(&self.fc);

        for prefix in prefixes {
            if prefix.is_empty() || prefix.starts_with('.') || prefix.ends_with('.') {
                return Err(FlopsErr::InvalidInput(format!(
                    "invalid group prefix {prefix:?}"
                )));
            }
        }

        Ok(())
    }

    /// Returns the group of the layer at `path`, if any.
    pub fn classify(&self, path: &str) -> Option<Group> {
        let matches = |prefixes: &[String]| prefixes.iter().any(|p| has_prefix(path, p));

        if matches(&self.initial) {
            return Some(Group::Initial);
        }
        if let Some(i) = self.stages.iter().position(|s| matches(&s.prefixes)) {
            return Some(Group::Stage(i));
        }
        matches(&self.fc).then_some(Group::Fc)
    }
}

fn has_prefix(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

/// Forward MACs, backward MACs and trainable parameters of some set of layers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub forward: u64,
    pub backward: u64,
    pub params: usize,
}

impl AddAssign for Counts {
    fn add_assign(&mut self, rhs: Self) {
        self.forward += rhs.forward;
        self.backward += rhs.backward;
        self.params += rhs.params;
    }
}

/// The counts of a named group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCounts {
    pub name: String,
    #[serde(flatten)]
    pub counts: Counts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resnet_rules_classify_by_dotted_prefix() {
        let rules = GroupRules::default();
        assert_eq!(rules.classify("conv1"), Some(Group::Initial));
        assert_eq!(rules.classify("layer1.0.relu"), Some(Group::Stage(0)));
        assert_eq!(rules.classify("layer4.1.downsample.0"), Some(Group::Stage(3)));
        assert_eq!(rules.classify("fc"), Some(Group::Fc));
        assert_eq!(rules.classify("avgpool"), None);
        assert_eq!(rules.classify("layer10.conv"), None);
        assert_eq!(rules.classify("fcx"), None);
    }

    #[test]
    fn first_matching_group_wins() {
        let rules = GroupRules {
            initial: vec!["stem".into()],
            stages: vec![StageRule::new("body", &["stem", "blocks"])],
            fc: vec!["blocks.head".into()],
        };
        assert_eq!(rules.classify("stem.conv"), Some(Group::Initial));
        assert_eq!(rules.classify("blocks.head"), Some(Group::Stage(0)));
    }

    #[test]
    fn loads_partial_json() {
        let rules = GroupRules::from_json_str(
            r#"{"stages": [{"name": "encoder", "prefixes": ["encoder"]}], "fc": ["head"]}"#,
        )
        .unwrap();
        assert!(rules.initial.is_empty());
        assert_eq!(rules.stages.len(), 1);
        assert_eq!(rules.classify("encoder.layers.3"), Some(Group::Stage(0)));
        assert_eq!(rules.classify("head"), Some(Group::Fc));
    }

    #[test]
    fn rejects_blank_prefixes() {
        let err = GroupRules::from_json_str(r#"{"fc": [""]}"#).unwrap_err();
        assert!(matches!(err, FlopsErr::InvalidInput(_)));
    }
}
