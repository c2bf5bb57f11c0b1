use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which side of an exchange a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleTarget {
    Request,
    Response,
    #[default]
    Both,
}

impl RuleTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleTarget::Request => "request",
            RuleTarget::Response => "response",
            RuleTarget::Both => "both",
        }
    }
}

impl fmt::Display for RuleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for RuleTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "request" => Ok(RuleTarget::Request),
            "response" => Ok(RuleTarget::Response),
            "both" => Ok(RuleTarget::Both),
            other => Err(format!("unknown rule target '{}'", other)),
        }
    }
}

/// Rule kind for seeds built from a JSON tree selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleKind {
    #[serde(rename = "jsonPath")]
    JsonPath,
}

/// Value type of the replacement carried by a seed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedValueType {
    String,
}

/// A pre-filled rewrite rule handed to the rule-authoring collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSeed {
    pub kind: RuleKind,

    /// Canonical JSON path, starting at `root`
    pub path: String,

    pub value_type: SeedValueType,

    /// Current value at `path` in textual form, empty when absent
    pub value: String,

    pub name: String,

    /// URL pattern the rule should match
    pub url: String,

    pub target: RuleTarget,
}
