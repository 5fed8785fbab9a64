use crate::core::{GridError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request to execute a function somewhere in the cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub function_id: String,
    #[serde(default)]
    pub arguments: Option<Value>,
    /// Single data key; targets the member owning it.
    #[serde(default)]
    pub filter: Option<String>,
    /// Comma-separated member names.
    #[serde(default)]
    pub on_members: Option<String>,
}

impl ExecutionRequest {
    pub fn new(function_id: impl Into<String>) -> Self {
        Self {
            function_id: function_id.into(),
            ..Self::default()
        }
    }

    pub fn on_members(mut self, members: impl Into<String>) -> Self {
        self.on_members = Some(members.into());
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>) -> Self {
        self.filter = Some(key.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = Some(arguments);
        self
    }

    pub fn target(&self) -> Result<TargetSelector> {
        TargetSelector::from_request(self.on_members.as_deref(), self.filter.as_deref())
    }
}

/// Which members a function runs on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetSelector {
    AllMembers,
    /// Exactly these members, in the order given.
    Members(Vec<String>),
    /// The member owning this key.
    KeyFilter(String),
}

impl TargetSelector {
    /// Builds the selector from the raw request parameters.
    ///
    /// A member list and a filter key are mutually exclusive; supplying both is
    /// a client error, even when the member list names nobody. A blank filter
    /// counts as absent, and so does a blank member list without a filter.
    pub fn from_request(on_members: Option<&str>, filter: Option<&str>) -> Result<Self> {
        let filter = filter.map(str::trim).filter(|key| !key.is_empty());

        match (on_members, filter) {
            (Some(raw), Some(key)) => Err(GridError::InvalidTargeting(format!(
                "a member list ('{}') cannot be combined with filter key '{}'",
                raw, key
            ))),
            (None, Some(key)) => Ok(TargetSelector::KeyFilter(key.to_string())),
            (on_members, None) => {
                let members = on_members.map(parse_member_list).unwrap_or_default();
                if members.is_empty() {
                    Ok(TargetSelector::AllMembers)
                } else {
                    Ok(TargetSelector::Members(members))
                }
            }
        }
    }
}

/// Splits a comma-separated member list, trimming names, dropping blanks and
/// keeping the first occurrence of a repeated name.
pub fn parse_member_list(raw: &str) -> Vec<String> {
    let mut members: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|name| !name.is_empty()) {
        if !members.iter().any(|existing| existing == name) {
            members.push(name.to_string());
        }
    }
    members
}
