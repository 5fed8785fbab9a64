use crate::core::GridError;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of running a function on one member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub member: String,
    pub success: bool,
    /// Last result sent by the function, for result-bearing functions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvocationResult {
    pub fn succeeded(member: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            member: member.into(),
            success: true,
            value,
            error: None,
        }
    }

    pub fn failed(member: impl Into<String>, error: &GridError) -> Self {
        Self {
            member: member.into(),
            success: false,
            value: None,
            error: Some(error.to_string()),
        }
    }
}

/// Per-member results of one dispatch, in resolution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub results: Vec<InvocationResult>,
    pub success_count: usize,
}

impl AggregateResult {
    pub fn push(&mut self, result: InvocationResult) {
        if result.success {
            self.success_count += 1;
        }
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &InvocationResult> {
        self.results.iter().filter(|result| !result.success)
    }

    /// Values returned by successful members.
    pub fn values(&self) -> Vec<Value> {
        self.results
            .iter()
            .filter(|result| result.success)
            .filter_map(|result| result.value.clone())
            .collect()
    }
}

impl FromIterator<InvocationResult> for AggregateResult {
    fn from_iter<I: IntoIterator<Item = InvocationResult>>(iter: I) -> Self {
        let mut aggregate = Self::default();
        for result in iter {
            aggregate.push(result);
        }
        aggregate
    }
}

/// What the dispatcher hands back to the transport boundary.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub status: StatusCode,
    pub aggregate: AggregateResult,
    /// Set when the dispatch was refused before any member ran.
    pub error: Option<GridError>,
}

impl DispatchOutcome {
    pub fn completed(aggregate: AggregateResult) -> Self {
        Self {
            status: StatusCode::OK,
            aggregate,
            error: None,
        }
    }

    /// A dispatch that never reached any member.
    pub fn rejected(error: GridError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            aggregate: AggregateResult::default(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn success_count(&self) -> usize {
        self.aggregate.success_count
    }
}
