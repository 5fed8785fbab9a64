use crate::core::{GridError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;

/// What a member receives when asked to run a function locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionInvocation {
    /// Name of the member the invocation runs on.
    pub member: String,
    #[serde(default)]
    pub arguments: Option<Value>,
    /// Key whose owning member was targeted, when routed by filter.
    #[serde(default)]
    pub filter: Option<String>,
}

impl FunctionInvocation {
    pub fn new(member: impl Into<String>) -> Self {
        Self {
            member: member.into(),
            ..Self::default()
        }
    }

    pub fn with_arguments(mut self, arguments: Option<Value>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }
}

/// Collects the results a function streams back.
///
/// Any number of [`send_result`](Self::send_result) calls may precede exactly
/// one [`last_result`](Self::last_result); the sender is closed afterwards.
#[derive(Debug, Default)]
pub struct ResultSender {
    state: Mutex<SenderState>,
}

#[derive(Debug, Default)]
struct SenderState {
    values: Vec<Value>,
    closed: bool,
}

impl ResultSender {
    pub fn send_result(&self, value: impl Into<Value>) -> Result<()> {
        self.push(value.into(), false)
    }

    pub fn last_result(&self, value: impl Into<Value>) -> Result<()> {
        self.push(value.into(), true)
    }

    fn push(&self, value: Value, last: bool) -> Result<()> {
        let mut state = self.state.lock()?;
        if state.closed {
            return Err(GridError::InvalidState(
                "result sender already received its last result".to_string(),
            ));
        }
        state.values.push(value);
        state.closed = last;
        Ok(())
    }

    /// Drains the sender: every value sent, and whether a last result arrived.
    fn finish(self) -> Result<(Vec<Value>, bool)> {
        let state = self.state.into_inner()?;
        Ok((state.values, state.closed))
    }
}

/// Execution context handed to a function body.
#[derive(Debug)]
pub struct FunctionContext {
    function_id: String,
    invocation: FunctionInvocation,
    results: ResultSender,
}

impl FunctionContext {
    pub fn new(function_id: impl Into<String>, invocation: FunctionInvocation) -> Self {
        Self {
            function_id: function_id.into(),
            invocation,
            results: ResultSender::default(),
        }
    }

    pub fn function_id(&self) -> &str {
        &self.function_id
    }

    pub fn member(&self) -> &str {
        &self.invocation.member
    }

    pub fn arguments(&self) -> Option<&Value> {
        self.invocation.arguments.as_ref()
    }

    pub fn filter(&self) -> Option<&str> {
        self.invocation.filter.as_deref()
    }

    pub fn result_sender(&self) -> &ResultSender {
        &self.results
    }

    pub(crate) fn into_results(self) -> Result<(Vec<Value>, bool)> {
        self.results.finish()
    }
}
