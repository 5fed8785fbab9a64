use super::context::{FunctionContext, FunctionInvocation};
use crate::core::{GridError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Body of a registered function.
pub type FunctionBody = Arc<dyn Fn(&FunctionContext) -> Result<()> + Send + Sync>;

/// Execution metadata of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionAttributes {
    /// Callers expect a value back; the body must send a last result.
    pub has_result: bool,
    /// A failed invocation may be retried transparently.
    pub is_ha: bool,
    /// Scheduling hint only.
    pub optimize_for_write: bool,
}

impl Default for FunctionAttributes {
    fn default() -> Self {
        Self {
            has_result: true,
            is_ha: true,
            optimize_for_write: false,
        }
    }
}

/// A named operation that members can execute.
#[derive(Clone)]
pub struct Function {
    id: String,
    attributes: FunctionAttributes,
    body: FunctionBody,
}

impl Function {
    pub fn new<F>(id: impl Into<String>, body: F) -> Self
    where
        F: Fn(&FunctionContext) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            attributes: FunctionAttributes::default(),
            body: Arc::new(body),
        }
    }

    pub fn with_has_result(mut self, has_result: bool) -> Self {
        self.attributes.has_result = has_result;
        self
    }

    pub fn with_ha(mut self, is_ha: bool) -> Self {
        self.attributes.is_ha = is_ha;
        self
    }

    pub fn with_optimize_for_write(mut self, optimize_for_write: bool) -> Self {
        self.attributes.optimize_for_write = optimize_for_write;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn attributes(&self) -> FunctionAttributes {
        self.attributes
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("id", &self.id)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

struct RegisteredFunction {
    function: Function,
    invocations: AtomicU64,
}

/// Per-member mapping from function id to function.
///
/// Populated at member startup and read concurrently afterwards. Ids are
/// matched exactly, so fully-qualified dotted names work as-is.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: RwLock<HashMap<String, Arc<RegisteredFunction>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `function`, replacing any function registered under the same id.
    pub fn register(&self, function: Function) -> Result<()> {
        if function.id.trim().is_empty() {
            return Err(GridError::ExecutionError(
                "function id must not be empty".to_string(),
            ));
        }
        let id = function.id.clone();
        let replaced = self
            .functions
            .write()?
            .insert(
                id.clone(),
                Arc::new(RegisteredFunction {
                    function,
                    invocations: AtomicU64::new(0),
                }),
            )
            .is_some();
        tracing::event!(tracing::Level::DEBUG, function = %id, replaced, "function registered");
        Ok(())
    }

    /// Returns the function registered under exactly `id`, or `None`.
    pub fn lookup(&self, id: &str) -> Result<Option<Function>> {
        Ok(self
            .functions
            .read()?
            .get(id)
            .map(|entry| entry.function.clone()))
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.functions.read()?.contains_key(id))
    }

    /// Sorted ids of every registered function.
    pub fn function_ids(&self) -> Result<Vec<String>> {
        let mut ids = self.functions.read()?.keys().cloned().collect::<Vec<_>>();
        ids.sort();
        Ok(ids)
    }

    /// Number of successful local executions of `id`; zero for unknown ids.
    pub fn invocation_count(&self, id: &str) -> Result<u64> {
        Ok(self
            .functions
            .read()?
            .get(id)
            .map(|entry| entry.invocations.load(Ordering::SeqCst))
            .unwrap_or_default())
    }

    /// Runs function `id` locally and returns its last result.
    ///
    /// The invocation counter grows by one only when the body succeeds and,
    /// for result-bearing functions, has sent its last result.
    pub fn execute(&self, id: &str, invocation: FunctionInvocation) -> Result<Option<Value>> {
        let entry = self
            .functions
            .read()?
            .get(id)
            .cloned()
            .ok_or_else(|| GridError::FunctionNotFound(id.to_string()))?;

        let member = invocation.member.clone();
        let failed = |message: String| GridError::FunctionFailed {
            function: id.to_string(),
            member: member.clone(),
            message,
        };

        let context = FunctionContext::new(id, invocation);
        match (entry.function.body)(&context) {
            Ok(()) => {}
            Err(err @ GridError::Cancelled(_)) => return Err(err),
            Err(err) => return Err(failed(err.to_string())),
        }

        let (mut values, last_sent) = context.into_results()?;
        let has_result = entry.function.attributes.has_result;
        if has_result && !last_sent {
            return Err(failed("function did not send a last result".to_string()));
        }

        entry.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(if has_result { values.pop() } else { None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn always_true(id: &str) -> Function {
        Function::new(id, |ctx| ctx.result_sender().last_result(true))
            .with_ha(false)
    }

    #[test]
    fn register_then_lookup_by_exact_id() {
        let registry = FunctionRegistry::new();
        registry.register(always_true("OnMembersFunction")).unwrap();

        let found = registry.lookup("OnMembersFunction").unwrap().unwrap();
        assert_eq!(found.id(), "OnMembersFunction");
        assert!(found.attributes().has_result);
        assert!(!found.attributes().is_ha);

        assert!(registry.lookup("onmembersfunction").unwrap().is_none());
        assert!(registry.lookup("Unknown").unwrap().is_none());
        assert!(registry.contains("OnMembersFunction").unwrap());
        assert!(!registry.contains("onmembersfunction").unwrap());
    }

    #[test]
    fn empty_id_is_rejected() {
        let registry = FunctionRegistry::new();
        assert!(registry.register(always_true("")).is_err());
        assert!(registry.register(always_true("   ")).is_err());
        assert!(registry.function_ids().unwrap().is_empty());
    }

    #[test]
    fn reregistration_replaces_previous_function() {
        let registry = FunctionRegistry::new();
        registry.register(always_true("f")).unwrap();
        registry
            .register(Function::new("f", |ctx| ctx.result_sender().last_result("v2")))
            .unwrap();

        let value = registry.execute("f", FunctionInvocation::new("m1")).unwrap();
        assert_eq!(value, Some(json!("v2")));
        assert_eq!(registry.function_ids().unwrap(), vec!["f".to_string()]);
    }

    #[test]
    fn execute_keeps_last_of_streamed_results_and_counts() {
        let registry = FunctionRegistry::new();
        registry
            .register(Function::new("stream", |ctx| {
                let sender = ctx.result_sender();
                sender.send_result(1)?;
                sender.send_result(2)?;
                sender.last_result(3)
            }))
            .unwrap();

        for _ in 0..3 {
            let value = registry.execute("stream", FunctionInvocation::new("m1")).unwrap();
            assert_eq!(value, Some(json!(3)));
        }
        assert_eq!(registry.invocation_count("stream").unwrap(), 3);
    }

    #[test]
    fn missing_last_result_fails_without_counting() {
        let registry = FunctionRegistry::new();
        registry
            .register(Function::new("silent", |_| Ok(())))
            .unwrap();
        registry
            .register(Function::new("fire_and_forget", |_| Ok(())).with_has_result(false))
            .unwrap();

        let err = registry
            .execute("silent", FunctionInvocation::new("m1"))
            .unwrap_err();
        assert!(matches!(err, GridError::FunctionFailed { .. }));
        assert_eq!(registry.invocation_count("silent").unwrap(), 0);

        let value = registry
            .execute("fire_and_forget", FunctionInvocation::new("m1"))
            .unwrap();
        assert_eq!(value, None);
        assert_eq!(registry.invocation_count("fire_and_forget").unwrap(), 1);
    }

    #[test]
    fn execute_unknown_function_is_not_found() {
        let registry = FunctionRegistry::new();
        let err = registry.execute("nope", FunctionInvocation::new("m1")).unwrap_err();
        assert!(matches!(err, GridError::FunctionNotFound(id) if id == "nope"));
        assert_eq!(registry.invocation_count("nope").unwrap(), 0);
    }
}
