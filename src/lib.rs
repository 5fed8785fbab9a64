// ============================================================================
// GridCore Library
// ============================================================================
//
// Coordination primitives of an in-memory data grid member:
// - transaction completion hand-off between a coordinator and a dedicated
//   worker thread, with abort and member-shutdown cancellation
// - member-scoped function execution: registration, targeting, fan-out and
//   aggregation across cluster members
//
// ============================================================================

pub mod cluster;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod function;
pub mod transaction;
pub mod web;

// Re-export main types for convenience
pub use cluster::{
    ClusterMember, ClusterMembership, InMemoryMemberForwarder, MemberForwarder, stable_slot_for,
};
pub use config::{DispatcherConfig, GridConfig};
pub use crate::core::{
    CancelCause, CancelCriterion, CancelListener, CancellationSignal, GridError, Result,
};
pub use dispatch::{
    AggregateResult, DispatchOutcome, ExecutionRequest, InvocationResult, MemberDispatcher,
    TargetSelector,
};
pub use function::{
    Function, FunctionAttributes, FunctionContext, FunctionInvocation, FunctionRegistry,
    ResultSender,
};
pub use transaction::{
    CompletionManager, CompletionStatus, CompletionSynchronizer, FirstPhaseOutcome, SyncPhase,
    TransactionId,
};

use std::sync::Arc;

// ============================================================================
// In-process Grid
// ============================================================================

/// A set of members sharing one process, wired to a dispatcher and a
/// transaction completion manager.
///
/// # Examples
///
/// ```
/// use gridcore::{ExecutionRequest, Function, GridConfig, LocalGrid};
///
/// # tokio_test::block_on(async {
/// let grid = LocalGrid::start(GridConfig::new().members(["m1", "m2"])).await?;
/// grid.register_function(Function::new("ping", |ctx| ctx.result_sender().last_result(true)))?;
///
/// let outcome = grid.dispatcher().dispatch(ExecutionRequest::new("ping")).await;
/// assert_eq!(outcome.success_count(), 2);
/// # Ok::<(), gridcore::GridError>(())
/// # }).unwrap();
/// ```
pub struct LocalGrid {
    config: GridConfig,
    members: Vec<Arc<ClusterMember>>,
    forwarder: InMemoryMemberForwarder,
    dispatcher: MemberDispatcher,
    completions: CompletionManager,
}

impl LocalGrid {
    /// Validates `config` and starts one member per configured name.
    pub async fn start(config: GridConfig) -> Result<Self> {
        config.validate()?;

        let forwarder = InMemoryMemberForwarder::new();
        let mut members = Vec::with_capacity(config.members.len());
        for name in &config.members {
            let member = Arc::new(ClusterMember::new(name.as_str())?);
            forwarder.register_member(Arc::clone(&member)).await?;
            members.push(member);
        }

        let dispatcher =
            MemberDispatcher::with_config(Arc::new(forwarder.clone()), config.dispatcher.clone());
        let completions = CompletionManager::with_worker_prefix(
            CancellationSignal::new(),
            config.worker_thread_prefix.as_str(),
        );

        Ok(Self {
            config,
            members,
            forwarder,
            dispatcher,
            completions,
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn members(&self) -> &[Arc<ClusterMember>] {
        &self.members
    }

    pub fn forwarder(&self) -> &InMemoryMemberForwarder {
        &self.forwarder
    }

    pub fn dispatcher(&self) -> &MemberDispatcher {
        &self.dispatcher
    }

    pub fn completions(&self) -> &CompletionManager {
        &self.completions
    }

    /// Registers `function` on every member, as each member does at startup.
    pub fn register_function(&self, function: Function) -> Result<()> {
        for member in &self.members {
            member.register_function(function.clone())?;
        }
        Ok(())
    }

    /// REST router over this grid's dispatcher.
    pub fn router(&self) -> axum::Router {
        web::router(self.dispatcher.clone(), &self.config.url_contexts)
    }

    /// Sum of a function's invocation counters over every member.
    pub async fn invocation_count(&self, function_id: &str) -> Result<u64> {
        self.forwarder.total_invocation_count(function_id).await
    }

    /// Trips the shutdown signal and releases every parked completion worker.
    pub fn shutdown(&self) -> Result<usize> {
        let cause = CancelCause::new(format!(
            "grid members [{}] are shutting down",
            self.config.members.join(",")
        ));
        self.completions.shutdown(cause)
    }
}
