use super::outcome::{AggregateResult, DispatchOutcome, InvocationResult};
use super::target::{ExecutionRequest, TargetSelector};
use crate::cluster::{ClusterMembership, MemberForwarder};
use crate::config::DispatcherConfig;
use crate::core::{GridError, Result};
use crate::function::FunctionInvocation;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};
use uuid::Uuid;

/// Routes a function to a set of members, runs it once per member and
/// aggregates the per-member outcomes.
#[derive(Clone)]
pub struct MemberDispatcher {
    forwarder: Arc<dyn MemberForwarder>,
    config: DispatcherConfig,
}

impl MemberDispatcher {
    pub fn new(forwarder: Arc<dyn MemberForwarder>) -> Self {
        Self::with_config(forwarder, DispatcherConfig::default())
    }

    pub fn with_config(forwarder: Arc<dyn MemberForwarder>, config: DispatcherConfig) -> Self {
        Self { forwarder, config }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn forwarder(&self) -> &Arc<dyn MemberForwarder> {
        &self.forwarder
    }

    /// Executes `request` and reports the aggregate with a status.
    ///
    /// Invalid targeting is reported as a rejected outcome before any member is
    /// contacted. A failure on one member becomes a failed entry and never stops
    /// the others.
    pub async fn dispatch(&self, request: ExecutionRequest) -> DispatchOutcome {
        let span = info_span!(
            "dispatch.function",
            execution_id = %Uuid::new_v4(),
            function = %request.function_id
        );
        self.dispatch_inner(request).instrument(span).await
    }

    async fn dispatch_inner(&self, request: ExecutionRequest) -> DispatchOutcome {
        let selector = match request.target() {
            Ok(selector) => selector,
            Err(err) => {
                event!(Level::WARN, error = %err, "dispatch rejected");
                return DispatchOutcome::rejected(err);
            }
        };

        let members = match self.resolve(&selector).await {
            Ok(members) => members,
            Err(err) => {
                event!(Level::ERROR, error = %err, "member resolution failed");
                return DispatchOutcome::rejected(err);
            }
        };
        event!(Level::DEBUG, members = ?members, "dispatch targets resolved");

        let filter = match &selector {
            TargetSelector::KeyFilter(key) => Some(key.clone()),
            _ => None,
        };

        let handles = members
            .iter()
            .map(|member| {
                let forwarder = Arc::clone(&self.forwarder);
                let function_id = request.function_id.clone();
                let invocation = FunctionInvocation::new(member.as_str())
                    .with_arguments(request.arguments.clone())
                    .with_filter(filter.clone());
                let retries = self.config.ha_retry_attempts;
                tokio::spawn(
                    invoke_member(forwarder, function_id, invocation, retries).in_current_span(),
                )
            })
            .collect::<Vec<_>>();

        let aggregate = members
            .iter()
            .zip(join_all(handles).await)
            .map(|(member, joined)| {
                joined.unwrap_or_else(|err| {
                    let err = GridError::ExecutionError(format!("invocation task failed: {}", err));
                    InvocationResult::failed(member.as_str(), &err)
                })
            })
            .collect::<AggregateResult>();

        event!(
            Level::INFO,
            targeted = aggregate.len(),
            succeeded = aggregate.success_count,
            "function dispatched"
        );
        DispatchOutcome::completed(aggregate)
    }

    /// Resolves a selector against the live membership.
    pub async fn resolve(&self, selector: &TargetSelector) -> Result<Vec<String>> {
        match selector {
            TargetSelector::AllMembers => self.forwarder.members().await,
            TargetSelector::Members(names) => Ok(names.clone()),
            TargetSelector::KeyFilter(key) => {
                let membership = ClusterMembership::new(self.forwarder.members().await?)?;
                let owner = membership.owner_of(key).ok_or_else(|| {
                    GridError::ExecutionError(format!(
                        "no member available to own key '{}'",
                        key
                    ))
                })?;
                Ok(vec![owner])
            }
        }
    }

    /// Sorted ids of every function registered on at least one member.
    pub async fn registered_functions(&self) -> Result<Vec<String>> {
        let mut ids = BTreeSet::new();
        for member in self.forwarder.members().await? {
            ids.extend(self.forwarder.function_ids(&member).await?);
        }
        Ok(ids.into_iter().collect())
    }
}

/// Runs one member's invocation, retrying failures of HA functions.
async fn invoke_member(
    forwarder: Arc<dyn MemberForwarder>,
    function_id: String,
    invocation: FunctionInvocation,
    ha_retry_attempts: u32,
) -> InvocationResult {
    let member = invocation.member.clone();
    let mut attempt = 0u32;
    loop {
        let err = match forwarder
            .invoke(&member, &function_id, invocation.clone())
            .await
        {
            Ok(value) => {
                event!(Level::DEBUG, member = %member, attempt, "member invocation succeeded");
                return InvocationResult::succeeded(member, value);
            }
            Err(err) => err,
        };

        let retryable = attempt < ha_retry_attempts
            && !err.is_lookup_failure()
            && err.cancel_cause().is_none()
            && is_ha(forwarder.as_ref(), &member, &function_id).await;
        if !retryable {
            event!(Level::WARN, member = %member, error = %err, "member invocation failed");
            return InvocationResult::failed(member, &err);
        }

        attempt += 1;
        event!(Level::INFO, member = %member, attempt, error = %err, "retrying HA function");
    }
}

async fn is_ha(forwarder: &dyn MemberForwarder, member: &str, function_id: &str) -> bool {
    match forwarder.function_attributes(member, function_id).await {
        Ok(Some(attributes)) => attributes.is_ha,
        _ => false,
    }
}
