//! Cluster-wide function dispatch.
//!
//! A request names a function and optionally a member list or a single filter
//! key. The dispatcher validates the targeting mode, fans the function out to
//! the resolved members and aggregates what they return.

pub mod dispatcher;
pub mod outcome;
pub mod target;

pub use dispatcher::MemberDispatcher;
pub use outcome::{AggregateResult, DispatchOutcome, InvocationResult};
pub use target::{ExecutionRequest, TargetSelector, parse_member_list};
