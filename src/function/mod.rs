//! Member-local function registration and execution.

pub mod context;
pub mod registry;

pub use context::{FunctionContext, FunctionInvocation, ResultSender};
pub use registry::{Function, FunctionAttributes, FunctionBody, FunctionRegistry};
