//! Strategies for turning a request into something the supervisor can run.
//!
//! An [`EntryPointInvoker`] is prepared once, on the caller's thread. All
//! resolution happens in [`EntryPointInvoker::prepare`], so configuration
//! errors are reported before any supervised thread exists. The returned
//! [`PreparedEntry`] is what runs on the group's `main` thread.
//!
//! Two strategies are provided:
//!
//! - [`DirectInvoker`] resolves a named entry point through an
//!   [`EntryPointResolver`] and calls it with the request's arguments.
//! - [`CommandInvoker`] boots a kernel, runs one command from its registry
//!   and prints the formatted result.

mod command;
mod direct;
mod executable;

pub use command::CommandInvoker;
pub use direct::{DirectInvoker, EntryPointFn, EntryPointResolver, EntryPointTable, Invocable, ResolveError};
pub use executable::{BOUNDARY_ENV, BoundaryResolver};

use crate::boundary::ResourceSet;
use crate::error::{HarnessError, HarnessResult};

/// Work ready to run on the `main` thread of a supervised group.
pub type PreparedEntry = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// A launch strategy.
pub trait EntryPointInvoker {
    /// Entry point name; also the default name of the supervised group.
    fn name(&self) -> &str;

    /// Resolves everything needed to run, without running it.
    fn prepare(self) -> HarnessResult<PreparedEntry>;
}

/// What to launch and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub entry_point: String,
    /// Raw argument string, split with shell-like quoting.
    pub args: String,
    pub boundary: ResourceSet,
}

impl ExecutionRequest {
    pub fn new(entry_point: impl Into<String>, args: impl Into<String>, boundary: ResourceSet) -> Self {
        Self {
            entry_point: entry_point.into(),
            args: args.into(),
            boundary,
        }
    }

    pub fn tokenize_args(&self) -> HarnessResult<Vec<String>> {
        tokenize(&self.args)
    }
}

/// Splits a raw argument string the way a POSIX shell would, without
/// expansion.
pub fn tokenize(args: &str) -> HarnessResult<Vec<String>> {
    shell_words::split(args).map_err(|e| HarnessError::Arguments(e.to_string()))
}
