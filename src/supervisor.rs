//! Supervised execution of an entry point.
//!
//! The [`ExecutionSupervisor`] is the single place where an entry point is
//! started and where its outcome is observed:
//!
//! ```text
//! invoker.prepare() ──► SupervisedGroup ──► "main" thread ──► ThreadDrain
//!      │                                                          │
//!      └─ configuration errors                 first captured failure ─┘
//! ```
//!
//! Code running inside the group starts further supervised threads with
//! [`spawn`] and [`spawn_background`]. Those threads belong to the caller's
//! group, so the supervisor does not return until they have finished too
//! (background threads excepted).

mod drain;
mod group;

pub use drain::ThreadDrain;
pub use group::{CapturedFailure, ForcedTermination, SupervisedGroup, terminate_current_thread};

use std::io;

use tracing::{debug, info};

use crate::boundary::ResourceSet;
use crate::error::{HarnessError, HarnessResult};
use crate::invoker::EntryPointInvoker;

/// Name of the initial thread of every supervised group.
pub const MAIN_THREAD_NAME: &str = "main";

/// Runs entry points inside supervised groups.
#[derive(Debug, Clone, Default)]
pub struct ExecutionSupervisor {
    group_name: Option<String>,
}

impl ExecutionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the group instead of using the invoker's entry point name.
    pub fn with_group_name(mut self, name: impl Into<String>) -> Self {
        self.group_name = Some(name.into());
        self
    }

    /// Prepares `invoker`, runs it on the `main` thread of a new group with
    /// `boundary` as its isolated boundary, and waits for the group to drain.
    ///
    /// Returns the first failure captured in the group, if any. Nothing is
    /// started when preparation fails.
    pub fn run<I>(&self, invoker: I, boundary: ResourceSet) -> HarnessResult<()>
    where
        I: EntryPointInvoker,
    {
        let group_name = self
            .group_name
            .clone()
            .unwrap_or_else(|| invoker.name().to_string());
        let entry = invoker.prepare()?;

        let group = SupervisedGroup::new(group_name, boundary);
        info!(
            group = group.name(),
            locations = group.boundary().len(),
            "Starting supervised entry point"
        );

        group
            .spawn(MAIN_THREAD_NAME, entry)
            .map_err(HarnessError::Spawn)?;

        ThreadDrain::new(&group).wait();
        debug!(group = group.name(), "Supervised entry point finished");

        match group.take_failure() {
            Some(failure) => Err(HarnessError::Execution(failure)),
            None => Ok(()),
        }
    }
}

/// Starts a foreground thread in the caller's supervised group.
///
/// Fails when the caller is not running inside a group.
pub fn spawn<F>(name: impl Into<String>, body: F) -> io::Result<()>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    current_group()?.spawn(name, body)
}

/// Starts a background thread in the caller's supervised group.
pub fn spawn_background<F>(name: impl Into<String>, body: F) -> io::Result<()>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    current_group()?.spawn_background(name, body)
}

fn current_group() -> io::Result<SupervisedGroup> {
    SupervisedGroup::current()
        .ok_or_else(|| io::Error::other("not running inside a supervised group"))
}
