//! Application kernel boundary.
//!
//! The command strategy does not know how an application is assembled. It
//! talks to a [`KernelBootstrap`], which produces a default configuration and
//! a [`Kernel`]; once started, the kernel's [`DependencyContext`] hands out
//! the [`CommandRegistry`].
//!
//! [`builtin`] provides an in-process kernel serving the harness's own
//! commands.

pub mod builtin;

pub use builtin::{BuiltinBootstrap, BuiltinKernel};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::command::CommandRegistry;

/// Errors raised by a kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("kernel cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: KernelState,
    },

    #[error("kernel failed to {operation}")]
    Lifecycle {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl KernelError {
    pub fn lifecycle(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Lifecycle { operation, source }
    }
}

/// Lifecycle state of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelState {
    Created,
    Initialized,
    Started,
    Stopped,
}

impl fmt::Display for KernelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Started => "started",
            Self::Stopped => "stopped",
        };
        f.write_str(state)
    }
}

/// Key/value parameters a kernel is created with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelConfiguration {
    params: BTreeMap<String, String>,
}

impl KernelConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Creates configurations and kernels.
pub trait KernelBootstrap: Send + Sync {
    fn new_configuration(&self) -> KernelConfiguration;

    fn create_kernel(&self, configuration: KernelConfiguration) -> Result<Box<dyn Kernel>, KernelError>;
}

/// An application kernel.
pub trait Kernel: Send {
    fn init(&mut self) -> Result<(), KernelError>;

    fn start(&mut self) -> Result<(), KernelError>;

    fn stop(&mut self) -> Result<(), KernelError>;

    /// Dependency context of a started kernel.
    fn dependency_context(&self) -> Result<&dyn DependencyContext, KernelError>;
}

/// Source of application services.
pub trait DependencyContext {
    fn command_registry(&self) -> Option<Arc<dyn CommandRegistry>>;
}
