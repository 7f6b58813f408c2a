//! Direct invocation of a named entry point.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use super::{EntryPointInvoker, ExecutionRequest, PreparedEntry, tokenize};
use crate::error::{HarnessError, HarnessResult};

/// An entry point callable without an instance: it receives the tokenized
/// arguments and nothing else.
pub type EntryPointFn = Arc<dyn Fn(Vec<String>) -> anyhow::Result<()> + Send + Sync>;

/// What a name resolved to.
#[derive(Clone)]
pub enum Invocable {
    Static(EntryPointFn),
    /// Found, but only usable through an instance the harness cannot create.
    Instance { description: String },
}

impl fmt::Debug for Invocable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(_) => f.write_str("Static(..)"),
            Self::Instance { description } => f
                .debug_struct("Instance")
                .field("description", description)
                .finish(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("entry point `{0}` cannot be found")]
    NotFound(String),

    #[error("entry point `{}` is not executable", .0.display())]
    NotExecutable(PathBuf),
}

/// Looks entry points up by name.
pub trait EntryPointResolver {
    fn resolve(&self, name: &str) -> Result<Invocable, ResolveError>;
}

impl<R: EntryPointResolver + ?Sized> EntryPointResolver for Arc<R> {
    fn resolve(&self, name: &str) -> Result<Invocable, ResolveError> {
        (**self).resolve(name)
    }
}

/// Entry points registered in-process, by name.
#[derive(Debug, Clone, Default)]
pub struct EntryPointTable {
    entries: HashMap<String, Invocable>,
}

impl EntryPointTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_static<F>(mut self, name: impl Into<String>, entry: F) -> Self
    where
        F: Fn(Vec<String>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Invocable::Static(Arc::new(entry)));
        self
    }

    pub fn register_instance(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.entries.insert(
            name.into(),
            Invocable::Instance {
                description: description.into(),
            },
        );
        self
    }
}

impl EntryPointResolver for EntryPointTable {
    fn resolve(&self, name: &str) -> Result<Invocable, ResolveError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(name.to_string()))
    }
}

/// Resolves an entry point and calls it with the tokenized arguments.
#[derive(Debug, Clone)]
pub struct DirectInvoker<R> {
    resolver: R,
    entry_point: String,
    args: String,
}

impl<R: EntryPointResolver> DirectInvoker<R> {
    pub fn new(resolver: R, entry_point: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            resolver,
            entry_point: entry_point.into(),
            args: args.into(),
        }
    }

    pub fn from_request(resolver: R, request: &ExecutionRequest) -> Self {
        Self::new(resolver, request.entry_point.clone(), request.args.clone())
    }
}

impl<R: EntryPointResolver> EntryPointInvoker for DirectInvoker<R> {
    fn name(&self) -> &str {
        &self.entry_point
    }

    fn prepare(self) -> HarnessResult<PreparedEntry> {
        let invocable = self
            .resolver
            .resolve(&self.entry_point)
            .map_err(|e| HarnessError::Configuration(e.to_string()))?;

        let entry = match invocable {
            Invocable::Static(entry) => entry,
            Invocable::Instance { description } => {
                debug!(entry_point = %self.entry_point, %description, "Refusing instance entry point");
                return Err(HarnessError::Configuration(format!(
                    "entry point `{}` is not static",
                    self.entry_point
                )));
            }
        };

        let args = tokenize(&self.args)?;
        debug!(entry_point = %self.entry_point, args = args.len(), "Entry point resolved");

        Ok(Box::new(move || entry(args)))
    }
}
