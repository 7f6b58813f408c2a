//! Harness error taxonomy.
//!
//! Every failure the harness reports to its caller is a [`HarnessError`].
//! Errors raised *inside* the isolated entry point never cross back as typed
//! errors: they reach the caller only as [`HarnessError::Execution`], wrapping
//! the first [`CapturedFailure`] of the supervised group.
//!
//! | Variant | Raised | Threads started? |
//! |---------|--------|------------------|
//! | `Construction` | building the boundary | no |
//! | `Configuration` | resolving the entry point | no |
//! | `Arguments` | tokenizing the argument string | no |
//! | `Spawn` | starting the `main` thread | no |
//! | `Execution` | after drain, if a member failed | yes |

use crate::boundary::BoundaryError;
use crate::supervisor::CapturedFailure;

/// Result alias for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// The execution boundary could not be built.
    #[error("unable to build the execution boundary")]
    Construction(#[from] BoundaryError),

    /// The entry point exists but cannot be invoked as required.
    #[error("{0}")]
    Configuration(String),

    /// The raw argument string could not be tokenized.
    #[error("invalid arguments: {0}")]
    Arguments(String),

    /// The initial supervised thread could not be started.
    #[error("unable to start the supervised thread")]
    Spawn(#[source] std::io::Error),

    /// A thread of the supervised group failed.
    #[error("unable to execute the requested entry point")]
    Execution(#[source] CapturedFailure),
}

impl HarnessError {
    /// True for errors detected before any supervised thread was started.
    pub fn is_preflight(&self) -> bool {
        !matches!(self, Self::Execution(_))
    }
}
