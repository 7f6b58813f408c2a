//! isolate-run: a supervised entry-point harness.
//!
//! This crate launches an application's entry point inside an isolated
//! execution context nested in the host process, waits for every thread the
//! entry point started to finish, and reports the first failure back to the
//! host.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Boundary**: Ordered, deduplicated locations the entry point resolves from
//! - **Supervisor**: Supervised thread groups, failure capture and draining
//! - **Invoker**: Launch strategies (direct entry point, kernel command)
//! - **Command**: Scoped command resolution and option parsing
//! - **Kernel**: Application kernel boundary and the built-in kernel
//! - **Streams**: Suppression of the process's standard streams
//!
//! # Example
//!
//! ```no_run
//! use isolate_run::boundary::ResourceSetBuilder;
//! use isolate_run::invoker::{DirectInvoker, EntryPointTable};
//! use isolate_run::supervisor::{ExecutionSupervisor, spawn};
//!
//! let boundary = ResourceSetBuilder::new()
//!     .resource_dir("src/main/resources")
//!     .output_dir("target/classes")
//!     .build()?;
//!
//! let entry_points = EntryPointTable::new().register_static("server", |args| {
//!     spawn("listener", move || {
//!         println!("listening with {args:?}");
//!         Ok(())
//!     })?;
//!     Ok(())
//! });
//!
//! ExecutionSupervisor::new().run(
//!     DirectInvoker::new(entry_points, "server", "--port 8080"),
//!     boundary,
//! )?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod boundary;
pub mod command;
pub mod config;
pub mod error;
pub mod invoker;
pub mod kernel;
pub mod report;
pub mod streams;
pub mod supervisor;

// Re-export commonly used types
pub use boundary::{ResourceSet, ResourceSetBuilder};
pub use config::{Config, load_config};
pub use error::{HarnessError, HarnessResult};
pub use invoker::{CommandInvoker, DirectInvoker, EntryPointInvoker, ExecutionRequest};
pub use supervisor::{ExecutionSupervisor, SupervisedGroup};
