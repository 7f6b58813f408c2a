//! Configuration schema for isolate-run.
//!
//! The configuration carries what a build tool would hand the harness for
//! one invocation: where the application's resources live and what to run.
//!
//! ```text
//! Config (root)
//! ├── HarnessConfig   - Entry point, argument string, group name, child env
//! ├── BoundaryConfig  - Resource dirs, output dir, dependencies
//! └── CommandConfig   - Command strategy: command name, arguments
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::boundary::DEFAULT_ARCHIVE_EXTENSIONS;
use crate::command::builtin::HELP_COMMAND;

/// Root configuration structure.
///
/// # TOML Structure
///
/// ```toml
/// [harness]
/// entry_point = "server"
/// args = "--port 8080"
///
/// [boundary]
/// resource_dirs = ["src/main/resources"]
/// output_dir = "target/classes"
/// dependencies = ["lib/core.jar"]
///
/// [command]
/// name = "help"
/// ```
///
/// # Example
///
/// ```
/// use isolate_run::config::Config;
///
/// let config: Config = toml::from_str(r#"
///     [boundary]
///     output_dir = "target/classes"
/// "#).unwrap();
/// assert!(config.harness.entry_point.is_none());
/// assert_eq!(config.command.name, "help");
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Direct-invoke settings (optional, has defaults).
    #[serde(default)]
    pub harness: HarnessConfig,

    /// Locations making up the isolated boundary.
    pub boundary: BoundaryConfig,

    /// Command strategy settings (optional, has defaults).
    #[serde(default)]
    pub command: CommandConfig,
}

/// What the `run` subcommand launches.
///
/// | Field | Default |
/// |-------|---------|
/// | `entry_point` | None (must be given here or on the command line) |
/// | `args` | `""` |
/// | `group_name` | the entry point name |
/// | `working_dir` | current directory |
/// | `env` | empty |
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HarnessConfig {
    /// Name of the entry point, looked up in the boundary.
    pub entry_point: Option<String>,

    /// Raw argument string, split with shell-like quoting.
    #[serde(default)]
    pub args: String,

    /// Name of the supervised group.
    pub group_name: Option<String>,

    /// Working directory of started executables.
    pub working_dir: Option<PathBuf>,

    /// Extra environment variables for started executables.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Locations of the isolated boundary, in the order they are searched:
/// resource directories, output directory, the harness itself, then
/// dependencies.
///
/// Relative paths are resolved against the working directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BoundaryConfig {
    /// Resource directories. Files also present in `output_dir` are removed
    /// from there when the boundary is built.
    #[serde(default)]
    pub resource_dirs: Vec<PathBuf>,

    /// Compiled output directory.
    pub output_dir: PathBuf,

    /// Dependency files; only those with an archive extension are kept.
    #[serde(default)]
    pub dependencies: Vec<PathBuf>,

    /// Extensions identifying dependency archives.
    ///
    /// Default: `["jar", "zip"]`
    #[serde(default = "default_archive_extensions")]
    pub archive_extensions: Vec<String>,

    /// Whether the harness executable is part of the boundary.
    ///
    /// Default: true
    #[serde(default = "default_include_harness")]
    pub include_harness: bool,
}

fn default_archive_extensions() -> Vec<String> {
    DEFAULT_ARCHIVE_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_include_harness() -> bool {
    true
}

/// What the `cmd` subcommand runs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandConfig {
    /// Command name, `scope:name` or bare.
    ///
    /// Default: `help`
    #[serde(default = "default_command_name")]
    pub name: String,

    /// Raw argument string for the command.
    #[serde(default)]
    pub args: String,

    /// Commands left out of the kernel's registry, as `scope:name`.
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            name: default_command_name(),
            args: String::new(),
            disabled: Vec::new(),
        }
    }
}

fn default_command_name() -> String {
    HELP_COMMAND.to_string()
}
