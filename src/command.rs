//! Command registry boundary.
//!
//! Commands are looked up by a scoped name (`scope:name`, or a bare `name`)
//! in a [`CommandRegistry`]. The registry declares each command's options and
//! materializes executable [`Command`] objects from parsed arguments. The
//! [`CommandResolver`] drives the whole sequence.
//!
//! [`CommandTable`] is an in-process registry built from
//! [`CommandDefinition`]s; the built-in kernel exposes one.

pub mod builtin;
pub mod resolver;
mod table;

pub use resolver::{CommandResolver, ExecutedCommand, ParsedOptions, parse_options, parse_qualified_name};
pub use table::{CommandDefinition, CommandFactory, CommandInvocation, CommandSummary, CommandTable};

use std::collections::HashMap;
use std::error::Error as StdError;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parsed option values keyed by short flag. Flags without a value map to `None`.
pub type OptionValues = HashMap<String, Option<String>>;

/// Errors raised while resolving or running a command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Malformed command name or option syntax.
    #[error("{message}")]
    Argument {
        message: String,
        #[source]
        source: Option<clap::Error>,
    },

    #[error("no command `{0}` is registered")]
    NotFound(String),

    #[error("command name `{0}` matches commands in several scopes")]
    Ambiguous(String),

    #[error("no command registry is available")]
    RegistryUnavailable,

    #[error("command `{name}` failed")]
    Execution {
        name: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },
}

impl CommandError {
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument {
            message: message.into(),
            source: None,
        }
    }
}

/// Declaration of one command option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSpec {
    /// Short flag, also the key of the parsed value.
    pub short: char,
    pub long: Option<String>,
    /// Whether the option requires a value.
    pub takes_value: bool,
    pub description: String,
}

impl OptionSpec {
    /// A flag that takes no value.
    pub fn flag(short: char, long: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            short,
            long: Some(long.into()),
            takes_value: false,
            description: description.into(),
        }
    }

    /// An option that requires a value.
    pub fn value(short: char, long: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            short,
            long: Some(long.into()),
            takes_value: true,
            description: description.into(),
        }
    }

    /// Key under which the parsed value is stored.
    pub fn key(&self) -> String {
        self.short.to_string()
    }

    /// Usage form, e.g. `-s, --scope <value>`.
    pub fn usage(&self) -> String {
        let mut usage = format!("-{}", self.short);
        if let Some(long) = &self.long {
            usage.push_str(", --");
            usage.push_str(long);
        }
        if self.takes_value {
            usage.push_str(" <value>");
        }
        usage
    }
}

/// Execution context handed to a command. The harness passes none.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    pub attributes: serde_json::Map<String, Value>,
}

/// An executable command produced by a registry.
pub trait Command: Send {
    fn execute(&self, context: Option<&CommandContext>) -> anyhow::Result<Value>;

    /// The pretty-printing capability, if the command has one.
    fn pretty(&self) -> Option<&dyn PrettyCommand> {
        None
    }
}

/// Commands that know how to format their own result.
pub trait PrettyCommand {
    fn prettify(&self, result: &Value) -> String;
}

/// Registry of commands addressed by scope and name.
pub trait CommandRegistry: Send + Sync {
    /// Option declarations of the command.
    fn options_info(&self, scope: Option<&str>, name: &str) -> Result<Vec<OptionSpec>, CommandError>;

    /// Materializes the command with its positional arguments and option values.
    fn create_command(
        &self,
        scope: Option<&str>,
        name: &str,
        args: Vec<String>,
        options: OptionValues,
    ) -> Result<Box<dyn Command>, CommandError>;
}

/// Joins a scope and a name into `scope:name`.
pub fn qualified_name(scope: Option<&str>, name: &str) -> String {
    match scope {
        Some(scope) => format!("{scope}:{name}"),
        None => name.to_string(),
    }
}

/// String form of a raw command result. Strings are not quoted.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_option_usage() {
        assert_eq!(OptionSpec::flag('v', "verbose", "").usage(), "-v, --verbose");
        assert_eq!(OptionSpec::value('s', "scope", "").usage(), "-s, --scope <value>");

        let short_only = OptionSpec {
            short: 'x',
            long: None,
            takes_value: false,
            description: String::new(),
        };
        assert_eq!(short_only.usage(), "-x");
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&json!("plain")), "plain");
        assert_eq!(value_to_string(&json!(null)), "null");
        assert_eq!(value_to_string(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn test_qualified_name() {
        assert_eq!(qualified_name(Some("harness"), "boundary"), "harness:boundary");
        assert_eq!(qualified_name(None, "help"), "help");
    }
}
