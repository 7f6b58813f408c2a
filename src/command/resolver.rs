//! Resolution of scoped command names into executed commands.
//!
//! ```text
//! "scope:name" + args
//!    │
//!    ├─► parse_qualified_name  → (Some("scope"), "name")
//!    ├─► registry.options_info → option declarations
//!    ├─► parse_options         → option values + residual positionals
//!    ├─► registry.create_command
//!    └─► execute(None) → prettify or string form
//! ```

use std::collections::HashSet;

use clap::{Arg, ArgAction};
use tracing::debug;

use super::{CommandError, CommandRegistry, OptionSpec, OptionValues, qualified_name, value_to_string};

/// Argument id collecting everything that is not an option.
const RESIDUAL: &str = "__residual";

/// Options recognized in an argument list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOptions {
    /// Values keyed by short flag; `None` for flags.
    pub values: OptionValues,
    /// Positional arguments, in order.
    pub residual: Vec<String>,
}

/// Result of running a resolved command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedCommand {
    pub scope: Option<String>,
    pub name: String,
    /// Pretty-printed result, or its string form.
    pub output: String,
}

/// Splits `scope:name` on the first `:`. Both parts are trimmed; a bare name
/// has no scope.
pub fn parse_qualified_name(qualified: &str) -> Result<(Option<String>, String), CommandError> {
    if qualified.is_empty() {
        return Err(CommandError::argument("no command name given"));
    }

    let (scope, name) = match qualified.split_once(':') {
        Some((scope, name)) => (Some(scope.trim().to_string()), name.trim().to_string()),
        None => (None, qualified.trim().to_string()),
    };

    if name.is_empty() {
        return Err(CommandError::argument(format!("no command named `{qualified}`")));
    }

    Ok((scope, name))
}

/// Parses `args` against option declarations, POSIX style.
///
/// Unknown options and missing values are syntax errors. Everything that is
/// not an option ends up in [`ParsedOptions::residual`].
pub fn parse_options(specs: &[OptionSpec], args: &[String]) -> Result<ParsedOptions, CommandError> {
    let parser = build_parser(specs)?;
    let matches = parser
        .try_get_matches_from(args)
        .map_err(|e| CommandError::Argument {
            message: "syntax error in arguments".to_string(),
            source: Some(e),
        })?;

    let mut values = OptionValues::new();
    for spec in specs {
        let key = spec.key();
        if spec.takes_value {
            if let Some(value) = matches.get_one::<String>(&key) {
                values.insert(key, Some(value.clone()));
            }
        } else if matches.get_flag(&key) {
            values.insert(key, None);
        }
    }

    let residual = matches
        .get_many::<String>(RESIDUAL)
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    Ok(ParsedOptions { values, residual })
}

fn build_parser(specs: &[OptionSpec]) -> Result<clap::Command, CommandError> {
    let mut shorts = HashSet::new();
    let mut longs = HashSet::new();

    let mut parser = clap::Command::new("command")
        .no_binary_name(true)
        .disable_help_flag(true)
        .disable_version_flag(true)
        .args_override_self(true);

    for spec in specs {
        if !shorts.insert(spec.short) {
            return Err(CommandError::argument(format!("option -{} is declared twice", spec.short)));
        }

        let mut arg = Arg::new(spec.key())
            .short(spec.short)
            .help(spec.description.clone());

        if let Some(long) = &spec.long {
            if !longs.insert(long.clone()) {
                return Err(CommandError::argument(format!("option --{long} is declared twice")));
            }
            arg = arg.long(long.clone());
        }

        arg = if spec.takes_value {
            arg.action(ArgAction::Set).num_args(1)
        } else {
            arg.action(ArgAction::SetTrue)
        };
        parser = parser.arg(arg);
    }

    Ok(parser.arg(Arg::new(RESIDUAL).action(ArgAction::Append).num_args(0..)))
}

/// Resolves, materializes and runs commands from a registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandResolver;

impl CommandResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(
        &self,
        registry: &dyn CommandRegistry,
        qualified: &str,
        args: &[String],
    ) -> Result<ExecutedCommand, CommandError> {
        let (scope, name) = parse_qualified_name(qualified)?;
        let specs = registry.options_info(scope.as_deref(), &name)?;
        let parsed = parse_options(&specs, args)?;

        debug!(
            command = %qualified_name(scope.as_deref(), &name),
            options = parsed.values.len(),
            args = parsed.residual.len(),
            "Running command"
        );

        let command = registry.create_command(scope.as_deref(), &name, parsed.residual, parsed.values)?;
        let result = command.execute(None).map_err(|e| CommandError::Execution {
            name: qualified_name(scope.as_deref(), &name),
            source: e.into(),
        })?;

        let output = match command.pretty() {
            Some(pretty) => pretty.prettify(&result),
            None => value_to_string(&result),
        };

        Ok(ExecutedCommand { scope, name, output })
    }
}
