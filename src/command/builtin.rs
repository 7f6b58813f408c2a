//! Commands registered by the built-in kernel.

use serde_json::{Value, json};

use super::{
    Command, CommandContext, CommandDefinition, CommandInvocation, CommandSummary, CommandTable,
    OptionSpec, PrettyCommand, qualified_name,
};
use crate::supervisor::SupervisedGroup;

/// Scope of harness-provided commands other than `help`.
pub const HARNESS_SCOPE: &str = "harness";

/// Name of the command run when none is requested.
pub const HELP_COMMAND: &str = "help";

/// A table with `help` and `harness:boundary`.
pub fn default_table() -> CommandTable {
    CommandTable::new()
        .register(help_definition())
        .register(boundary_definition())
}

pub fn help_definition() -> CommandDefinition {
    CommandDefinition::new(HELP_COMMAND, "List available commands", |table, invocation| {
        Box::new(HelpCommand::new(table, &invocation)) as Box<dyn Command>
    })
    .option(OptionSpec::value('s', "scope", "Only list commands of this scope"))
}

pub fn boundary_definition() -> CommandDefinition {
    CommandDefinition::new(
        "boundary",
        "List the isolated execution boundary, in resolution order",
        |_, _| Box::new(BoundaryCommand) as Box<dyn Command>,
    )
    .scoped(HARNESS_SCOPE)
}

/// Lists registered commands with their options.
pub struct HelpCommand {
    commands: Vec<CommandSummary>,
}

impl HelpCommand {
    fn new(table: &CommandTable, invocation: &CommandInvocation) -> Self {
        let scope = invocation.option('s');
        let commands = table
            .summaries()
            .into_iter()
            .filter(|summary| scope.is_none() || summary.scope.as_deref() == scope)
            .collect();
        Self { commands }
    }
}

impl Command for HelpCommand {
    fn execute(&self, _context: Option<&CommandContext>) -> anyhow::Result<Value> {
        Ok(serde_json::to_value(&self.commands)?)
    }

    fn pretty(&self) -> Option<&dyn PrettyCommand> {
        Some(self)
    }
}

impl PrettyCommand for HelpCommand {
    fn prettify(&self, result: &Value) -> String {
        let commands: Vec<CommandSummary> = match serde_json::from_value(result.clone()) {
            Ok(commands) => commands,
            Err(_) => return super::value_to_string(result),
        };

        if commands.is_empty() {
            return "No commands available.".to_string();
        }

        let width = commands
            .iter()
            .map(|c| qualified_name(c.scope.as_deref(), &c.name).len())
            .max()
            .unwrap_or(0);

        let mut lines = vec!["Available commands:".to_string()];
        for command in &commands {
            let name = qualified_name(command.scope.as_deref(), &command.name);
            lines.push(format!("  {name:<width$}  {}", command.description));
            for option in &command.options {
                lines.push(format!("      {:<24}{}", option.usage(), option.description));
            }
        }
        lines.join("\n")
    }
}

/// Lists the boundary of the calling supervised group.
pub struct BoundaryCommand;

impl Command for BoundaryCommand {
    fn execute(&self, _context: Option<&CommandContext>) -> anyhow::Result<Value> {
        let locations: Vec<String> = SupervisedGroup::current()
            .map(|group| {
                group
                    .boundary()
                    .iter()
                    .map(|location| location.display().to_string())
                    .collect()
            })
            .unwrap_or_default();
        Ok(json!(locations))
    }

    fn pretty(&self) -> Option<&dyn PrettyCommand> {
        Some(self)
    }
}

impl PrettyCommand for BoundaryCommand {
    fn prettify(&self, result: &Value) -> String {
        match result.as_array() {
            Some(locations) if !locations.is_empty() => locations
                .iter()
                .map(super::value_to_string)
                .collect::<Vec<_>>()
                .join("\n"),
            _ => "No isolated boundary.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::ResourceSet;
    use crate::command::CommandResolver;
    use crate::supervisor::ThreadDrain;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_help_lists_commands() {
        let executed = CommandResolver::new()
            .resolve(&default_table(), "help", &[])
            .unwrap();

        assert!(executed.output.starts_with("Available commands:"));
        assert!(executed.output.contains("harness:boundary"));
        assert!(executed.output.contains("-s, --scope <value>"));
    }

    #[test]
    fn test_help_scope_filter() {
        let executed = CommandResolver::new()
            .resolve(&default_table(), "help", &["--scope".to_string(), "harness".to_string()])
            .unwrap();

        assert!(executed.output.contains("harness:boundary"));
        assert!(!executed.output.contains("List available commands"));
    }

    #[test]
    fn test_help_unknown_scope() {
        let executed = CommandResolver::new()
            .resolve(&default_table(), "help", &["-s".to_string(), "nope".to_string()])
            .unwrap();

        assert_eq!(executed.output, "No commands available.");
    }

    #[test]
    fn test_boundary_outside_group() {
        let executed = CommandResolver::new()
            .resolve(&default_table(), "harness:boundary", &[])
            .unwrap();

        assert_eq!(executed.output, "No isolated boundary.");
    }

    #[test]
    fn test_boundary_inside_group() {
        let boundary = ResourceSet::from_locations([
            PathBuf::from("/work/resources"),
            PathBuf::from("/work/classes"),
        ]);
        let group = SupervisedGroup::new("app", boundary);
        let output = Arc::new(Mutex::new(String::new()));

        let slot = Arc::clone(&output);
        group
            .spawn("main", move || {
                let executed = CommandResolver::new().resolve(&default_table(), "boundary", &[])?;
                *slot.lock().unwrap() = executed.output;
                Ok(())
            })
            .unwrap();
        ThreadDrain::new(&group).wait();

        assert!(!group.has_failure());
        assert_eq!(*output.lock().unwrap(), "/work/resources\n/work/classes");
    }
}
