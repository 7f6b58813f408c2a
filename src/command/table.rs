//! In-process command registry.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{Command, CommandError, CommandRegistry, OptionSpec, OptionValues, qualified_name};

/// Arguments a command is materialized with.
#[derive(Debug, Clone, Default)]
pub struct CommandInvocation {
    pub args: Vec<String>,
    pub options: OptionValues,
}

impl CommandInvocation {
    /// Value of option `short`, if it was given with a value.
    pub fn option(&self, short: char) -> Option<&str> {
        self.options
            .get(&short.to_string())
            .and_then(|value| value.as_deref())
    }

    /// True if option `short` was given.
    pub fn has_option(&self, short: char) -> bool {
        self.options.contains_key(&short.to_string())
    }
}

/// Builds a command from the table it is registered in and its arguments.
pub type CommandFactory =
    Arc<dyn Fn(&CommandTable, CommandInvocation) -> Box<dyn Command> + Send + Sync>;

/// A registered command.
#[derive(Clone)]
pub struct CommandDefinition {
    scope: Option<String>,
    name: String,
    description: String,
    options: Vec<OptionSpec>,
    factory: CommandFactory,
}

impl fmt::Debug for CommandDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDefinition")
            .field("scope", &self.scope)
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl CommandDefinition {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&CommandTable, CommandInvocation) -> Box<dyn Command> + Send + Sync + 'static,
    {
        Self {
            scope: None,
            name: name.into(),
            description: description.into(),
            options: Vec::new(),
            factory: Arc::new(factory),
        }
    }

    pub fn scoped(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn option(mut self, option: OptionSpec) -> Self {
        self.options.push(option);
        self
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualified_name(&self) -> String {
        qualified_name(self.scope(), &self.name)
    }

    fn summary(&self) -> CommandSummary {
        CommandSummary {
            scope: self.scope.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            options: self.options.clone(),
        }
    }
}

/// Serializable description of a registered command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSummary {
    pub scope: Option<String>,
    pub name: String,
    pub description: String,
    pub options: Vec<OptionSpec>,
}

/// A [`CommandRegistry`] backed by a list of definitions.
///
/// A bare name (no scope) matches an unscoped command first, then the single
/// command of that name in any scope.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    definitions: Vec<CommandDefinition>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a definition, replacing any command with the same scoped name.
    pub fn register(mut self, definition: CommandDefinition) -> Self {
        self.definitions
            .retain(|d| !(d.scope == definition.scope && d.name == definition.name));
        self.definitions.push(definition);
        self
    }

    /// Keeps only the definitions matching `keep`.
    pub fn retain(mut self, keep: impl Fn(&CommandDefinition) -> bool) -> Self {
        self.definitions.retain(|d| keep(d));
        self
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Summaries of all commands, sorted by scoped name.
    pub fn summaries(&self) -> Vec<CommandSummary> {
        let mut summaries: Vec<_> = self.definitions.iter().map(|d| d.summary()).collect();
        summaries.sort_by_key(|s| qualified_name(s.scope.as_deref(), &s.name));
        summaries
    }

    pub fn find(&self, scope: Option<&str>, name: &str) -> Result<&CommandDefinition, CommandError> {
        if let Some(definition) = self
            .definitions
            .iter()
            .find(|d| d.scope.as_deref() == scope && d.name == name)
        {
            return Ok(definition);
        }

        if scope.is_none() {
            let mut candidates = self.definitions.iter().filter(|d| d.name == name);
            if let Some(first) = candidates.next() {
                if candidates.next().is_some() {
                    return Err(CommandError::Ambiguous(name.to_string()));
                }
                return Ok(first);
            }
        }

        Err(CommandError::NotFound(qualified_name(scope, name)))
    }
}

impl CommandRegistry for CommandTable {
    fn options_info(&self, scope: Option<&str>, name: &str) -> Result<Vec<OptionSpec>, CommandError> {
        Ok(self.find(scope, name)?.options.clone())
    }

    fn create_command(
        &self,
        scope: Option<&str>,
        name: &str,
        args: Vec<String>,
        options: OptionValues,
    ) -> Result<Box<dyn Command>, CommandError> {
        let definition = self.find(scope, name)?;
        Ok((definition.factory)(self, CommandInvocation { args, options }))
    }
}
