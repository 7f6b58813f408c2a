//! In-process kernel serving the harness's own commands.

use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, info};

use super::{DependencyContext, Kernel, KernelBootstrap, KernelConfiguration, KernelError, KernelState};
use crate::command::{CommandRegistry, CommandTable, builtin, parse_qualified_name};

/// Configuration key naming the kernel in logs.
pub const KERNEL_NAME_KEY: &str = "kernel.name";

/// Configuration key listing commands (comma separated, `scope:name`) to
/// leave out of the registry.
pub const DISABLED_COMMANDS_KEY: &str = "commands.disabled";

/// Bootstraps [`BuiltinKernel`]s over a command table.
#[derive(Debug, Clone)]
pub struct BuiltinBootstrap {
    table: CommandTable,
    params: Vec<(String, String)>,
}

impl Default for BuiltinBootstrap {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinBootstrap {
    /// A bootstrap serving `help` and `harness:boundary`.
    pub fn new() -> Self {
        Self::with_table(builtin::default_table())
    }

    pub fn with_table(table: CommandTable) -> Self {
        Self {
            table,
            params: Vec::new(),
        }
    }

    /// Adds a parameter to every configuration this bootstrap creates.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

impl KernelBootstrap for BuiltinBootstrap {
    fn new_configuration(&self) -> KernelConfiguration {
        self.params.iter().fold(
            KernelConfiguration::new().param(KERNEL_NAME_KEY, env!("CARGO_PKG_NAME")),
            |configuration, (key, value)| configuration.param(key.as_str(), value.as_str()),
        )
    }

    fn create_kernel(&self, configuration: KernelConfiguration) -> Result<Box<dyn Kernel>, KernelError> {
        Ok(Box::new(BuiltinKernel::new(configuration, self.table.clone())))
    }
}

/// A kernel whose dependency context holds a [`CommandTable`].
///
/// Lifecycle: `init` then `start`; `stop` is accepted in any state.
pub struct BuiltinKernel {
    configuration: KernelConfiguration,
    state: KernelState,
    table: CommandTable,
    context: Option<BuiltinContext>,
}

impl BuiltinKernel {
    pub fn new(configuration: KernelConfiguration, table: CommandTable) -> Self {
        Self {
            configuration,
            state: KernelState::Created,
            table,
            context: None,
        }
    }

    pub fn state(&self) -> KernelState {
        self.state
    }

    fn name(&self) -> &str {
        self.configuration.get(KERNEL_NAME_KEY).unwrap_or("builtin")
    }

    fn expect_state(&self, expected: KernelState, operation: &'static str) -> Result<(), KernelError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(KernelError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn enabled_table(&self) -> anyhow::Result<CommandTable> {
        let Some(disabled) = self.configuration.get(DISABLED_COMMANDS_KEY) else {
            return Ok(self.table.clone());
        };

        let mut excluded = Vec::new();
        for entry in disabled.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (scope, name) = parse_qualified_name(entry)?;
            let definition = self
                .table
                .find(scope.as_deref(), &name)
                .map_err(|_| anyhow!("cannot disable unknown command `{entry}`"))?;
            debug!("Command {} disabled by configuration", definition.qualified_name());
            excluded.push(definition.qualified_name());
        }

        Ok(self
            .table
            .clone()
            .retain(|definition| !excluded.contains(&definition.qualified_name())))
    }
}

impl Kernel for BuiltinKernel {
    fn init(&mut self) -> Result<(), KernelError> {
        self.expect_state(KernelState::Created, "initialize")?;
        let table = self
            .enabled_table()
            .map_err(|e| KernelError::lifecycle("initialize", e))?;
        self.context = Some(BuiltinContext {
            registry: Arc::new(table),
        });
        self.state = KernelState::Initialized;
        debug!("Kernel {} initialized", self.name());
        Ok(())
    }

    fn start(&mut self) -> Result<(), KernelError> {
        self.expect_state(KernelState::Initialized, "start")?;
        self.state = KernelState::Started;
        info!("Kernel {} started", self.name());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), KernelError> {
        if self.state != KernelState::Stopped {
            self.context = None;
            self.state = KernelState::Stopped;
            debug!("Kernel {} stopped", self.name());
        }
        Ok(())
    }

    fn dependency_context(&self) -> Result<&dyn DependencyContext, KernelError> {
        self.expect_state(KernelState::Started, "provide its dependency context")?;
        self.context
            .as_ref()
            .map(|context| context as &dyn DependencyContext)
            .ok_or(KernelError::InvalidState {
                operation: "provide its dependency context",
                state: self.state,
            })
    }
}

struct BuiltinContext {
    registry: Arc<CommandTable>,
}

impl DependencyContext for BuiltinContext {
    fn command_registry(&self) -> Option<Arc<dyn CommandRegistry>> {
        Some(self.registry.clone() as Arc<dyn CommandRegistry>)
    }
}
