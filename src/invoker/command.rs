//! Running one command from a kernel's registry.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, warn};

use super::{EntryPointInvoker, ExecutionRequest, PreparedEntry, tokenize};
use crate::command::{CommandError, CommandResolver, ExecutedCommand, builtin::HELP_COMMAND};
use crate::error::HarnessResult;
use crate::kernel::{Kernel, KernelBootstrap};
use crate::streams::{StreamRedirector, SuppressedStreams};

/// Boots a kernel, runs a command and prints its formatted result on the
/// original stdout while the process streams are suppressed.
///
/// Failures are printed on the original stderr and never reach the
/// supervisor.
pub struct CommandInvoker {
    bootstrap: Arc<dyn KernelBootstrap>,
    command: String,
    args: Vec<String>,
    streams: StreamRedirector,
}

impl CommandInvoker {
    /// Runs `help` with no arguments on the process streams.
    pub fn new(bootstrap: Arc<dyn KernelBootstrap>) -> Self {
        Self {
            bootstrap,
            command: HELP_COMMAND.to_string(),
            args: Vec::new(),
            streams: StreamRedirector::process(),
        }
    }

    /// Uses the request's entry point as the command name and its argument
    /// string as the command arguments.
    pub fn from_request(bootstrap: Arc<dyn KernelBootstrap>, request: &ExecutionRequest) -> HarnessResult<Self> {
        let args = request.tokenize_args()?;
        Ok(Self::new(bootstrap).with_command(request.entry_point.clone(), args))
    }

    pub fn with_command(mut self, name: impl Into<String>, args: Vec<String>) -> Self {
        self.command = name.into();
        self.args = args;
        self
    }

    pub fn with_streams(mut self, streams: StreamRedirector) -> Self {
        self.streams = streams;
        self
    }

    /// Same as [`with_command`](Self::with_command) with a raw argument string.
    pub fn with_command_line(self, name: impl Into<String>, args: &str) -> HarnessResult<Self> {
        let args = tokenize(args)?;
        Ok(self.with_command(name, args))
    }
}

impl EntryPointInvoker for CommandInvoker {
    fn name(&self) -> &str {
        &self.command
    }

    fn prepare(self) -> HarnessResult<PreparedEntry> {
        let Self {
            bootstrap,
            command,
            args,
            streams,
        } = self;

        Ok(Box::new(move || {
            let suppressed = streams.suppress()?;
            match run_command(bootstrap.as_ref(), &command, &args) {
                Ok(executed) => print_output(&suppressed, &executed),
                Err(e) => print_failure(&suppressed, &e),
            }
            Ok(())
        }))
    }
}

fn print_output(streams: &SuppressedStreams, executed: &ExecutedCommand) {
    let mut out = streams.stdout();
    if let Err(e) = write!(out, "\n\n{}\n\n", executed.output).and_then(|_| out.flush()) {
        warn!("Failed to print command output: {}", e);
    }
}

fn print_failure(streams: &SuppressedStreams, error: &anyhow::Error) {
    let mut err = streams.stderr();
    if let Err(e) = writeln!(err, "{error:?}") {
        warn!("Failed to print command failure: {}", e);
    }
}

/// Creates, starts and stops a kernel around one command.
fn run_command(bootstrap: &dyn KernelBootstrap, command: &str, args: &[String]) -> anyhow::Result<ExecutedCommand> {
    let configuration = bootstrap.new_configuration();
    let mut kernel = bootstrap
        .create_kernel(configuration)
        .context("failed to create the kernel")?;

    let result = execute_in(kernel.as_mut(), command, args);

    if let Err(e) = kernel.stop() {
        warn!("Failed to stop the kernel: {}", e);
    }
    result
}

fn execute_in(kernel: &mut dyn Kernel, command: &str, args: &[String]) -> anyhow::Result<ExecutedCommand> {
    kernel.init()?;
    kernel.start()?;

    let registry = kernel
        .dependency_context()?
        .command_registry()
        .ok_or(CommandError::RegistryUnavailable)?;

    debug!(command, "Resolving command");
    Ok(CommandResolver::new().resolve(registry.as_ref(), command, args)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::ResourceSet;
    use crate::command::CommandTable;
    use crate::kernel::{BuiltinBootstrap, DependencyContext, KernelConfiguration, KernelError};
    use crate::supervisor::ExecutionSupervisor;
    use std::fs::{self, File};
    use std::os::fd::AsRawFd;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::NamedTempFile;

    struct Capture {
        out: NamedTempFile,
        err: NamedTempFile,
        _out_handle: File,
        _err_handle: File,
        redirector: StreamRedirector,
    }

    impl Capture {
        fn new() -> Self {
            let out = NamedTempFile::new().unwrap();
            let err = NamedTempFile::new().unwrap();
            let out_handle = out.reopen().unwrap();
            let err_handle = err.reopen().unwrap();
            let redirector = StreamRedirector::for_descriptors(out_handle.as_raw_fd(), err_handle.as_raw_fd());
            Self {
                out,
                err,
                _out_handle: out_handle,
                _err_handle: err_handle,
                redirector,
            }
        }

        fn stdout(&self) -> String {
            fs::read_to_string(self.out.path()).unwrap()
        }

        fn stderr(&self) -> String {
            fs::read_to_string(self.err.path()).unwrap()
        }
    }

    /// A bootstrap whose kernel fails to start and records being stopped.
    struct FailingBootstrap {
        stopped: Arc<AtomicBool>,
    }

    struct FailingKernel {
        stopped: Arc<AtomicBool>,
    }

    impl KernelBootstrap for FailingBootstrap {
        fn new_configuration(&self) -> KernelConfiguration {
            KernelConfiguration::new()
        }

        fn create_kernel(&self, _configuration: KernelConfiguration) -> Result<Box<dyn Kernel>, KernelError> {
            Ok(Box::new(FailingKernel {
                stopped: Arc::clone(&self.stopped),
            }))
        }
    }

    impl Kernel for FailingKernel {
        fn init(&mut self) -> Result<(), KernelError> {
            Ok(())
        }

        fn start(&mut self) -> Result<(), KernelError> {
            Err(KernelError::lifecycle("start", anyhow::anyhow!("database unreachable")))
        }

        fn stop(&mut self) -> Result<(), KernelError> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn dependency_context(&self) -> Result<&dyn DependencyContext, KernelError> {
            unreachable!("kernel never starts")
        }
    }

    fn run(invoker: CommandInvoker) {
        ExecutionSupervisor::new()
            .run(invoker, ResourceSet::default())
            .unwrap();
    }

    #[test]
    fn test_default_command_is_help() {
        let capture = Capture::new();
        run(CommandInvoker::new(Arc::new(BuiltinBootstrap::new())).with_streams(capture.redirector.clone()));

        let stdout = capture.stdout();
        assert!(stdout.starts_with("\n\nAvailable commands:"));
        assert!(stdout.ends_with("\n\n"));
        assert!(capture.stderr().is_empty());
    }

    #[test]
    fn test_named_command_with_arguments() {
        let capture = Capture::new();
        let invoker = CommandInvoker::new(Arc::new(BuiltinBootstrap::new()))
            .with_command_line("help", "--scope harness")
            .unwrap()
            .with_streams(capture.redirector.clone());
        run(invoker);

        let stdout = capture.stdout();
        assert!(stdout.contains("harness:boundary"));
        assert!(!stdout.contains("List available commands"));
    }

    #[test]
    fn test_unknown_command_goes_to_stderr_without_failing() {
        let capture = Capture::new();
        let invoker = CommandInvoker::new(Arc::new(BuiltinBootstrap::with_table(CommandTable::new())))
            .with_command("nope", Vec::new())
            .with_streams(capture.redirector.clone());
        run(invoker);

        assert!(capture.stdout().is_empty());
        assert!(capture.stderr().contains("no command `nope` is registered"));
    }

    #[test]
    fn test_kernel_stopped_after_failed_start() {
        let capture = Capture::new();
        let stopped = Arc::new(AtomicBool::new(false));
        let bootstrap = FailingBootstrap {
            stopped: Arc::clone(&stopped),
        };
        run(CommandInvoker::new(Arc::new(bootstrap)).with_streams(capture.redirector.clone()));

        assert!(stopped.load(Ordering::SeqCst));
        let stderr = capture.stderr();
        assert!(stderr.contains("kernel failed to start"));
        assert!(stderr.contains("database unreachable"));
    }

    #[test]
    fn test_from_request_tokenizes_arguments() {
        let request = ExecutionRequest::new("help", "-s 'harness'", ResourceSet::default());
        let invoker = CommandInvoker::from_request(Arc::new(BuiltinBootstrap::new()), &request).unwrap();

        assert_eq!(invoker.name(), "help");
        assert_eq!(invoker.args, vec!["-s", "harness"]);
    }

    #[test]
    fn test_streams_already_held_fails_the_run() {
        let capture = Capture::new();
        let _held = capture.redirector.suppress().unwrap();

        let err = ExecutionSupervisor::new()
            .run(
                CommandInvoker::new(Arc::new(BuiltinBootstrap::new())).with_streams(capture.redirector.clone()),
                ResourceSet::default(),
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "unable to execute the requested entry point");
    }
}
