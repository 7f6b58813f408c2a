//! Entry points found as executables inside the isolated boundary.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::debug;

use super::direct::{EntryPointResolver, Invocable, ResolveError};
use crate::boundary::ResourceSet;

/// Environment variable carrying the boundary, as a platform path list, to
/// executables started by [`BoundaryResolver`].
pub const BOUNDARY_ENV: &str = "ISOLATE_RUN_BOUNDARY";

/// Resolves entry point names against the boundary, first location wins.
///
/// A resolved entry point runs the executable as a child process with the
/// arguments as its argv and the parent's stdio.
#[derive(Debug, Clone)]
pub struct BoundaryResolver {
    boundary: ResourceSet,
    envs: Vec<(String, String)>,
    working_dir: Option<PathBuf>,
}

impl BoundaryResolver {
    pub fn new(boundary: ResourceSet) -> Self {
        Self {
            boundary,
            envs: Vec::new(),
            working_dir: None,
        }
    }

    /// Sets an extra environment variable for started executables.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

impl EntryPointResolver for BoundaryResolver {
    fn resolve(&self, name: &str) -> Result<Invocable, ResolveError> {
        let path = self
            .boundary
            .first_match(name)
            .ok_or_else(|| ResolveError::NotFound(name.to_string()))?;

        if !is_executable(&path) {
            return Err(ResolveError::NotExecutable(path));
        }
        debug!("Entry point {} resolved to {}", name, path.display());

        let launcher = Launcher {
            name: name.to_string(),
            path,
            boundary: self.boundary.clone(),
            envs: self.envs.clone(),
            working_dir: self.working_dir.clone(),
        };
        Ok(Invocable::Static(Arc::new(move |args| launcher.run(args))))
    }
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

struct Launcher {
    name: String,
    path: PathBuf,
    boundary: ResourceSet,
    envs: Vec<(String, String)>,
    working_dir: Option<PathBuf>,
}

impl Launcher {
    fn run(&self, args: Vec<String>) -> anyhow::Result<()> {
        let mut command = Command::new(&self.path);
        command.args(&args);

        if let Some(path_var) = self.boundary.to_path_var() {
            command.env(BOUNDARY_ENV, path_var);
        }
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!("Executing: {} {:?}", self.path.display(), args);
        let status = command
            .status()
            .with_context(|| format!("failed to start {}", self.path.display()))?;

        if !status.success() {
            match status.code() {
                Some(code) => bail!("entry point `{}` exited with code {}", self.name, code),
                None => bail!("entry point `{}` was terminated by a signal", self.name),
            }
        }
        Ok(())
    }
}
