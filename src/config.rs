//! Configuration loading for isolate-run.
//!
//! The configuration file format is described in the README and in
//! [`schema`]. Values given on the command line override the file.

pub mod schema;

pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result};

use crate::boundary::{BoundaryError, ResourceSet, ResourceSetBuilder};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "isolate-run.toml";

/// Configuration written by `isolate-run init`.
pub const STARTER_CONFIG: &str = r#"# isolate-run configuration

[harness]
# Executable looked up in the boundary, first location wins.
entry_point = "app"
args = ""

[boundary]
resource_dirs = ["resources"]
output_dir = "build"
dependencies = []

[command]
name = "help"
args = ""
"#;

/// Loads configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not match the schema.
///
/// # Example
///
/// ```no_run
/// use isolate_run::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("isolate-run.toml"))?;
/// println!("Output dir: {}", config.boundary.output_dir.display());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Loads configuration from a TOML string.
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    Ok(config)
}

/// Builds the boundary described by `config`, reconciling resource
/// directories against the output directory.
pub fn build_boundary(config: &BoundaryConfig) -> Result<ResourceSet, BoundaryError> {
    let mut builder = ResourceSetBuilder::new()
        .resource_dirs(&config.resource_dirs)
        .output_dir(&config.output_dir)
        .dependencies(&config.dependencies)
        .archive_extensions(&config.archive_extensions);

    if !config.include_harness {
        builder = builder.harness_location(None);
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_minimal_config() {
        let config = load_config_str(
            r#"
            [boundary]
            output_dir = "target/classes"
            "#,
        )
        .unwrap();

        assert_eq!(config.boundary.output_dir, Path::new("target/classes"));
        assert!(config.boundary.resource_dirs.is_empty());
        assert_eq!(config.boundary.archive_extensions, vec!["jar", "zip"]);
        assert!(config.boundary.include_harness);
        assert!(config.harness.entry_point.is_none());
        assert_eq!(config.harness.args, "");
        assert_eq!(config.command.name, "help");
        assert!(config.command.disabled.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = load_config_str(
            r#"
            [harness]
            entry_point = "server"
            args = "--port 8080 'a b'"
            group_name = "web"
            working_dir = "/srv"

            [harness.env]
            MODE = "test"

            [boundary]
            resource_dirs = ["res", "more-res"]
            output_dir = "out"
            dependencies = ["lib/a.jar", "lib/b.so"]
            archive_extensions = ["jar"]
            include_harness = false

            [command]
            name = "harness:boundary"
            args = "-v"
            disabled = ["help"]
            "#,
        )
        .unwrap();

        assert_eq!(config.harness.entry_point.as_deref(), Some("server"));
        assert_eq!(config.harness.group_name.as_deref(), Some("web"));
        assert_eq!(config.harness.env.get("MODE").map(String::as_str), Some("test"));
        assert_eq!(config.boundary.resource_dirs.len(), 2);
        assert!(!config.boundary.include_harness);
        assert_eq!(config.command.name, "harness:boundary");
        assert_eq!(config.command.disabled, vec!["help"]);
    }

    #[test]
    fn test_missing_output_dir_is_rejected() {
        let err = load_config_str("[harness]\nentry_point = \"app\"\n").unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load_config(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().starts_with("Failed to read config file"));
    }

    #[test]
    fn test_starter_config_parses() {
        let config = load_config_str(STARTER_CONFIG).unwrap();
        assert_eq!(config.harness.entry_point.as_deref(), Some("app"));
        assert_eq!(config.boundary.output_dir, Path::new("build"));
    }

    #[test]
    fn test_build_boundary_from_config() {
        let dir = TempDir::new().unwrap();
        let res = dir.path().join("res");
        let out = dir.path().join("out");
        fs::create_dir_all(&res).unwrap();
        fs::create_dir_all(&out).unwrap();
        fs::write(res.join("app.properties"), "live").unwrap();
        fs::write(out.join("app.properties"), "stale").unwrap();

        let config = BoundaryConfig {
            resource_dirs: vec![res.clone()],
            output_dir: out.clone(),
            dependencies: vec![dir.path().join("lib.jar"), dir.path().join("notes.txt")],
            archive_extensions: vec!["jar".to_string()],
            include_harness: false,
        };
        let boundary = build_boundary(&config).unwrap();

        assert_eq!(boundary.locations(), &[res, out.clone(), dir.path().join("lib.jar")]);
        assert!(!out.join("app.properties").exists());
    }
}
