//! Execution boundary construction.
//!
//! The boundary is the ordered list of locations (directories and archives)
//! an entry point is allowed to resolve code and resources from. Order is
//! significant: when the same logical resource exists in several locations,
//! the first location wins.
//!
//! ```text
//! resource dirs (declared order)
//!   └─► compiled output dir
//!         └─► harness location
//!               └─► dependency archives (declared order)
//! ```
//!
//! Building the boundary reconciles every resource directory against the
//! compiled output directory: writable files in the output directory that
//! shadow a file of the same relative path in a resource directory are
//! deleted, so the entry point never sees a stale copy next to the live one.
//!
//! # Example
//!
//! ```no_run
//! use isolate_run::boundary::ResourceSetBuilder;
//!
//! let boundary = ResourceSetBuilder::new()
//!     .resource_dir("src/main/resources")
//!     .output_dir("target/classes")
//!     .dependency("lib/runtime.jar")
//!     .build()?;
//!
//! for location in boundary.iter() {
//!     println!("{}", location.display());
//! }
//! # Ok::<(), isolate_run::boundary::BoundaryError>(())
//! ```

use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::debug;

/// Errors raised while building a [`ResourceSet`].
#[derive(Debug, thiserror::Error)]
pub enum BoundaryError {
    /// A location could not be turned into an absolute path.
    #[error("invalid location `{}`: {reason}", path.display())]
    InvalidLocation { path: PathBuf, reason: String },

    /// No compiled output directory was configured.
    #[error("no output directory configured")]
    MissingOutputDir,
}

/// Default archive extensions accepted as dependencies.
pub const DEFAULT_ARCHIVE_EXTENSIONS: &[&str] = &["jar", "zip"];

/// Ordered, deduplicated list of absolute locations forming an isolated
/// execution boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResourceSet {
    locations: Vec<PathBuf>,
}

impl ResourceSet {
    /// Creates a boundary from already-absolute locations, dropping duplicates.
    pub fn from_locations(locations: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut set = Self::default();
        for location in locations {
            set.push(location);
        }
        set
    }

    fn push(&mut self, location: PathBuf) {
        if self.locations.contains(&location) {
            debug!("Skipping duplicate boundary location {}", location.display());
            return;
        }
        self.locations.push(location);
    }

    pub fn locations(&self) -> &[PathBuf] {
        &self.locations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.locations.iter()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Joins the locations into a platform path list (`a:b:c` on Unix).
    ///
    /// Returns `None` if a location contains the platform separator.
    pub fn to_path_var(&self) -> Option<OsString> {
        std::env::join_paths(&self.locations).ok()
    }

    /// Finds the first location providing `relative`.
    ///
    /// Directory locations match when `location/relative` exists. File
    /// locations (archives, executables) match on their file name or, for
    /// single-component names, on their file stem.
    ///
    /// Names that are absolute or climb out of a location (`..`, `.`) never
    /// match.
    pub fn first_match(&self, relative: &str) -> Option<PathBuf> {
        if !is_contained(relative) {
            debug!("Rejecting entry {:?}: not a relative path inside the boundary", relative);
            return None;
        }

        self.locations.iter().find_map(|location| {
            if location.is_dir() {
                let candidate = location.join(relative);
                return candidate.exists().then_some(candidate);
            }

            let name = location.file_name()?.to_str()?;
            let stem = location.file_stem()?.to_str()?;
            (location.is_file() && (name == relative || stem == relative))
                .then(|| location.clone())
        })
    }
}

/// True when `relative` is non-empty and made of plain names only.
fn is_contained(relative: &str) -> bool {
    let path = Path::new(relative);
    path.components().next().is_some()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

impl<'a> IntoIterator for &'a ResourceSet {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Builder for a [`ResourceSet`].
///
/// See the [module documentation](self) for ordering rules and the
/// reconciliation side effect of [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct ResourceSetBuilder {
    resource_dirs: Vec<PathBuf>,
    output_dir: Option<PathBuf>,
    harness_location: Option<PathBuf>,
    dependencies: Vec<PathBuf>,
    archive_extensions: Vec<String>,
}

impl Default for ResourceSetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSetBuilder {
    /// Creates a builder whose harness location is the running executable.
    pub fn new() -> Self {
        Self {
            resource_dirs: Vec::new(),
            output_dir: None,
            harness_location: std::env::current_exe().ok(),
            dependencies: Vec::new(),
            archive_extensions: DEFAULT_ARCHIVE_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }

    pub fn resource_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resource_dirs.push(dir.into());
        self
    }

    pub fn resource_dirs<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.resource_dirs.extend(dirs.into_iter().map(Into::into));
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Overrides the harness location. `None` leaves it out of the boundary.
    pub fn harness_location(mut self, location: Option<PathBuf>) -> Self {
        self.harness_location = location;
        self
    }

    pub fn dependency(mut self, file: impl Into<PathBuf>) -> Self {
        self.dependencies.push(file.into());
        self
    }

    pub fn dependencies<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.dependencies.extend(files.into_iter().map(Into::into));
        self
    }

    /// Replaces the accepted dependency archive extensions (without the dot).
    pub fn archive_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.archive_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Builds the boundary.
    ///
    /// Reconciles each resource directory against the output directory
    /// before any location is recorded. This deletes files from the output
    /// directory. A resource directory that is the output directory itself
    /// is left alone.
    pub fn build(self) -> Result<ResourceSet, BoundaryError> {
        let output_dir = absolute(self.output_dir.as_ref().ok_or(BoundaryError::MissingOutputDir)?)?;
        let mut set = ResourceSet::default();

        for dir in &self.resource_dirs {
            let dir = absolute(dir)?;
            if dir == output_dir {
                debug!("Resource dir {} is the output dir, not reconciling", dir.display());
            } else {
                remove_duplicates_from_output(&output_dir, &dir);
            }
            set.push(dir);
        }

        set.push(output_dir);

        if let Some(location) = &self.harness_location {
            set.push(absolute(location)?);
        }

        for file in &self.dependencies {
            if !self.is_archive(file) {
                debug!("Skipping non-archive dependency {}", file.display());
                continue;
            }
            set.push(absolute(file)?);
        }

        debug!("Built execution boundary with {} locations", set.len());
        Ok(set)
    }

    fn is_archive(&self, file: &Path) -> bool {
        file.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.archive_extensions.iter().any(|allowed| allowed == ext))
    }
}

fn absolute(path: &Path) -> Result<PathBuf, BoundaryError> {
    if path.as_os_str().is_empty() {
        return Err(BoundaryError::InvalidLocation {
            path: path.to_path_buf(),
            reason: "path is empty".to_string(),
        });
    }

    std::path::absolute(path).map_err(|e| BoundaryError::InvalidLocation {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Deletes from `output_dir` every writable file that also exists, at the
/// same relative path, under `origin_dir`. Directories are recursed into and
/// kept. Anything that cannot be removed is left in place.
pub fn remove_duplicates_from_output(output_dir: &Path, origin_dir: &Path) {
    let Ok(entries) = fs::read_dir(origin_dir) else {
        return;
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let target = output_dir.join(&name);

        let Ok(metadata) = fs::symlink_metadata(&target) else {
            continue;
        };
        if metadata.permissions().readonly() {
            debug!("Keeping read-only duplicate {}", target.display());
            continue;
        }

        if metadata.is_dir() {
            remove_duplicates_from_output(&target, &origin_dir.join(&name));
        } else if let Err(e) = fs::remove_file(&target) {
            debug!("Unable to remove duplicate {}: {}", target.display(), e);
        } else {
            debug!("Removed duplicate {}", target.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_boundary_order() {
        let temp = TempDir::new().unwrap();
        let res_a = temp.path().join("res-a");
        let res_b = temp.path().join("res-b");
        let classes = temp.path().join("classes");
        let harness = temp.path().join("harness");
        let dep_1 = temp.path().join("lib/one.jar");
        let dep_2 = temp.path().join("lib/two.zip");

        let set = ResourceSetBuilder::new()
            .resource_dirs([&res_a, &res_b])
            .output_dir(&classes)
            .harness_location(Some(harness.clone()))
            .dependencies([&dep_1, &dep_2])
            .build()
            .unwrap();

        assert_eq!(
            set.locations(),
            &[res_a, res_b, classes, harness, dep_1, dep_2]
        );
    }

    #[test]
    fn test_non_archive_dependencies_are_skipped() {
        let temp = TempDir::new().unwrap();
        let set = ResourceSetBuilder::new()
            .output_dir(temp.path().join("classes"))
            .harness_location(None)
            .dependencies([temp.path().join("a.jar"), temp.path().join("a.pom")])
            .build()
            .unwrap();

        assert_eq!(set.len(), 2);
        assert!(set.locations()[1].ends_with("a.jar"));
    }

    #[test]
    fn test_duplicates_keep_first_position() {
        let temp = TempDir::new().unwrap();
        let classes = temp.path().join("classes");

        let set = ResourceSetBuilder::new()
            .resource_dir(&classes)
            .output_dir(&classes)
            .harness_location(None)
            .build()
            .unwrap();

        assert_eq!(set.locations(), &[classes]);
    }

    #[test]
    fn test_relative_paths_become_absolute() {
        let set = ResourceSetBuilder::new()
            .output_dir("target/does-not-exist")
            .harness_location(None)
            .build()
            .unwrap();

        assert!(set.locations()[0].is_absolute());
    }

    #[test]
    fn test_empty_path_is_rejected() {
        let err = ResourceSetBuilder::new()
            .output_dir("classes")
            .resource_dir("")
            .build()
            .unwrap_err();

        assert!(matches!(err, BoundaryError::InvalidLocation { .. }));
    }

    #[test]
    fn test_missing_output_dir() {
        let err = ResourceSetBuilder::new().build().unwrap_err();
        assert!(matches!(err, BoundaryError::MissingOutputDir));
    }

    #[test]
    fn test_reconciliation_removes_shadowed_files() {
        let temp = TempDir::new().unwrap();
        let resources = temp.path().join("resources");
        let classes = temp.path().join("classes");

        touch(&resources.join("app.properties"));
        touch(&resources.join("META-INF/config.yaml"));
        touch(&classes.join("app.properties"));
        touch(&classes.join("META-INF/config.yaml"));
        touch(&classes.join("META-INF/other.yaml"));
        touch(&classes.join("com/example/Main.class"));

        ResourceSetBuilder::new()
            .resource_dir(&resources)
            .output_dir(&classes)
            .harness_location(None)
            .build()
            .unwrap();

        assert!(!classes.join("app.properties").exists());
        assert!(!classes.join("META-INF/config.yaml").exists());
        assert!(classes.join("META-INF").is_dir());
        assert!(classes.join("META-INF/other.yaml").exists());
        assert!(classes.join("com/example/Main.class").exists());
        assert!(resources.join("app.properties").exists());
    }

    #[test]
    fn test_reconciliation_keeps_read_only_files() {
        let temp = TempDir::new().unwrap();
        let resources = temp.path().join("resources");
        let classes = temp.path().join("classes");
        let locked = classes.join("locked.txt");

        touch(&resources.join("locked.txt"));
        touch(&locked);
        let mut permissions = fs::metadata(&locked).unwrap().permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&locked, permissions).unwrap();

        remove_duplicates_from_output(&classes, &resources);

        assert!(locked.exists());
    }

    #[test]
    fn test_reconciliation_ignores_missing_resource_dir() {
        let temp = TempDir::new().unwrap();
        let classes = temp.path().join("classes");
        touch(&classes.join("a.txt"));

        remove_duplicates_from_output(&classes, &temp.path().join("missing"));

        assert!(classes.join("a.txt").exists());
    }

    #[test]
    fn test_first_match_prefers_earlier_locations() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("first");
        let second = temp.path().join("second");
        touch(&first.join("bin/app"));
        touch(&second.join("bin/app"));

        let set = ResourceSet::from_locations([first.clone(), second]);

        assert_eq!(set.first_match("bin/app"), Some(first.join("bin/app")));
        assert_eq!(set.first_match("bin/missing"), None);
    }

    #[test]
    fn test_first_match_on_file_location() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("tool.jar");
        touch(&archive);

        let set = ResourceSet::from_locations([archive.clone()]);

        assert_eq!(set.first_match("tool"), Some(archive.clone()));
        assert_eq!(set.first_match("tool.jar"), Some(archive));
    }

    #[test]
    fn test_output_dir_as_resource_dir_keeps_files() {
        let temp = TempDir::new().unwrap();
        let classes = temp.path().join("classes");
        touch(&classes.join("app.properties"));

        ResourceSetBuilder::new()
            .resource_dir(&classes)
            .output_dir(&classes)
            .harness_location(None)
            .build()
            .unwrap();

        assert!(classes.join("app.properties").exists());
    }

    #[test]
    fn test_first_match_stays_inside_locations() {
        let temp = TempDir::new().unwrap();
        let inside = temp.path().join("inside");
        touch(&inside.join("app"));
        touch(&temp.path().join("outside/app"));

        let set = ResourceSet::from_locations([inside.clone()]);
        let absolute = temp.path().join("outside/app");

        assert_eq!(set.first_match(absolute.to_str().unwrap()), None);
        assert_eq!(set.first_match("../outside/app"), None);
        assert_eq!(set.first_match("./app"), None);
        assert_eq!(set.first_match(""), None);
        assert_eq!(set.first_match("app"), Some(inside.join("app")));
    }
}
