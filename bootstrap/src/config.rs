//! Project layout and package declarations.
//!
//! A project is described by an optional `bootstrap.toml` at its root:
//!
//! ```toml
//! vendor_dir = "src/thirdparty"
//! cache_dir = ".bootstrap_cache"
//! lockfile = "manifest.lock"
//!
//! [[package]]
//! name = "glfw"
//! version = "3.4"
//! url = "https://github.com/glfw/glfw/archive/refs/tags/{ver}.tar.gz"
//! filename = "glfw-{ver}.tar.gz"
//! inner_top = "glfw-{ver}"
//! ```
//!
//! Every key is optional. Without a file, or without any `[[package]]`
//! table, the built-in declarations for GLFW and cglm are used. `{ver}` and
//! `{version}` in `url`, `filename`, and `inner_top` expand to the
//! package version.

use crate::package_key::PackageKey;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::PathBuf;

/// Configuration file looked up in the project root.
pub const DEFAULT_CONFIG_FILE: &str = "bootstrap.toml";
/// Default vendor root, relative to the project root.
pub const DEFAULT_VENDOR_DIR: &str = "src/thirdparty";
/// Default download cache, relative to the project root.
pub const DEFAULT_CACHE_DIR: &str = ".bootstrap_cache";
/// Default lockfile, relative to the project root.
pub const DEFAULT_LOCKFILE: &str = "manifest.lock";

const VERSION_PLACEHOLDERS: [&str; 2] = ["{ver}", "{version}"];

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Requested path.
        path: Utf8PathBuf,
    },

    /// The configuration file could not be read.
    #[error("failed to read configuration {path}: {source}")]
    Read {
        /// Configuration path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML of the expected shape.
    #[error("invalid configuration {path}: {source}")]
    Parse {
        /// Configuration path.
        path: Utf8PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// The configuration parsed but describes an unusable project.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },

    /// The project root cannot be resolved.
    #[error("project root {path} is not accessible: {source}")]
    Root {
        /// Requested root.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", path.display())]
    NonUtf8Path {
        /// The offending path.
        path: PathBuf,
    },
}

/// One declared package, before placeholder expansion.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSpec {
    /// Package name; also the default destination directory name.
    pub name: String,
    /// Pinned version.
    pub version: String,
    /// Download URL template.
    pub url: String,
    /// Cache filename template. Its suffix selects the archive format.
    pub filename: String,
    /// Top-level directory template to strip during extraction.
    #[serde(default)]
    pub inner_top: Option<String>,
    /// Destination below the vendor root. Defaults to `name`.
    #[serde(default)]
    pub destination: Option<String>,
}

impl PackageSpec {
    /// Declare a package with no inner-top hint and the default destination.
    #[must_use]
    pub fn new(name: &str, version: &str, url: &str, filename: &str) -> Self {
        Self {
            name: name.to_owned(),
            version: version.to_owned(),
            url: url.to_owned(),
            filename: filename.to_owned(),
            inner_top: None,
            destination: None,
        }
    }

    /// Set the inner-top hint.
    #[must_use]
    pub fn with_inner_top(mut self, inner_top: &str) -> Self {
        self.inner_top = Some(inner_top.to_owned());
        self
    }

    /// The lockfile key for this package.
    #[must_use]
    pub fn key(&self) -> PackageKey {
        PackageKey::new(&self.name, &self.version)
    }

    /// Expand placeholders and place the package within `layout`.
    #[must_use]
    pub fn resolve(&self, layout: &ProjectLayout) -> ResolvedPackage {
        let archive_filename = self.expand(&self.filename);
        let destination_name = self.destination.as_deref().unwrap_or(&self.name);
        ResolvedPackage {
            key: self.key(),
            name: self.name.clone(),
            version: self.version.clone(),
            url: self.expand(&self.url),
            inner_top: self.inner_top.as_deref().map(|top| self.expand(top)),
            destination: layout.vendor_dir.join(destination_name),
            cache_path: layout.cache_dir.join(&archive_filename),
            archive_filename,
        }
    }

    fn expand(&self, template: &str) -> String {
        VERSION_PLACEHOLDERS
            .iter()
            .fold(template.to_owned(), |text, placeholder| {
                text.replace(placeholder, &self.version)
            })
    }
}

/// A package with every template expanded and every path absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    /// Lockfile key.
    pub key: PackageKey,
    /// Package name.
    pub name: String,
    /// Pinned version.
    pub version: String,
    /// Download URL.
    pub url: String,
    /// Cache filename.
    pub archive_filename: String,
    /// Top-level directory to strip, if declared.
    pub inner_top: Option<String>,
    /// Extraction destination.
    pub destination: Utf8PathBuf,
    /// Location of the cached archive.
    pub cache_path: Utf8PathBuf,
}

/// Where vendored sources, downloads, and the lockfile live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    /// Project root.
    pub root: Utf8PathBuf,
    /// Directory holding one subdirectory per package.
    pub vendor_dir: Utf8PathBuf,
    /// Download cache.
    pub cache_dir: Utf8PathBuf,
    /// Lockfile path.
    pub lockfile: Utf8PathBuf,
}

impl ProjectLayout {
    /// The default layout below `root`.
    #[must_use]
    pub fn new(root: &Utf8Path) -> Self {
        Self {
            root: root.to_owned(),
            vendor_dir: root.join(DEFAULT_VENDOR_DIR),
            cache_dir: root.join(DEFAULT_CACHE_DIR),
            lockfile: root.join(DEFAULT_LOCKFILE),
        }
    }

    /// Load only the layout keys of the configuration for `root`.
    ///
    /// Package tables are not parsed, so cleaning still works while the
    /// package list is broken. Lookup of the configuration file follows
    /// [`BootstrapConfig::load`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file cannot be read or parsed, or
    /// when the layout is unusable.
    pub fn load(root: &Utf8Path, explicit: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        let file: LayoutFile = match locate_config_file(root, explicit)? {
            Some(path) => read_config_file(&path)?,
            None => LayoutFile::default(),
        };
        let layout = Self::from_keys(root, file.vendor_dir, file.cache_dir, file.lockfile);
        layout.validate()?;
        Ok(layout)
    }

    fn from_keys(
        root: &Utf8Path,
        vendor_dir: Option<String>,
        cache_dir: Option<String>,
        lockfile: Option<String>,
    ) -> Self {
        let defaults = Self::new(root);
        Self {
            root: root.to_owned(),
            vendor_dir: vendor_dir.map_or(defaults.vendor_dir, |p| root.join(p)),
            cache_dir: cache_dir.map_or(defaults.cache_dir, |p| root.join(p)),
            lockfile: lockfile.map_or(defaults.lockfile, |p| root.join(p)),
        }
    }

    /// Check that neither managed directory swallows the root or lockfile.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending directory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (label, dir) in [("vendor_dir", &self.vendor_dir), ("cache_dir", &self.cache_dir)] {
            if self.root.starts_with(dir) || self.lockfile.starts_with(dir) {
                return Err(invalid(format!(
                    "{label} {dir} must not contain the project root or the lockfile"
                )));
            }
        }
        Ok(())
    }

    /// Express `path` relative to the project root for recording in the
    /// lockfile. Paths outside the root are returned unchanged.
    #[must_use]
    pub fn relative(&self, path: &Utf8Path) -> String {
        path.strip_prefix(&self.root)
            .map_or_else(|_| path.to_string(), |relative| relative.to_string())
    }
}

/// The full run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// Project paths.
    pub layout: ProjectLayout,
    /// Packages, processed in this order.
    pub packages: Vec<PackageSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    vendor_dir: Option<String>,
    cache_dir: Option<String>,
    lockfile: Option<String>,
    #[serde(rename = "package")]
    packages: Option<Vec<PackageSpec>>,
}

/// Layout keys only; package tables and unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
struct LayoutFile {
    vendor_dir: Option<String>,
    cache_dir: Option<String>,
    lockfile: Option<String>,
}

/// The packages vendored when no configuration declares any.
#[must_use]
pub fn builtin_packages() -> Vec<PackageSpec> {
    vec![
        PackageSpec::new(
            "glfw",
            "3.4",
            "https://github.com/glfw/glfw/archive/refs/tags/{ver}.tar.gz",
            "glfw-{ver}.tar.gz",
        )
        .with_inner_top("glfw-{ver}"),
        PackageSpec::new(
            "cglm",
            "0.9.2",
            "https://github.com/recp/cglm/archive/refs/tags/v{ver}.tar.gz",
            "cglm-{ver}.tar.gz",
        )
        .with_inner_top("cglm-{ver}"),
    ]
}

impl BootstrapConfig {
    /// Built-in packages with the default layout below `root`.
    #[must_use]
    pub fn builtin(root: &Utf8Path) -> Self {
        Self {
            layout: ProjectLayout::new(root),
            packages: builtin_packages(),
        }
    }

    /// Load configuration for the project at `root`.
    ///
    /// `explicit` names a configuration file that must exist; otherwise
    /// `<root>/bootstrap.toml` is used when present.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file cannot be read or parsed, or
    /// when validation fails.
    pub fn load(root: &Utf8Path, explicit: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        let file: ConfigFile = match locate_config_file(root, explicit)? {
            Some(path) => read_config_file(&path)?,
            None => ConfigFile::default(),
        };
        let config = Self::from_file(root, file);
        config.validate()?;
        Ok(config)
    }

    fn from_file(root: &Utf8Path, file: ConfigFile) -> Self {
        let layout = ProjectLayout::from_keys(root, file.vendor_dir, file.cache_dir, file.lockfile);
        Self {
            layout,
            packages: file.packages.unwrap_or_else(builtin_packages),
        }
    }

    /// Check that the declarations describe a usable project.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.layout.validate()?;

        let mut names = HashSet::new();
        let mut destinations: Vec<Utf8PathBuf> = Vec::new();

        for spec in &self.packages {
            require_non_empty("name", &spec.name, &spec.name)?;
            require_non_empty("version", &spec.version, &spec.name)?;
            require_non_empty("url", &spec.url, &spec.name)?;
            if !names.insert(spec.name.as_str()) {
                return Err(invalid(format!("package {} is declared twice", spec.name)));
            }

            let resolved = spec.resolve(&self.layout);
            if !is_plain_file_name(&resolved.archive_filename) {
                return Err(invalid(format!(
                    "package {}: filename {} must be a plain file name",
                    spec.name, resolved.archive_filename
                )));
            }
            let destination = spec.destination.as_deref().unwrap_or(&spec.name);
            if !is_safe_relative(destination) {
                return Err(invalid(format!(
                    "package {}: destination {destination} must be a relative path without ..",
                    spec.name
                )));
            }
            // Destination trees must be disjoint.
            if let Some(other) = destinations.iter().find(|other| {
                resolved.destination.starts_with(other) || other.starts_with(&resolved.destination)
            }) {
                return Err(invalid(format!(
                    "package {}: destination {} overlaps {other}",
                    spec.name, resolved.destination
                )));
            }
            destinations.push(resolved.destination);
        }
        Ok(())
    }

    /// Every package, resolved against the layout.
    #[must_use]
    pub fn resolved_packages(&self) -> Vec<ResolvedPackage> {
        self.packages
            .iter()
            .map(|spec| spec.resolve(&self.layout))
            .collect()
    }
}

/// The configuration file to read: `explicit`, which must exist, or the
/// default file in `root` when present.
fn locate_config_file(
    root: &Utf8Path,
    explicit: Option<&Utf8Path>,
) -> Result<Option<Utf8PathBuf>, ConfigError> {
    match explicit {
        Some(path) if !path.exists() => Err(ConfigError::NotFound {
            path: path.to_owned(),
        }),
        Some(path) => Ok(Some(path.to_owned())),
        None => Ok(Some(root.join(DEFAULT_CONFIG_FILE)).filter(|path| path.exists())),
    }
}

fn read_config_file<T: DeserializeOwned>(path: &Utf8Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_owned(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })
}

/// Resolve the project root: `requested`, or the current directory.
///
/// # Errors
///
/// Returns [`ConfigError::Root`] when the directory cannot be resolved and
/// [`ConfigError::NonUtf8Path`] when it is not valid UTF-8.
pub fn resolve_root(requested: Option<&Utf8Path>) -> Result<Utf8PathBuf, ConfigError> {
    let requested = match requested {
        Some(path) => path.to_owned(),
        None => {
            let cwd = std::env::current_dir().map_err(|source| ConfigError::Root {
                path: Utf8PathBuf::from("."),
                source,
            })?;
            Utf8PathBuf::from_path_buf(cwd).map_err(|path| ConfigError::NonUtf8Path { path })?
        }
    };
    let canonical = requested
        .as_std_path()
        .canonicalize()
        .map_err(|source| ConfigError::Root {
            path: requested.clone(),
            source,
        })?;
    Utf8PathBuf::from_path_buf(canonical).map_err(|path| ConfigError::NonUtf8Path { path })
}

fn invalid(reason: String) -> ConfigError {
    ConfigError::Invalid { reason }
}

fn require_non_empty(field: &str, value: &str, package: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        let package = if package.is_empty() { "<unnamed>" } else { package };
        return Err(invalid(format!("package {package}: {field} must not be empty")));
    }
    Ok(())
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

fn is_safe_relative(path: &str) -> bool {
    let path = Utf8Path::new(path);
    !path.as_str().is_empty()
        && !path.as_str().starts_with(['/', '\\'])
        && path.components().all(|component| {
            matches!(
                component,
                camino::Utf8Component::Normal(_) | camino::Utf8Component::CurDir
            )
        })
        && path
            .components()
            .any(|component| matches!(component, camino::Utf8Component::Normal(_)))
}
