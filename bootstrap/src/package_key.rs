//! Lockfile key for one pinned package.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The `name@version` key under which a package is recorded in the
/// lockfile.
///
/// # Examples
///
/// ```
/// use thirdparty_bootstrap::package_key::PackageKey;
///
/// let key = PackageKey::new("glfw", "3.4");
/// assert_eq!(key.as_str(), "glfw@3.4");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageKey(String);

impl PackageKey {
    /// Build the key for `name` at `version`.
    #[must_use]
    pub fn new(name: &str, version: &str) -> Self {
        Self(format!("{name}@{version}"))
    }

    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PackageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PackageKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_name_and_version() {
        assert_eq!(PackageKey::new("cglm", "0.9.2").to_string(), "cglm@0.9.2");
    }

    #[test]
    fn serialises_as_plain_string() {
        let json = serde_json::to_string(&PackageKey::new("glfw", "3.4")).expect("serialise");
        assert_eq!(json, "\"glfw@3.4\"");
    }
}
