//! Fragment identity.
//!
//! A fragment is identified by its catalog path, e.g. `env/arena.launch.yaml`,
//! always with `/` separators. Identity is by name, never by content, so two
//! files with identical text are distinct fragments.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct FragmentId(pub String);

impl FragmentId {
    pub fn new(path: impl Into<String>) -> Self {
        let path: String = path.into();
        Self(path.replace('\\', "/").trim_start_matches("./").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
