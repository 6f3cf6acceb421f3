//! Optional CLI settings file (YAML).
//!
//! ```yaml
//! catalog: launch
//! format: json
//! fleet_prefix: env
//! args:
//!   robot: burger
//! ```
//!
//! Command-line flags always win over the file.

use crate::render::OutputFormat;
use anyhow::Context;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Default catalog directory, relative to the settings file.
    #[serde(default)]
    pub catalog: Option<PathBuf>,

    /// Root arguments applied before any `--arg`.
    #[serde(default)]
    pub args: BTreeMap<String, String>,

    #[serde(default)]
    pub format: Option<OutputFormat>,

    #[serde(default)]
    pub fleet_prefix: Option<String>,
}

impl Settings {
    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        let mut settings = Self::from_yaml_str(&text)
            .with_context(|| format!("parsing settings file {}", path.display()))?;
        if let (Some(catalog), Some(dir)) = (&settings.catalog, path.parent())
            && catalog.is_relative()
        {
            settings.catalog = Some(dir.join(catalog));
        }
        Ok(settings)
    }
}
