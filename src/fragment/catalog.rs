//! Fragment catalog: every fragment and parameter file, loaded once.
//!
//! Files are keyed by their path relative to the catalog root, with `/`
//! separators. Names ending in `.launch.yaml`, `.launch.yml` or
//! `.launch.json` are fragments; any other `.yaml`, `.yml` or `.json` file is
//! a parameter file. After loading, the catalog is only read.

use crate::error::{LaunchError, Result};
use crate::fragment::model::Fragment;
use crate::fragment::raw::RawFragment;
use crate::fragment::FragmentId;
use crate::params::ParamTable;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
}

fn format_of(path: &str) -> Option<Format> {
    if path.ends_with(".yaml") || path.ends_with(".yml") {
        Some(Format::Yaml)
    } else if path.ends_with(".json") {
        Some(Format::Json)
    } else {
        None
    }
}

fn is_fragment_path(path: &str) -> bool {
    [".launch.yaml", ".launch.yml", ".launch.json"]
        .iter()
        .any(|suffix| path.ends_with(suffix))
}

fn decode<T: serde::de::DeserializeOwned>(path: &str, format: Format, text: &str) -> Result<T> {
    let decoded = match format {
        Format::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
        Format::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
    };
    decoded.map_err(|message| LaunchError::Decode {
        path: path.to_string(),
        message,
    })
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    fragments: BTreeMap<FragmentId, Fragment>,
    params: BTreeMap<String, ParamTable>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every fragment and parameter file under `root`.
    pub fn load_dir(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let mut catalog = Catalog::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| LaunchError::Io {
                path: e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string()),
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            if format_of(&rel).is_none() {
                debug!(path = %rel, "skipping non-config file");
                continue;
            }
            let text = fs::read_to_string(entry.path()).map_err(|source| LaunchError::Io {
                path: entry.path().display().to_string(),
                source,
            })?;
            if is_fragment_path(&rel) {
                catalog.insert_fragment_str(&rel, &text)?;
            } else {
                catalog.insert_params_str(&rel, &text)?;
            }
        }
        debug!(
            root = %root.display(),
            fragments = catalog.fragments.len(),
            param_files = catalog.params.len(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    /// Add a fragment from source text; the format follows the path suffix.
    pub fn insert_fragment_str(&mut self, path: &str, text: &str) -> Result<&Fragment> {
        let id = FragmentId::new(path);
        let format = format_of(id.as_str()).ok_or_else(|| LaunchError::Decode {
            path: path.to_string(),
            message: "fragment files must be .yaml, .yml or .json".to_string(),
        })?;
        let raw: RawFragment = decode(id.as_str(), format, text)?;
        let fragment = raw.validate_and_build(id.clone())?;
        if self.fragments.insert(id.clone(), fragment).is_some() {
            warn!(fragment = %id, "fragment replaced in catalog");
        }
        self.fragments
            .get(&id)
            .ok_or_else(|| LaunchError::UnknownFragment(id.clone()))
    }

    /// Add a parameter file from source text.
    pub fn insert_params_str(&mut self, path: &str, text: &str) -> Result<&ParamTable> {
        let key = FragmentId::new(path).0;
        let format = format_of(&key).ok_or_else(|| LaunchError::Decode {
            path: path.to_string(),
            message: "parameter files must be .yaml, .yml or .json".to_string(),
        })?;
        let doc: serde_json::Value = decode(&key, format, text)?;
        let table = ParamTable::from_json(&doc).map_err(|message| LaunchError::Decode {
            path: key.clone(),
            message,
        })?;
        self.params.insert(key.clone(), table);
        self.params
            .get(&key)
            .ok_or(LaunchError::UnknownParamFile(key))
    }

    pub fn fragment(&self, id: &FragmentId) -> Result<&Fragment> {
        self.fragments
            .get(id)
            .ok_or_else(|| LaunchError::UnknownFragment(id.clone()))
    }

    pub fn param_file(&self, path: &str) -> Result<&ParamTable> {
        let key = FragmentId::new(path).0;
        self.params
            .get(&key)
            .ok_or(LaunchError::UnknownParamFile(key))
    }

    pub fn fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.values()
    }

    pub fn param_files(&self) -> impl Iterator<Item = (&str, &ParamTable)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Static check over literal include targets.
    ///
    /// Returns each cycle found as the chain of fragment ids, first id
    /// repeated at the end. Includes naming a fragment missing from the
    /// catalog are returned separately as (includer, target) pairs.
    pub fn include_cycles(&self) -> (Vec<Vec<FragmentId>>, Vec<(FragmentId, FragmentId)>) {
        #[derive(Copy, Clone, PartialEq, Eq)]
        enum Mark {
            Temp,
            Perm,
        }

        fn dfs(
            v: &FragmentId,
            edges: &BTreeMap<&FragmentId, Vec<FragmentId>>,
            marks: &mut BTreeMap<FragmentId, Mark>,
            stack: &mut Vec<FragmentId>,
            cycles: &mut Vec<Vec<FragmentId>>,
        ) {
            match marks.get(v) {
                Some(Mark::Perm) => return,
                Some(Mark::Temp) => {
                    // v is on the current path => cycle from its first occurrence
                    if let Some(start) = stack.iter().position(|s| s == v) {
                        let mut cycle = stack[start..].to_vec();
                        cycle.push(v.clone());
                        cycles.push(cycle);
                    }
                    return;
                }
                None => {}
            }

            marks.insert(v.clone(), Mark::Temp);
            stack.push(v.clone());
            if let Some(targets) = edges.get(v) {
                for t in targets {
                    if edges.contains_key(t) {
                        dfs(t, edges, marks, stack, cycles);
                    }
                }
            }
            stack.pop();
            marks.insert(v.clone(), Mark::Perm);
        }

        let mut edges: BTreeMap<&FragmentId, Vec<FragmentId>> = BTreeMap::new();
        let mut missing = Vec::new();
        for (id, fragment) in &self.fragments {
            let targets = fragment.literal_includes();
            for t in &targets {
                if !self.fragments.contains_key(t) {
                    missing.push((id.clone(), t.clone()));
                }
            }
            edges.insert(id, targets);
        }

        let mut marks = BTreeMap::new();
        let mut stack = Vec::new();
        let mut cycles = Vec::new();
        for id in self.fragments.keys() {
            stack.clear();
            dfs(id, &edges, &mut marks, &mut stack, &mut cycles);
        }
        (cycles, missing)
    }
}
