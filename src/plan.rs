//! Plan flattening: resolved tree -> ordered `ProcessSpec` list.

use crate::error::{LaunchError, Result};
use crate::fragment::FragmentId;
use crate::params::{ParamMap, resolve_overlay};
use crate::resolve::{NodeCandidate, Resolution, ResolvedBlock, ResolvedItem};
use crate::scope::{ScopeArena, qualify};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// What gets started: package, executable and the optional node name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ExecutableId {
    pub package: String,
    pub executable: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl fmt::Display for ExecutableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.executable)?;
        if let Some(name) = &self.name {
            write!(f, " ({})", name)?;
        }
        Ok(())
    }
}

/// One process to launch, fully configured.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSpec {
    /// Fully qualified, e.g. `/env_1/nav`.
    pub namespace: String,
    #[serde(flatten)]
    pub executable: ExecutableId,
    pub parameters: ParamMap,
    pub remaps: BTreeMap<String, String>,
    pub arguments: Vec<String>,
    /// Fragment the node was declared in.
    pub fragment: FragmentId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub root: FragmentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Root namespace prefix the plan was resolved under.
    pub namespace: String,
    pub processes: Vec<ProcessSpec>,
}

impl Plan {
    /// Distinct process namespaces, ordered.
    pub fn namespaces(&self) -> BTreeSet<&str> {
        self.processes.iter().map(|p| p.namespace.as_str()).collect()
    }
}

fn flatten_node(arena: &ScopeArena, node: &NodeCandidate) -> ProcessSpec {
    let mut namespace = arena.namespace(node.scope).to_vec();
    namespace.extend(node.namespace.iter().cloned());

    let layers = arena.param_layers(node.scope);
    let mut parameters =
        resolve_overlay(layers.into_iter().filter(|l| l.applies_to(&namespace)));
    parameters.extend(node.parameters.clone());

    let mut remaps = arena.remap_table(node.scope);
    remaps.extend(node.remaps.clone());

    ProcessSpec {
        namespace: qualify(&namespace),
        executable: node.executable.clone(),
        parameters,
        remaps,
        arguments: node.arguments.clone(),
        fragment: node.fragment.clone(),
    }
}

struct Flattener<'a> {
    arena: &'a ScopeArena,
    seen: BTreeSet<(String, ExecutableId)>,
    out: Vec<ProcessSpec>,
}

impl Flattener<'_> {
    fn block(&mut self, block: &ResolvedBlock) -> Result<()> {
        for item in &block.items {
            match item {
                ResolvedItem::Block(b) => self.block(b)?,
                ResolvedItem::Node(node) => {
                    let spec = flatten_node(self.arena, node);
                    let key = (spec.namespace.clone(), spec.executable.clone());
                    if !self.seen.insert(key) {
                        return Err(LaunchError::DuplicateProcess {
                            namespace: spec.namespace,
                            executable: spec.executable.to_string(),
                        });
                    }
                    self.out.push(spec);
                }
            }
        }
        Ok(())
    }
}

/// Flatten a resolution into its processes, in declaration order.
pub fn flatten(resolution: &Resolution) -> Result<Vec<ProcessSpec>> {
    let mut f = Flattener {
        arena: &resolution.arena,
        seen: BTreeSet::new(),
        out: Vec::new(),
    };
    f.block(&resolution.root)?;
    Ok(f.out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Catalog;
    use crate::params::ParamValue;
    use crate::resolve::Resolver;
    use pretty_assertions::assert_eq;

    fn flatten_root(files: &[(&str, &str)]) -> Result<Vec<ProcessSpec>> {
        let mut c = Catalog::new();
        for (path, text) in files {
            if path.contains(".launch.") {
                c.insert_fragment_str(path, text).unwrap();
            } else {
                c.insert_params_str(path, text).unwrap();
            }
        }
        let root = FragmentId::new("root.launch.yaml");
        let resolution = Resolver::new(&c, vec![]).resolve(&root, &BTreeMap::new())?;
        flatten(&resolution)
    }

    #[test]
    fn layers_apply_to_every_node_of_their_body() {
        let procs = flatten_root(&[
            ("common.yaml", "max_speed: 2.0\nframe: odom\n"),
            (
                "root.launch.yaml",
                r#"
actions:
  - node: { package: sim, executable: early }
  - set_param: { file: common.yaml }
  - set_param: { values: { max_speed: 1.0 }, namespace: nav }
  - node: { package: sim, executable: world }
  - group:
      namespace: nav
      actions:
        - node:
            package: nav
            executable: planner
            parameters: { frame: map }
"#,
            ),
        ])
        .unwrap();

        let by_exe: BTreeMap<&str, &ProcessSpec> = procs
            .iter()
            .map(|p| (p.executable.executable.as_str(), p))
            .collect();
        assert_eq!(by_exe["early"].parameters["max_speed"], ParamValue::Float(2.0));
        assert_eq!(by_exe["early"].parameters, by_exe["world"].parameters);
        assert_eq!(by_exe["planner"].namespace, "/nav");
        assert_eq!(by_exe["planner"].parameters["max_speed"], ParamValue::Float(1.0));
        assert_eq!(by_exe["planner"].parameters["frame"], ParamValue::Text("map".into()));
    }

    #[test]
    fn nodes_sharing_a_namespace_share_the_merged_map() {
        let procs = flatten_root(&[
            ("common.yaml", "max_speed: 2.0\n"),
            ("burger.yaml", "max_speed: 1.5\nradius: 0.2\n"),
            (
                "root.launch.yaml",
                r#"
actions:
  - node: { package: sim, executable: world }
  - set_param: { file: common.yaml }
  - node: { package: nav, executable: planner }
  - set_param: { file: burger.yaml }
  - node: { package: nav, executable: controller }
"#,
            ),
        ])
        .unwrap();

        assert_eq!(procs.len(), 3);
        for p in &procs {
            assert_eq!(p.namespace, "/");
            assert_eq!(p.parameters, procs[0].parameters);
        }
        assert_eq!(procs[0].parameters["max_speed"], ParamValue::Float(1.5));
        assert_eq!(procs[0].parameters["radius"], ParamValue::Float(0.2));
    }

    #[test]
    fn node_remaps_mask_inherited_ones() {
        let procs = flatten_root(&[(
            "root.launch.yaml",
            r#"
remap: [[scan, /sim/scan], [odom, /sim/odom]]
actions:
  - node:
      package: nav
      executable: amcl
      namespace: loc
      remap: [[scan, /filtered/scan]]
      args: ["--verbose", 3]
"#,
        )])
        .unwrap();
        assert_eq!(procs.len(), 1);
        let p = &procs[0];
        assert_eq!(p.namespace, "/loc");
        assert_eq!(p.arguments, vec!["--verbose".to_string(), "3".to_string()]);
        assert_eq!(
            p.remaps,
            BTreeMap::from([
                ("odom".to_string(), "/sim/odom".to_string()),
                ("scan".to_string(), "/filtered/scan".to_string()),
            ])
        );
    }

    #[test]
    fn duplicate_process_in_one_namespace() {
        let err = flatten_root(&[(
            "root.launch.yaml",
            r#"
actions:
  - node: { package: sim, executable: actor }
  - group: { actions: [{ node: { package: sim, executable: actor } }] }
"#,
        )])
        .unwrap_err();
        assert!(matches!(
            err,
            LaunchError::DuplicateProcess { ref namespace, .. } if namespace == "/"
        ));
    }

    #[test]
    fn distinct_names_or_namespaces_are_not_duplicates() {
        let procs = flatten_root(&[(
            "root.launch.yaml",
            r#"
actions:
  - node: { package: sim, executable: actor, name: ped_1 }
  - node: { package: sim, executable: actor, name: ped_2 }
  - node: { package: sim, executable: actor, namespace: other, name: ped_1 }
"#,
        )])
        .unwrap();
        let names: Vec<String> = procs
            .iter()
            .map(|p| format!("{} {}", p.namespace, p.executable))
            .collect();
        assert_eq!(
            names,
            vec![
                "/ sim/actor (ped_1)".to_string(),
                "/ sim/actor (ped_2)".to_string(),
                "/other sim/actor (ped_1)".to_string(),
            ]
        );
    }
}
