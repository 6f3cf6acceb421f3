//! Composition driver: catalog + root fragment + arguments -> plan.

use crate::error::{LaunchError, Result};
use crate::fragment::{Catalog, FragmentId};
use crate::plan::{Plan, flatten};
use crate::resolve::Resolver;
use crate::scope::{qualify, split_namespace};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Argument that receives the instance identifier in a fleet unless the
/// caller names another one.
pub const DEFAULT_INSTANCE_ARG: &str = "instance";

pub struct Composer<'c> {
    catalog: &'c Catalog,
    namespace: Vec<String>,
}

impl<'c> Composer<'c> {
    /// Composer resolving at the global namespace.
    pub fn new(catalog: &'c Catalog) -> Self {
        Self {
            catalog,
            namespace: Vec::new(),
        }
    }

    /// Seed every plan with a root namespace prefix such as `/env_1`.
    pub fn with_namespace(mut self, namespace: &str) -> Result<Self> {
        self.namespace = split_namespace(namespace).map_err(|message| LaunchError::Syntax {
            input: namespace.to_string(),
            message,
        })?;
        Ok(self)
    }

    /// Resolve `root` with the given argument values. The root fragment is
    /// bound exactly like an include: undeclared names and missing required
    /// arguments are errors.
    pub fn resolve(&self, root: &FragmentId, args: &BTreeMap<String, String>) -> Result<Plan> {
        self.resolve_at(root, args, self.namespace.clone(), None)
    }

    fn resolve_at(
        &self,
        root: &FragmentId,
        args: &BTreeMap<String, String>,
        namespace: Vec<String>,
        instance: Option<String>,
    ) -> Result<Plan> {
        let qualified = qualify(&namespace);
        let resolution = Resolver::new(self.catalog, namespace).resolve(root, args)?;
        let processes = flatten(&resolution)?;
        info!(
            root = %root,
            namespace = %qualified,
            processes = processes.len(),
            scopes = resolution.arena.len(),
            "plan resolved"
        );
        Ok(Plan {
            root: root.clone(),
            instance,
            namespace: qualified,
            processes,
        })
    }

    /// Resolve one plan per instance identifier.
    ///
    /// Each identifier becomes an extra root namespace segment and, when the
    /// root fragment declares `instance_arg`, is bound to it. Identifiers
    /// must be unique and the resulting plans namespace-disjoint.
    pub fn resolve_fleet(
        &self,
        root: &FragmentId,
        base_args: &BTreeMap<String, String>,
        instances: &[String],
        instance_arg: &str,
    ) -> Result<Vec<Plan>> {
        let declares_instance = self.catalog.fragment(root)?.declaration(instance_arg).is_some();
        if !declares_instance {
            debug!(
                root = %root,
                arg = instance_arg,
                "root does not take the instance id, namespace prefix only"
            );
        }

        let mut seen = BTreeSet::new();
        let mut owners: BTreeMap<String, String> = BTreeMap::new();
        let mut plans = Vec::with_capacity(instances.len());
        for id in instances {
            if !seen.insert(id.as_str()) {
                return Err(LaunchError::NamespaceCollision {
                    namespace: qualify(&[id.clone()]),
                    first: id.clone(),
                    second: id.clone(),
                });
            }
            let segment = split_namespace(id).map_err(|message| LaunchError::Syntax {
                input: id.clone(),
                message,
            })?;

            let mut args = base_args.clone();
            if declares_instance {
                args.insert(instance_arg.to_string(), id.clone());
            }
            let mut namespace = self.namespace.clone();
            namespace.extend(segment);
            let plan = self.resolve_at(root, &args, namespace, Some(id.clone()))?;

            for ns in plan.namespaces() {
                if let Some(first) = owners.insert(ns.to_string(), id.clone()) {
                    return Err(LaunchError::NamespaceCollision {
                        namespace: ns.to_string(),
                        first,
                        second: id.clone(),
                    });
                }
            }
            plans.push(plan);
        }
        info!(
            root = %root,
            instances = plans.len(),
            processes = plans.iter().map(|p| p.processes.len()).sum::<usize>(),
            "fleet resolved"
        );
        Ok(plans)
    }
}

/// Instance identifiers `{prefix}_1` .. `{prefix}_{count}`.
pub fn instance_ids(prefix: &str, count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{}_{}", prefix, i)).collect()
}
