//! Persistent scope chain.
//!
//! Scopes live in an arena and only point at their parent, so entering a
//! child never touches the parent and sibling branches cannot see each
//! other's bindings, remaps or parameter layers. Lookups walk from a scope
//! towards the root and stop at the first match.

use crate::error::Result;
use crate::expr::{Bindings, is_valid_name};
use crate::params::ParamOverlayLayer;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(usize);

#[derive(Debug, Clone)]
struct ScopeNode {
    parent: Option<ScopeId>,
    /// Full namespace, cached: parent's namespace plus this scope's segments.
    namespace: Vec<String>,
    bindings: BTreeMap<String, String>,
    remaps: BTreeMap<String, String>,
    layer: Option<ParamOverlayLayer>,
}

#[derive(Debug, Clone)]
pub struct ScopeArena {
    nodes: Vec<ScopeNode>,
}

impl ScopeArena {
    /// Create an arena holding only the root scope.
    pub fn new(root_namespace: Vec<String>, root_bindings: BTreeMap<String, String>) -> Self {
        Self {
            nodes: vec![ScopeNode {
                parent: None,
                namespace: root_namespace,
                bindings: root_bindings,
                remaps: BTreeMap::new(),
                layer: None,
            }],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, id: ScopeId) -> &ScopeNode {
        &self.nodes[id.0]
    }

    fn push(&mut self, node: ScopeNode) -> ScopeId {
        self.nodes.push(node);
        ScopeId(self.nodes.len() - 1)
    }

    /// Create a child scope. `segments` extend the parent's namespace;
    /// `bindings` and `remaps` mask the parent's entries with the same key.
    pub fn enter(
        &mut self,
        parent: ScopeId,
        segments: Vec<String>,
        bindings: BTreeMap<String, String>,
        remaps: BTreeMap<String, String>,
    ) -> ScopeId {
        let mut namespace = self.node(parent).namespace.clone();
        namespace.extend(segments);
        self.push(ScopeNode {
            parent: Some(parent),
            namespace,
            bindings,
            remaps,
            layer: None,
        })
    }

    /// Create a child scope carrying one parameter layer.
    pub fn push_layer(&mut self, parent: ScopeId, layer: ParamOverlayLayer) -> ScopeId {
        let namespace = self.node(parent).namespace.clone();
        self.push(ScopeNode {
            parent: Some(parent),
            namespace,
            bindings: BTreeMap::new(),
            remaps: BTreeMap::new(),
            layer: Some(layer),
        })
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.node(id).parent
    }

    /// `id` followed by each of its ancestors up to the root.
    pub fn ancestors(&self, id: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(id), move |s| self.node(*s).parent)
    }

    pub fn namespace(&self, id: ScopeId) -> &[String] {
        &self.node(id).namespace
    }

    /// Slash-joined namespace from the root, `/` for the global scope.
    pub fn qualified_namespace(&self, id: ScopeId) -> String {
        qualify(self.namespace(id))
    }

    /// Nearest binding of `name`, if any.
    pub fn lookup(&self, id: ScopeId, name: &str) -> Option<&str> {
        self.ancestors(id)
            .find_map(|s| self.node(s).bindings.get(name))
            .map(String::as_str)
    }

    /// Nearest remap of `logical`, or `logical` itself when none applies.
    pub fn resolve_remap(&self, id: ScopeId, logical: &str) -> String {
        self.ancestors(id)
            .find_map(|s| self.node(s).remaps.get(logical))
            .cloned()
            .unwrap_or_else(|| logical.to_string())
    }

    /// Effective remap table: every logical name visible from `id`, mapped
    /// by its nearest entry.
    pub fn remap_table(&self, id: ScopeId) -> BTreeMap<String, String> {
        let mut table = BTreeMap::new();
        for s in self.ancestors(id) {
            for (from, to) in &self.node(s).remaps {
                table.entry(from.clone()).or_insert_with(|| to.clone());
            }
        }
        table
    }

    /// Parameter layers visible from `id`, outermost first, in the order
    /// they were applied.
    pub fn param_layers(&self, id: ScopeId) -> Vec<&ParamOverlayLayer> {
        let mut layers: Vec<&ParamOverlayLayer> = self
            .ancestors(id)
            .filter_map(|s| self.node(s).layer.as_ref())
            .collect();
        layers.reverse();
        layers
    }

    /// Binding view of one scope for the expression evaluator.
    pub fn bindings(&self, id: ScopeId) -> ScopeBindings<'_> {
        ScopeBindings { arena: self, id }
    }
}

pub struct ScopeBindings<'a> {
    arena: &'a ScopeArena,
    id: ScopeId,
}

impl Bindings for ScopeBindings<'_> {
    fn lookup(&self, name: &str) -> Result<Option<String>> {
        Ok(self.arena.lookup(self.id, name).map(str::to_string))
    }
}

pub fn qualify(segments: &[String]) -> String {
    format!("/{}", segments.join("/"))
}

/// Split a rendered namespace into validated segments. Empty segments
/// (leading, trailing or doubled `/`) are dropped.
pub fn split_namespace(text: &str) -> std::result::Result<Vec<String>, String> {
    text.split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if is_valid_name(s) {
                Ok(s.to_string())
            } else {
                Err(format!("invalid namespace segment {:?} in {:?}", s, text))
            }
        })
        .collect()
}
