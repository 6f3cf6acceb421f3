//! Include resolution: expands the fragment tree into resolved blocks.
//!
//! One depth-first pass over the directives, in declaration order. Each
//! fragment activation:
//! 1. rejects undeclared bindings and missing required arguments,
//! 2. evaluates the include condition in the parent scope (false skips the
//!    whole subtree),
//! 3. binds arguments (supplied first, then defaults, evaluated lazily) and
//!    enters a child scope with the fragment's namespace and remaps,
//! 4. resolves its directives against that scope, parameter layers first.
//!
//! The active include chain is tracked by fragment id. Any error aborts the
//! whole resolution; callers never see a partial tree.

use crate::error::{LaunchError, Result};
use crate::expr::{Bindings, Condition, Template, condition_holds, render};
use crate::fragment::{
    ArgumentDeclaration, Catalog, Directive, Fragment, FragmentId, GroupDecl, IncludeDecl,
    NodeDecl, ParamSource, RemapDecl, SetParamDecl,
};
use crate::params::{ParamMap, ParamOverlayLayer};
use crate::plan::ExecutableId;
use crate::scope::{ScopeArena, ScopeId, split_namespace};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, debug_span};

/// A `Node` directive whose condition held, with its own fields rendered.
/// Namespace, parameters and remaps still need merging with the scope.
#[derive(Debug, Clone)]
pub struct NodeCandidate {
    pub fragment: FragmentId,
    pub scope: ScopeId,
    pub executable: ExecutableId,
    /// Segments the node adds below its scope's namespace.
    pub namespace: Vec<String>,
    pub parameters: ParamMap,
    pub remaps: BTreeMap<String, String>,
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOrigin {
    Fragment(FragmentId),
    Group,
}

#[derive(Debug, Clone)]
pub struct ResolvedBlock {
    pub origin: BlockOrigin,
    /// Scope the block's body was entered with.
    pub scope: ScopeId,
    pub items: Vec<ResolvedItem>,
}

#[derive(Debug, Clone)]
pub enum ResolvedItem {
    Node(NodeCandidate),
    Block(ResolvedBlock),
}

/// Fully resolved composition tree plus the scopes it refers to.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub arena: ScopeArena,
    pub root: ResolvedBlock,
}

/// Argument bindings of one fragment activation.
///
/// Declared arguments resolve from the supplied bindings, then from their
/// default (rendered on first use, so a default may refer to other
/// arguments of the same fragment). Any other name falls through to the
/// parent scope.
struct ArgumentScope<'a> {
    fragment: &'a Fragment,
    supplied: &'a BTreeMap<String, String>,
    arena: &'a ScopeArena,
    parent: ScopeId,
    resolved: RefCell<BTreeMap<String, Option<String>>>,
    in_progress: RefCell<BTreeSet<String>>,
}

impl ArgumentScope<'_> {
    fn resolve_declared(&self, name: &str) -> Result<Option<String>> {
        if let Some(v) = self.resolved.borrow().get(name) {
            return Ok(v.clone());
        }
        let Some(decl) = self.fragment.declaration(name) else {
            return Ok(None);
        };

        let value = match self.supplied.get(name) {
            Some(v) => Some(v.clone()),
            None => {
                if !self.in_progress.borrow_mut().insert(name.to_string()) {
                    return Err(LaunchError::UnboundArgument {
                        name: name.to_string(),
                        context: format!(
                            "deriving '{}' in {}, which refers back to itself",
                            name, self.fragment.id
                        ),
                    });
                }
                let derived = self.derive(decl);
                self.in_progress.borrow_mut().remove(name);
                derived?
            }
        };

        self.resolved
            .borrow_mut()
            .insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Value of an argument the caller did not bind: its rendered default,
    /// or unbound when its `required_unless` waiver holds.
    fn derive(&self, decl: &ArgumentDeclaration) -> Result<Option<String>> {
        if let Some(default) = &decl.default {
            return render(default, self).map(Some);
        }
        match &decl.required_unless {
            Some(waiver) if condition_holds(Some(waiver), self)? => Ok(None),
            _ => Err(LaunchError::MissingRequiredArgument {
                fragment: self.fragment.id.clone(),
                name: decl.name.clone(),
            }),
        }
    }

    /// Resolve every declared argument in declaration order.
    fn bind_all(&self) -> Result<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        for decl in &self.fragment.args {
            if let Some(v) = self.resolve_declared(&decl.name)? {
                out.insert(decl.name.clone(), v);
            }
        }
        Ok(out)
    }
}

impl Bindings for ArgumentScope<'_> {
    fn lookup(&self, name: &str) -> Result<Option<String>> {
        if self.fragment.declaration(name).is_some() {
            return self.resolve_declared(name);
        }
        Ok(self.arena.lookup(self.parent, name).map(str::to_string))
    }
}

pub struct Resolver<'c> {
    catalog: &'c Catalog,
    arena: ScopeArena,
    chain: Vec<FragmentId>,
}

impl<'c> Resolver<'c> {
    /// Start a resolution whose root scope sits at `root_namespace`.
    pub fn new(catalog: &'c Catalog, root_namespace: Vec<String>) -> Self {
        Self {
            catalog,
            arena: ScopeArena::new(root_namespace, BTreeMap::new()),
            chain: Vec::new(),
        }
    }

    /// Resolve `root` with caller-supplied argument values.
    pub fn resolve(
        mut self,
        root: &FragmentId,
        args: &BTreeMap<String, String>,
    ) -> Result<Resolution> {
        let fragment = self.catalog.fragment(root)?;
        let parent = self.arena.root();
        let names: Vec<&str> = args.keys().map(String::as_str).collect();
        let block = self.activate(fragment, parent, &names, None, |_| Ok(args.clone()))?;
        let root = block.ok_or_else(|| LaunchError::UnknownFragment(root.clone()))?;
        Ok(Resolution {
            arena: self.arena,
            root,
        })
    }

    fn invalid(&self, fragment: &FragmentId, message: String) -> LaunchError {
        LaunchError::InvalidFragment {
            fragment: fragment.clone(),
            message,
        }
    }

    fn render_in(&self, scope: ScopeId, template: &Template) -> Result<String> {
        render(template, &self.arena.bindings(scope))
    }

    fn holds_in(&self, scope: ScopeId, condition: Option<&Condition>) -> Result<bool> {
        condition_holds(condition, &self.arena.bindings(scope))
    }

    fn segments_in(
        &self,
        fragment: &FragmentId,
        scope: ScopeId,
        ns: Option<&Template>,
    ) -> Result<Vec<String>> {
        match ns {
            None => Ok(Vec::new()),
            Some(t) => {
                let text = self.render_in(scope, t)?;
                split_namespace(&text).map_err(|m| self.invalid(fragment, m))
            }
        }
    }

    fn remaps_in(
        &self,
        scope: ScopeId,
        remaps: &[RemapDecl],
    ) -> Result<BTreeMap<String, String>> {
        let mut table = BTreeMap::new();
        for r in remaps {
            table.insert(self.render_in(scope, &r.from)?, self.render_in(scope, &r.to)?);
        }
        Ok(table)
    }

    /// Activate one fragment below `parent`. `bind` renders the supplied
    /// argument values; it only runs once the condition has held.
    fn activate<F>(
        &mut self,
        fragment: &'c Fragment,
        parent: ScopeId,
        supplied_names: &[&str],
        condition: Option<&Condition>,
        bind: F,
    ) -> Result<Option<ResolvedBlock>>
    where
        F: FnOnce(&Self) -> Result<BTreeMap<String, String>>,
    {
        if self.chain.contains(&fragment.id) {
            let mut chain = self.chain.clone();
            chain.push(fragment.id.clone());
            return Err(LaunchError::CyclicInclude { chain });
        }

        // 1) Static binding checks.
        for name in supplied_names {
            if fragment.declaration(name).is_none() {
                return Err(LaunchError::UnknownArgument {
                    fragment: fragment.id.clone(),
                    name: name.to_string(),
                });
            }
        }
        for decl in &fragment.args {
            if decl.default.is_none()
                && decl.required_unless.is_none()
                && !supplied_names.contains(&decl.name.as_str())
            {
                return Err(LaunchError::MissingRequiredArgument {
                    fragment: fragment.id.clone(),
                    name: decl.name.clone(),
                });
            }
        }

        // 2) Include condition, in the parent scope.
        if !self.holds_in(parent, condition)? {
            debug!(
                fragment = %fragment.id,
                condition = condition.map(|c| c.source.as_str()).unwrap_or_default(),
                "include skipped, condition is false"
            );
            return Ok(None);
        }

        // 3) Bind arguments and enter the fragment's scope.
        let supplied = bind(self)?;
        let bindings = ArgumentScope {
            fragment,
            supplied: &supplied,
            arena: &self.arena,
            parent,
            resolved: RefCell::new(BTreeMap::new()),
            in_progress: RefCell::new(BTreeSet::new()),
        }
        .bind_all()?;
        let bound = self.arena.enter(parent, Vec::new(), bindings, BTreeMap::new());
        let segments = self.segments_in(&fragment.id, bound, fragment.namespace.as_ref())?;
        let remaps = self.remaps_in(bound, &fragment.remaps)?;
        let scope = self.arena.enter(bound, segments, BTreeMap::new(), remaps);

        let _span = debug_span!("fragment", id = %fragment.id).entered();
        debug!(namespace = %self.arena.qualified_namespace(scope), "fragment activated");

        // 4) Body.
        self.chain.push(fragment.id.clone());
        let items = self.block(fragment, scope, &fragment.directives)?;
        self.chain.pop();

        Ok(Some(ResolvedBlock {
            origin: BlockOrigin::Fragment(fragment.id.clone()),
            scope,
            items,
        }))
    }

    /// Resolve one fragment or group body.
    ///
    /// Parameter layers are collected first, in declaration order, so every
    /// node of the body sees the same layers wherever it is declared. Remap
    /// directives only affect the siblings that follow them.
    fn block(
        &mut self,
        fragment: &'c Fragment,
        mut scope: ScopeId,
        directives: &'c [Directive],
    ) -> Result<Vec<ResolvedItem>> {
        for directive in directives {
            if let Directive::SetParam(sp) = directive
                && let Some(next) = self.set_param(fragment, scope, sp)?
            {
                scope = next;
            }
        }

        let mut items = Vec::new();
        for directive in directives {
            match directive {
                Directive::SetParam(_) => {}
                Directive::Remap(r) => {
                    if self.holds_in(scope, r.condition.as_ref())? {
                        let table = self.remaps_in(scope, std::slice::from_ref(&r.remap))?;
                        scope = self.arena.enter(scope, Vec::new(), BTreeMap::new(), table);
                    } else {
                        debug!(from = %r.remap.from.source, "remap skipped, condition is false");
                    }
                }
                Directive::Group(g) => {
                    if let Some(block) = self.group(fragment, scope, g)? {
                        items.push(ResolvedItem::Block(block));
                    }
                }
                Directive::Include(inc) => {
                    if let Some(block) = self.include(scope, inc)? {
                        items.push(ResolvedItem::Block(block));
                    }
                }
                Directive::Node(n) => {
                    if let Some(node) = self.node(fragment, scope, n)? {
                        items.push(ResolvedItem::Node(node));
                    }
                }
            }
        }
        Ok(items)
    }

    fn set_param(
        &mut self,
        fragment: &Fragment,
        scope: ScopeId,
        sp: &SetParamDecl,
    ) -> Result<Option<ScopeId>> {
        if !self.holds_in(scope, sp.condition.as_ref())? {
            debug!("parameter layer skipped, condition is false");
            return Ok(None);
        }
        let bindings = self.arena.bindings(scope);
        let (source, values) = match &sp.source {
            ParamSource::File(path) => {
                let path = render(path, &bindings)?;
                let table = self.catalog.param_file(&path)?;
                (path, table.render(&bindings)?)
            }
            ParamSource::Inline(table) => {
                (format!("inline:{}", fragment.id), table.render(&bindings)?)
            }
        };
        let mut namespace = self.arena.namespace(scope).to_vec();
        namespace.extend(self.segments_in(&fragment.id, scope, sp.namespace.as_ref())?);
        debug!(%source, keys = values.len(), "parameter layer applied");
        let layer = ParamOverlayLayer {
            source,
            namespace,
            values,
        };
        Ok(Some(self.arena.push_layer(scope, layer)))
    }

    fn group(
        &mut self,
        fragment: &'c Fragment,
        scope: ScopeId,
        g: &'c GroupDecl,
    ) -> Result<Option<ResolvedBlock>> {
        if !self.holds_in(scope, g.condition.as_ref())? {
            debug!("group skipped, condition is false");
            return Ok(None);
        }
        let segments = self.segments_in(&fragment.id, scope, g.namespace.as_ref())?;
        let remaps = self.remaps_in(scope, &g.remaps)?;
        let child = self.arena.enter(scope, segments, BTreeMap::new(), remaps);
        let items = self.block(fragment, child, &g.directives)?;
        Ok(Some(ResolvedBlock {
            origin: BlockOrigin::Group,
            scope: child,
            items,
        }))
    }

    fn include(&mut self, scope: ScopeId, inc: &'c IncludeDecl) -> Result<Option<ResolvedBlock>> {
        let target = FragmentId::new(self.render_in(scope, &inc.fragment)?);
        let fragment = self.catalog.fragment(&target)?;
        let names: Vec<&str> = inc.args.keys().map(String::as_str).collect();
        self.activate(fragment, scope, &names, inc.condition.as_ref(), |r| {
            let mut supplied = BTreeMap::new();
            for (name, value) in &inc.args {
                supplied.insert(name.clone(), r.render_in(scope, value)?);
            }
            Ok(supplied)
        })
    }

    fn node(
        &self,
        fragment: &Fragment,
        scope: ScopeId,
        n: &NodeDecl,
    ) -> Result<Option<NodeCandidate>> {
        if !self.holds_in(scope, n.condition.as_ref())? {
            debug!(executable = %n.executable.source, "node omitted, condition is false");
            return Ok(None);
        }
        let bindings = self.arena.bindings(scope);
        let executable = ExecutableId {
            package: render(&n.package, &bindings)?,
            executable: render(&n.executable, &bindings)?,
            name: n.name.as_ref().map(|t| render(t, &bindings)).transpose()?,
        };
        Ok(Some(NodeCandidate {
            fragment: fragment.id.clone(),
            scope,
            namespace: self.segments_in(&fragment.id, scope, n.namespace.as_ref())?,
            parameters: n.parameters.render(&bindings)?,
            remaps: self.remaps_in(scope, &n.remaps)?,
            arguments: n
                .arguments
                .iter()
                .map(|a| render(a, &bindings))
                .collect::<Result<Vec<_>>>()?,
            executable,
        }))
    }
}
