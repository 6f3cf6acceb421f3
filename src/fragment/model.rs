//! Validated, immutable fragment model.
//!
//! Produced by [`RawFragment::validate_and_build`](super::RawFragment::validate_and_build);
//! every template and condition is already parsed.

use crate::expr::{Condition, Template};
use crate::fragment::FragmentId;
use crate::params::ParamTable;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Fragment {
    pub id: FragmentId,
    pub description: Option<String>,
    /// Segment(s) appended to the including scope's namespace.
    pub namespace: Option<Template>,
    pub args: Vec<ArgumentDeclaration>,
    /// Remaps in force for the whole fragment body.
    pub remaps: Vec<RemapDecl>,
    pub directives: Vec<Directive>,
}

impl Fragment {
    pub fn declaration(&self, name: &str) -> Option<&ArgumentDeclaration> {
        self.args.iter().find(|a| a.name == name)
    }

    /// Literal include targets anywhere in the body, in declaration order.
    ///
    /// Templated targets are skipped; they can only be checked while resolving.
    pub fn literal_includes(&self) -> Vec<FragmentId> {
        fn walk(directives: &[Directive], out: &mut Vec<FragmentId>) {
            for d in directives {
                match d {
                    Directive::Include(inc) if inc.fragment.is_literal() => {
                        out.push(FragmentId::new(inc.fragment.source.clone()));
                    }
                    Directive::Group(g) => walk(&g.directives, out),
                    _ => {}
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.directives, &mut out);
        out
    }
}

#[derive(Debug, Clone)]
pub struct ArgumentDeclaration {
    pub name: String,
    pub default: Option<Template>,
    /// When this holds, a missing binding leaves the argument unbound
    /// instead of failing.
    pub required_unless: Option<Condition>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RemapDecl {
    pub from: Template,
    pub to: Template,
}

#[derive(Debug, Clone)]
pub enum Directive {
    SetParam(SetParamDecl),
    Group(GroupDecl),
    Include(IncludeDecl),
    Node(NodeDecl),
    Remap(RemapDirective),
}

#[derive(Debug, Clone)]
pub enum ParamSource {
    /// Catalog path of a parameter file.
    File(Template),
    Inline(ParamTable),
}

#[derive(Debug, Clone)]
pub struct SetParamDecl {
    pub source: ParamSource,
    /// Optional sub-namespace the layer is restricted to.
    pub namespace: Option<Template>,
    pub condition: Option<Condition>,
}

#[derive(Debug, Clone)]
pub struct GroupDecl {
    pub namespace: Option<Template>,
    pub remaps: Vec<RemapDecl>,
    pub condition: Option<Condition>,
    pub directives: Vec<Directive>,
}

#[derive(Debug, Clone)]
pub struct IncludeDecl {
    pub fragment: Template,
    pub args: BTreeMap<String, Template>,
    pub condition: Option<Condition>,
}

#[derive(Debug, Clone)]
pub struct NodeDecl {
    pub package: Template,
    pub executable: Template,
    pub name: Option<Template>,
    pub namespace: Option<Template>,
    pub parameters: ParamTable,
    pub remaps: Vec<RemapDecl>,
    pub arguments: Vec<Template>,
    pub condition: Option<Condition>,
}

#[derive(Debug, Clone)]
pub struct RemapDirective {
    pub remap: RemapDecl,
    pub condition: Option<Condition>,
}
