//! On-disk fragment shape (`*.launch.yaml` / `*.launch.json`).
//!
//! YAML shape:
//!
//! ```yaml
//! description: one simulated training environment
//! namespace: "$(arg ns)"            # optional, appended to the parent namespace
//! args:
//!   - name: ns
//!   - name: robot
//!     default: burger
//!   - name: map_file
//!     required_unless: "use_random_map"
//! remap:                            # in force for the whole fragment
//!   - { from: scan, to: "$(arg ns)/scan" }
//! actions:
//!   - set_param: { file: "params/common.yaml" }
//!   - set_param: { values: { max_speed: 1.5 }, if: "robot == 'burger'" }
//!   - remap: { from: odom, to: odometry }
//!   - group:
//!       namespace: nav
//!       actions: [ ... ]
//!   - include: { fragment: "nav/stack.launch.yaml", args: { robot: "$(arg robot)" } }
//!   - node: { package: arena_sim, executable: simulator, name: sim }
//! ```
//!
//! Each action is a single-key mapping naming the directive. We parse into
//! these raw structs first, then validate into the [`Fragment`] model.

use crate::error::{LaunchError, Result};
use crate::expr::{Condition, Template, is_valid_name, parse_condition, parse_template};
use crate::fragment::FragmentId;
use crate::fragment::model::{
    ArgumentDeclaration, Directive, Fragment, GroupDecl, IncludeDecl, NodeDecl, ParamSource,
    RemapDecl, RemapDirective, SetParamDecl,
};
use crate::params::ParamTable;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawFragment {
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub args: Vec<RawArg>,

    #[serde(default)]
    pub remap: Vec<RawRemap>,

    #[serde(default)]
    pub actions: Vec<RawDirective>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawArg {
    pub name: String,

    #[serde(default)]
    pub default: Option<ScalarText>,

    #[serde(default)]
    pub required_unless: Option<String>,

    #[serde(default)]
    pub description: Option<String>,
}

/// A YAML/JSON scalar read as text. Launch arguments are strings, but
/// `default: 4` or `use_sim: true` are accepted as written.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarText(pub String);

impl<'de> Deserialize<'de> for ScalarText {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Scalar {
            Bool(bool),
            Int(i64),
            Float(f64),
            Str(String),
        }

        Ok(ScalarText(match Scalar::deserialize(deserializer)? {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(x) => x.to_string(),
            Scalar::Str(s) => s,
        }))
    }
}

/// Remap entries: `{ from: a, to: b }` or the short `[a, b]` pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawRemap {
    Pair([String; 2]),
    Explicit {
        from: String,
        to: String,
        #[serde(default, rename = "if")]
        when: Option<String>,
        #[serde(default)]
        unless: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub enum RawDirective {
    SetParam(RawSetParam),
    Group(RawGroup),
    Include(RawInclude),
    Node(RawNode),
    Remap(RawRemap),
}

impl<'de> Deserialize<'de> for RawDirective {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Decode the single-key mapping generically first so that a typo in
        // the payload reports which directive it belongs to.
        let map = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        if map.len() != 1 {
            let keys: Vec<&String> = map.keys().collect();
            return Err(de::Error::custom(format!(
                "an action must have exactly one directive key, found {:?}",
                keys
            )));
        }
        let Some((kind, payload)) = map.into_iter().next() else {
            return Err(de::Error::custom("empty action"));
        };

        fn payload_of<T: DeserializeOwned, E: de::Error>(
            kind: &str,
            payload: serde_json::Value,
        ) -> std::result::Result<T, E> {
            serde_json::from_value(payload).map_err(|e| E::custom(format!("in {}: {}", kind, e)))
        }

        match kind.as_str() {
            "set_param" => Ok(RawDirective::SetParam(payload_of::<_, D::Error>(&kind, payload)?)),
            "group" => Ok(RawDirective::Group(payload_of::<_, D::Error>(&kind, payload)?)),
            "include" => Ok(RawDirective::Include(payload_of::<_, D::Error>(&kind, payload)?)),
            "node" => Ok(RawDirective::Node(payload_of::<_, D::Error>(&kind, payload)?)),
            "remap" => Ok(RawDirective::Remap(payload_of::<_, D::Error>(&kind, payload)?)),
            other => Err(de::Error::custom(format!(
                "unknown directive '{}' (expected set_param, group, include, node or remap)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSetParam {
    #[serde(default)]
    pub file: Option<String>,

    #[serde(default)]
    pub values: Option<serde_json::Value>,

    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default, rename = "if")]
    pub when: Option<String>,

    #[serde(default)]
    pub unless: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawGroup {
    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub remap: Vec<RawRemap>,

    #[serde(default, rename = "if")]
    pub when: Option<String>,

    #[serde(default)]
    pub unless: Option<String>,

    #[serde(default)]
    pub actions: Vec<RawDirective>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawInclude {
    pub fragment: String,

    #[serde(default)]
    pub args: BTreeMap<String, ScalarText>,

    #[serde(default, rename = "if")]
    pub when: Option<String>,

    #[serde(default)]
    pub unless: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawNode {
    pub package: String,

    pub executable: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub parameters: Option<serde_json::Value>,

    #[serde(default)]
    pub remap: Vec<RawRemap>,

    #[serde(default)]
    pub args: Vec<ScalarText>,

    #[serde(default, rename = "if")]
    pub when: Option<String>,

    #[serde(default)]
    pub unless: Option<String>,
}

/// Per-fragment validation context: wraps every problem with the fragment id.
struct Validator<'a> {
    id: &'a FragmentId,
}

impl Validator<'_> {
    fn invalid(&self, message: impl Into<String>) -> LaunchError {
        LaunchError::InvalidFragment {
            fragment: self.id.clone(),
            message: message.into(),
        }
    }

    fn template(&self, text: &str) -> Result<Template> {
        parse_template(text).map_err(|e| self.invalid(e.to_string()))
    }

    fn opt_template(&self, text: Option<&str>) -> Result<Option<Template>> {
        text.map(|t| self.template(t)).transpose()
    }

    fn condition(&self, when: Option<&str>, unless: Option<&str>) -> Result<Option<Condition>> {
        parse_condition(when, unless).map_err(|e| self.invalid(e.to_string()))
    }

    fn params(&self, doc: Option<&serde_json::Value>, what: &str) -> Result<ParamTable> {
        match doc {
            None => Ok(ParamTable::default()),
            Some(doc) => {
                ParamTable::from_json(doc).map_err(|e| self.invalid(format!("{}: {}", what, e)))
            }
        }
    }

    fn remaps(&self, raw: &[RawRemap]) -> Result<Vec<RemapDecl>> {
        raw.iter()
            .map(|r| match r {
                RawRemap::Pair([from, to]) => self.remap(from, to),
                RawRemap::Explicit {
                    from,
                    to,
                    when,
                    unless,
                } => {
                    if when.is_some() || unless.is_some() {
                        return Err(self.invalid(format!(
                            "remap {} -> {}: conditions are only allowed on remap actions",
                            from, to
                        )));
                    }
                    self.remap(from, to)
                }
            })
            .collect()
    }

    fn remap(&self, from: &str, to: &str) -> Result<RemapDecl> {
        if from.trim().is_empty() {
            return Err(self.invalid("remap with empty 'from'"));
        }
        Ok(RemapDecl {
            from: self.template(from)?,
            to: self.template(to)?,
        })
    }

    fn directives(&self, raw: &[RawDirective]) -> Result<Vec<Directive>> {
        raw.iter().map(|d| self.directive(d)).collect()
    }

    fn directive(&self, raw: &RawDirective) -> Result<Directive> {
        Ok(match raw {
            RawDirective::SetParam(sp) => {
                let source = match (&sp.file, &sp.values) {
                    (Some(file), None) => ParamSource::File(self.template(file)?),
                    (None, Some(values)) => {
                        ParamSource::Inline(self.params(Some(values), "set_param values")?)
                    }
                    _ => {
                        return Err(
                            self.invalid("set_param needs exactly one of 'file' or 'values'")
                        );
                    }
                };
                Directive::SetParam(SetParamDecl {
                    source,
                    namespace: self.opt_template(sp.namespace.as_deref())?,
                    condition: self.condition(sp.when.as_deref(), sp.unless.as_deref())?,
                })
            }
            RawDirective::Group(g) => Directive::Group(GroupDecl {
                namespace: self.opt_template(g.namespace.as_deref())?,
                remaps: self.remaps(&g.remap)?,
                condition: self.condition(g.when.as_deref(), g.unless.as_deref())?,
                directives: self.directives(&g.actions)?,
            }),
            RawDirective::Include(inc) => {
                if inc.fragment.trim().is_empty() {
                    return Err(self.invalid("include with empty 'fragment'"));
                }
                let mut args = BTreeMap::new();
                for (name, value) in &inc.args {
                    if !is_valid_name(name) {
                        return Err(self.invalid(format!(
                            "include of {}: invalid argument name {:?}",
                            inc.fragment, name
                        )));
                    }
                    args.insert(name.clone(), self.template(&value.0)?);
                }
                Directive::Include(IncludeDecl {
                    fragment: self.template(inc.fragment.trim())?,
                    args,
                    condition: self.condition(inc.when.as_deref(), inc.unless.as_deref())?,
                })
            }
            RawDirective::Node(n) => {
                if n.package.trim().is_empty() || n.executable.trim().is_empty() {
                    return Err(self.invalid("node needs a non-empty package and executable"));
                }
                let what = format!("parameters of node {}/{}", n.package, n.executable);
                Directive::Node(NodeDecl {
                    package: self.template(n.package.trim())?,
                    executable: self.template(n.executable.trim())?,
                    name: self.opt_template(n.name.as_deref())?,
                    namespace: self.opt_template(n.namespace.as_deref())?,
                    parameters: self.params(n.parameters.as_ref(), &what)?,
                    remaps: self.remaps(&n.remap)?,
                    arguments: n
                        .args
                        .iter()
                        .map(|a| self.template(&a.0))
                        .collect::<Result<Vec<_>>>()?,
                    condition: self.condition(n.when.as_deref(), n.unless.as_deref())?,
                })
            }
            RawDirective::Remap(r) => {
                let (from, to, when, unless) = match r {
                    RawRemap::Pair([from, to]) => (from, to, None, None),
                    RawRemap::Explicit {
                        from,
                        to,
                        when,
                        unless,
                    } => (from, to, when.as_deref(), unless.as_deref()),
                };
                Directive::Remap(RemapDirective {
                    remap: self.remap(from, to)?,
                    condition: self.condition(when, unless)?,
                })
            }
        })
    }
}

impl RawFragment {
    /// Validate a raw fragment and build the immutable model:
    /// - argument names are valid and unique
    /// - every template and condition parses
    /// - directive payloads are complete
    pub fn validate_and_build(&self, id: FragmentId) -> Result<Fragment> {
        let v = Validator { id: &id };

        let mut seen = BTreeSet::new();
        let mut args = Vec::with_capacity(self.args.len());
        for raw in &self.args {
            if !is_valid_name(&raw.name) {
                return Err(v.invalid(format!("invalid argument name {:?}", raw.name)));
            }
            if !seen.insert(raw.name.as_str()) {
                return Err(v.invalid(format!("duplicate argument '{}'", raw.name)));
            }
            args.push(ArgumentDeclaration {
                name: raw.name.clone(),
                default: raw
                    .default
                    .as_ref()
                    .map(|d| v.template(&d.0))
                    .transpose()?,
                required_unless: v.condition(raw.required_unless.as_deref(), None)?,
                description: raw.description.clone(),
            });
        }

        Ok(Fragment {
            namespace: v.opt_template(self.namespace.as_deref())?,
            remaps: v.remaps(&self.remap)?,
            directives: v.directives(&self.actions)?,
            description: self.description.clone(),
            args,
            id,
        })
    }
}
