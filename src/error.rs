//! Error taxonomy for fragment loading and plan resolution.
//!
//! Every variant is a caller-visible failure. Resolution never retries and
//! never returns a partial plan: the first error aborts the whole call.

use crate::fragment::FragmentId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("unbound argument '{name}' referenced in {context}")]
    UnboundArgument { name: String, context: String },

    #[error("fragment {fragment} does not declare argument '{name}'")]
    UnknownArgument { fragment: FragmentId, name: String },

    #[error("fragment {fragment} requires argument '{name}' but none was supplied")]
    MissingRequiredArgument { fragment: FragmentId, name: String },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("cyclic include: {}", format_chain(.chain))]
    CyclicInclude { chain: Vec<FragmentId> },

    #[error("duplicate process {executable} in namespace {namespace}")]
    DuplicateProcess { namespace: String, executable: String },

    #[error("syntax error in {input:?}: {message}")]
    Syntax { input: String, message: String },

    #[error("invalid fragment {fragment}: {message}")]
    InvalidFragment { fragment: FragmentId, message: String },

    #[error("unknown fragment {0}")]
    UnknownFragment(FragmentId),

    #[error("unknown parameter file {0}")]
    UnknownParamFile(String),

    #[error("namespace {namespace} is produced by instances {first} and {second}")]
    NamespaceCollision {
        namespace: String,
        first: String,
        second: String,
    },

    #[error("cannot decode {path}: {message}")]
    Decode { path: String, message: String },

    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn format_chain(chain: &[FragmentId]) -> String {
    chain
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type Result<T> = std::result::Result<T, LaunchError>;
