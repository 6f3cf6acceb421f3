//! Fragment layer: on-disk schemas + validated in-memory structures.
//!
//! This module is intentionally separate from resolution. It owns:
//! - FragmentId (catalog identity)
//! - Raw fragment schema and its validation
//! - The catalog of loaded fragments and parameter files

pub mod catalog;
pub mod id;
pub mod model;
pub mod raw;

pub use catalog::Catalog;
pub use id::FragmentId;
pub use model::{
    ArgumentDeclaration, Directive, Fragment, GroupDecl, IncludeDecl, NodeDecl, ParamSource,
    RemapDecl, RemapDirective, SetParamDecl,
};
pub use raw::RawFragment;
