//! Declarative launch composition for simulation training fleets.
//!
//! A catalog of fragments (arguments, conditionals, includes, namespaces,
//! remaps, parameter layers) resolves into an ordered, conflict-free list of
//! processes to start.

pub mod driver;
pub mod error;
pub mod expr;
pub mod fragment;
pub mod params;
pub mod plan;
pub mod render;
pub mod resolve;
pub mod scope;
pub mod settings;

pub use driver::{Composer, DEFAULT_INSTANCE_ARG, instance_ids};
pub use error::{LaunchError, Result};
pub use fragment::{Catalog, FragmentId};
pub use plan::{ExecutableId, Plan, ProcessSpec};
