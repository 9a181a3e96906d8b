#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

pub mod apps;
pub mod cache;
pub mod error;
pub mod events;
/// Path helpers shared by the parser, the registry and the navigator.
pub mod helpers;
pub mod lazy;
pub mod location;
pub mod matcher;
/// The handle applications use to drive the router.
pub mod navigator;
pub mod query;
/// Router configuration, in builder and data form.
pub mod router_cfg;
pub mod routes;
/// The navigation controller.
pub mod service;

/// The routing information the router exposes.
pub mod state;

/// A collection of useful items most applications might need.
pub mod prelude {
    pub use crate::apps::*;
    pub use crate::error::{LoadError, RouterError};
    pub use crate::events::*;
    pub use crate::lazy::{AppLoader, LoadOperation, LoadedSet, ModuleLoader, NoopLoader};
    pub use crate::location::{parse_location, Location, Locations};
    pub use crate::matcher::{CompiledPattern, Params, PathMatcher, PatternCompiler, UrlPatternCompiler};
    pub use crate::navigator::Navigator;
    pub use crate::query::QueryString;
    pub use crate::router_cfg::*;
    pub use crate::routes::*;
    pub use crate::service::RouterService;
    pub use crate::state::*;
    pub use mosaic_history::{History, MemoryHistory};
}
