//! Catalog of supported releases, targets, and option flags (§4.A).
//!
//! The catalog is read-mostly, process-wide state: pure validation/resolution
//! functions over an immutable snapshot ([`snapshot::TargetsDef`]), published
//! by atomic pointer swap ([`refresh::Catalog`]) so readers never block on a
//! refresh in flight.

pub mod refresh;
pub mod snapshot;

pub use refresh::{Catalog, RemoteShaResolver, REFRESH_INTERVAL};
pub use snapshot::{
    nightly_version, render_extra_options, CatalogLoadError, OptionFlagDef, Release, Target,
    TargetsDef, NIGHTLY_REF,
};
