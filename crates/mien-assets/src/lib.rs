//! mien-assets — Resilient asset acquisition.
//!
//! Resolves the classification library and its model weight sets from an
//! ordered cascade of candidate sources (local mirror first, CDN fallback),
//! caching the result for the lifetime of the process. Also hosts the
//! standalone mirroring job that populates a local source ahead of time.

pub mod loader;
pub mod mirror;
pub mod source;

pub use loader::{probe_model_base, AssetError, AssetLoader, AssetStatus, ResolvedSource};
pub use mirror::{mirror_assets, MirrorError, MirrorPlan, MirrorReport};
pub use source::{CatalogError, Source, SourceCatalog, SourceKind, SourcePair};
