//! Candidate asset sources and the ordered cascade catalog.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// CDN the default cascade falls back to when no local mirror is present.
pub const DEFAULT_CDN_BASE: &str = "https://cdn.jsdelivr.net/npm/face-api.js@0.22.2";

/// Library bundle path relative to a source base.
pub const LIBRARY_BUNDLE_PATH: &str = "dist/face-api.min.js";

/// Weight-manifest files a model source must serve to be considered usable.
pub const DEFAULT_MANIFESTS: [&str; 2] = [
    "tiny_face_detector_model-weights_manifest.json",
    "face_expression_model-weights_manifest.json",
];

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read source catalog {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse source catalog {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Library,
    ModelSet,
}

/// One candidate location for one asset type.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: String,
    pub location: String,
    pub kind: SourceKind,
}

impl Source {
    /// Remote sources are probed over HTTP; everything else is a filesystem path.
    pub fn is_remote(&self) -> bool {
        is_remote(&self.location)
    }
}

pub(crate) fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// One catalog entry: where a source serves the library bundle and where it
/// serves the model weight sets.
#[derive(Debug, Clone, Deserialize)]
pub struct SourcePair {
    pub id: String,
    pub library: String,
    pub models: String,
}

/// Ordered list of candidate sources. Order is priority order: the loader
/// walks it front to back and stops at the first source that works.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceCatalog {
    #[serde(rename = "sources")]
    pairs: Vec<SourcePair>,
}

impl SourceCatalog {
    pub fn with_pairs(pairs: Vec<SourcePair>) -> Self {
        Self { pairs }
    }

    /// Default cascade: a local mirror under `cache_dir` first, then the CDN.
    pub fn default_cascade(cache_dir: &Path) -> Self {
        Self {
            pairs: vec![
                SourcePair {
                    id: "local-mirror".into(),
                    library: cache_dir.join(LIBRARY_BUNDLE_PATH).to_string_lossy().into_owned(),
                    models: cache_dir.join("weights").to_string_lossy().into_owned(),
                },
                SourcePair {
                    id: "cdn".into(),
                    library: format!("{DEFAULT_CDN_BASE}/{LIBRARY_BUNDLE_PATH}"),
                    models: format!("{DEFAULT_CDN_BASE}/weights"),
                },
            ],
        }
    }

    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    /// Load a catalog from a TOML file (`[[sources]]` entries with
    /// `id`/`library`/`models` keys).
    pub async fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = tokio::fs::read_to_string(path).await.map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| CatalogError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[SourcePair] {
        &self.pairs
    }

    /// Library source cascade, in priority order.
    pub fn library_sources(&self) -> Vec<Source> {
        self.pairs
            .iter()
            .map(|p| Source {
                id: p.id.clone(),
                location: p.library.clone(),
                kind: SourceKind::Library,
            })
            .collect()
    }

    /// Model-set source cascade, in priority order.
    pub fn model_sources(&self) -> Vec<Source> {
        self.pairs
            .iter()
            .map(|p| Source {
                id: p.id.clone(),
                location: p.models.clone(),
                kind: SourceKind::ModelSet,
            })
            .collect()
    }
}
