//! Source-cascade loading with per-source verification and fallback.
//!
//! The loader walks an ordered list of candidate sources and stops at the
//! first one that leaves the classifier capability verifiably usable. A
//! "loaded OK" report from a source is not trusted on its own: the
//! capability must confirm readiness, otherwise the source is treated as
//! failed and the cascade advances.
//!
//! Results are cached once per asset type for the lifetime of the loader:
//! concurrent callers share the in-flight attempt, a success is never
//! reloaded, and a failure leaves the cache empty so the next call can
//! retry the cascade from scratch.

use crate::source::{is_remote, Source, SourceCatalog};
use mien_core::ExpressionClassifier;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::OnceCell;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("no asset sources configured")]
    NoSources,
    #[error("library load failed after trying {attempted} source(s): {last_error}")]
    LibraryLoad { attempted: usize, last_error: String },
    #[error("model load failed after trying {attempted} source(s): {last_error}")]
    ModelLoad { attempted: usize, last_error: String },
}

/// The source a given asset type was successfully loaded from.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub id: String,
    pub location: String,
}

/// Snapshot of the loader's cache, for diagnostics.
#[derive(Debug, Clone)]
pub struct AssetStatus {
    pub library: Option<ResolvedSource>,
    pub library_error: Option<String>,
    pub models: Option<ResolvedSource>,
    pub models_error: Option<String>,
}

pub struct AssetLoader<C> {
    classifier: Arc<C>,
    library_sources: Vec<Source>,
    model_sources: Vec<Source>,
    manifests: Vec<String>,
    http: reqwest::Client,
    library: OnceCell<ResolvedSource>,
    models: OnceCell<ResolvedSource>,
    last_library_error: Mutex<Option<String>>,
    last_models_error: Mutex<Option<String>>,
}

impl<C: ExpressionClassifier> AssetLoader<C> {
    pub fn new(classifier: Arc<C>, catalog: &SourceCatalog, manifests: Vec<String>) -> Self {
        Self {
            classifier,
            library_sources: catalog.library_sources(),
            model_sources: catalog.model_sources(),
            manifests,
            http: reqwest::Client::new(),
            library: OnceCell::new(),
            models: OnceCell::new(),
            last_library_error: Mutex::new(None),
            last_models_error: Mutex::new(None),
        }
    }

    /// Ensure the classification library is loaded, walking the cascade on
    /// first use. Idempotent once resolved.
    pub async fn ensure_library(&self) -> Result<ResolvedSource, AssetError> {
        self.library
            .get_or_try_init(|| self.library_cascade())
            .await
            .cloned()
    }

    /// Ensure the model weight sets are loaded. Sources are probed for
    /// manifest availability before a full load attempt; a failed probe
    /// silently advances the cascade.
    pub async fn ensure_models(&self) -> Result<ResolvedSource, AssetError> {
        self.models
            .get_or_try_init(|| self.models_cascade())
            .await
            .cloned()
    }

    async fn library_cascade(&self) -> Result<ResolvedSource, AssetError> {
        if self.library_sources.is_empty() {
            return Err(AssetError::NoSources);
        }

        let mut last_error = String::new();
        for source in &self.library_sources {
            tracing::info!(source = %source.id, location = %source.location, "loading classification library");
            match self.classifier.load_library(&source.location).await {
                Ok(()) if self.classifier.library_ready() => {
                    tracing::info!(source = %source.id, "classification library ready");
                    *self.last_library_error.lock().unwrap_or_else(|e| e.into_inner()) = None;
                    return Ok(ResolvedSource {
                        id: source.id.clone(),
                        location: source.location.clone(),
                    });
                }
                Ok(()) => {
                    // Transport succeeded but the capability never appeared.
                    last_error = format!("source {}: library loaded but capability absent", source.id);
                    tracing::warn!(source = %source.id, "library reported loaded but capability is absent; trying next source");
                }
                Err(e) => {
                    last_error = format!("source {}: {e}", source.id);
                    tracing::warn!(source = %source.id, error = %e, "library load failed; trying next source");
                }
            }
        }

        *self.last_library_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(last_error.clone());
        Err(AssetError::LibraryLoad {
            attempted: self.library_sources.len(),
            last_error,
        })
    }

    async fn models_cascade(&self) -> Result<ResolvedSource, AssetError> {
        if self.model_sources.is_empty() {
            return Err(AssetError::NoSources);
        }

        let mut last_error = String::new();
        for source in &self.model_sources {
            if !probe_model_base(&self.http, &source.location, &self.manifests).await {
                // Probe misses are expected for absent local mirrors; only
                // cascade exhaustion is an error.
                last_error = format!("source {}: manifest probe failed", source.id);
                tracing::debug!(source = %source.id, location = %source.location, "manifest probe failed; trying next source");
                continue;
            }

            tracing::info!(source = %source.id, location = %source.location, "loading model weight sets");
            match self.classifier.load_model_set(&source.location).await {
                Ok(()) if self.classifier.models_ready() => {
                    tracing::info!(source = %source.id, "model weight sets ready");
                    *self.last_models_error.lock().unwrap_or_else(|e| e.into_inner()) = None;
                    return Ok(ResolvedSource {
                        id: source.id.clone(),
                        location: source.location.clone(),
                    });
                }
                Ok(()) => {
                    last_error = format!("source {}: models loaded but capability absent", source.id);
                    tracing::warn!(source = %source.id, "models reported loaded but capability is absent; trying next source");
                }
                Err(e) => {
                    last_error = format!("source {}: {e}", source.id);
                    tracing::warn!(source = %source.id, error = %e, "model load failed; trying next source");
                }
            }
        }

        *self.last_models_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(last_error.clone());
        Err(AssetError::ModelLoad {
            attempted: self.model_sources.len(),
            last_error,
        })
    }

    /// Current cache state, for status reporting.
    pub fn status(&self) -> AssetStatus {
        AssetStatus {
            library: self.library.get().cloned(),
            library_error: self
                .last_library_error
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            models: self.models.get().cloned(),
            models_error: self
                .last_models_error
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }
}

/// Lightweight existence check for a model source: every manifest must be
/// present. HEAD request for remote bases, filesystem metadata for paths.
/// An empty manifest list makes the probe trivially pass.
pub async fn probe_model_base(http: &reqwest::Client, base: &str, manifests: &[String]) -> bool {
    for manifest in manifests {
        let target = join_location(base, manifest);
        let present = if is_remote(base) {
            match http.head(&target).send().await {
                Ok(resp) => resp.status().is_success(),
                Err(e) => {
                    tracing::debug!(url = %target, error = %e, "HEAD probe failed");
                    false
                }
            }
        } else {
            tokio::fs::metadata(Path::new(&target))
                .await
                .map(|m| m.is_file())
                .unwrap_or(false)
        };
        if !present {
            return false;
        }
    }
    true
}

/// Join a base location (path or URL) with a relative entry.
pub(crate) fn join_location(base: &str, rel: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), rel.trim_start_matches('/'))
}
