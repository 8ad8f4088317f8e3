//! Classification capability trait.
//!
//! The expression classifier is an external capability: the runtime never
//! assumes anything about its internals, only that its library and model
//! weights can be loaded from a source location and that it can score a
//! single frame. Implementations are injected into the runtime, which
//! makes the whole detection pipeline testable with a mock.

use crate::types::{DetectOptions, Detection, VideoFrame};
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("library load failed: {0}")]
    LibraryLoad(String),
    #[error("model set load failed: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

/// An injected expression-classification capability.
///
/// Loading is split from readiness on purpose: a load can report transport
/// success while the capability still is not usable (the original failure
/// mode this runtime guards against), so callers must confirm with
/// [`library_ready`](Self::library_ready) / [`models_ready`](Self::models_ready)
/// before treating a source as good.
///
/// All futures are `Send` so the detection loop can run as a spawned task.
pub trait ExpressionClassifier: Send + Sync + 'static {
    /// Load the classification library from the given location
    /// (filesystem path or URL).
    fn load_library(
        &self,
        location: &str,
    ) -> impl Future<Output = Result<(), ClassifierError>> + Send;

    /// True once the library capability is actually usable.
    fn library_ready(&self) -> bool;

    /// Load the model weight sets from the given base location.
    fn load_model_set(
        &self,
        base_location: &str,
    ) -> impl Future<Output = Result<(), ClassifierError>> + Send;

    /// True once the model weights are actually usable.
    fn models_ready(&self) -> bool;

    /// Score a single frame. `Ok(None)` means no face was found, which is
    /// distinct from both low confidence and failure.
    fn detect(
        &self,
        frame: &VideoFrame,
        options: &DetectOptions,
    ) -> impl Future<Output = Result<Option<Detection>, ClassifierError>> + Send;
}
