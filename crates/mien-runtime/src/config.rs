use crate::orchestrator::OrchestratorOptions;
use mien_assets::{CatalogError, SourceCatalog};
use mien_core::{AggregatorConfig, DetectOptions, LowConfidencePolicy};
use mien_hw::StreamConstraints;
use std::path::PathBuf;

/// Runtime configuration, loaded from environment variables.
pub struct RuntimeConfig {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Detection ticks per second.
    pub tick_hz: u32,
    /// Minimum category score for display.
    pub confidence_threshold: f32,
    /// What to render when no category clears the threshold.
    pub low_confidence: LowConfidencePolicy,
    /// Directory holding the local asset mirror.
    pub cache_dir: PathBuf,
    /// Optional TOML source catalog overriding the default cascade.
    pub sources_file: Option<PathBuf>,
    /// Per-frame detection options forwarded to the classifier.
    pub detect: DetectOptions,
    /// Camera acquisition constraints.
    pub constraints: StreamConstraints,
}

impl RuntimeConfig {
    /// Load configuration from `MIEN_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let cache_dir = std::env::var("MIEN_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_cache_dir());

        Self {
            camera_device: std::env::var("MIEN_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            tick_hz: env_u32("MIEN_TICK_HZ", 30),
            confidence_threshold: env_f32("MIEN_CONFIDENCE_THRESHOLD", 0.2),
            low_confidence: match std::env::var("MIEN_LOW_CONFIDENCE").as_deref() {
                Ok("fallback") => LowConfidencePolicy::Fallback,
                _ => LowConfidencePolicy::Hide,
            },
            cache_dir,
            sources_file: std::env::var("MIEN_SOURCES_FILE").map(PathBuf::from).ok(),
            detect: DetectOptions {
                input_size: env_u32("MIEN_DETECT_INPUT_SIZE", 224),
                face_score_threshold: env_f32("MIEN_FACE_SCORE_THRESHOLD", 0.5),
            },
            constraints: StreamConstraints {
                width: env_u32("MIEN_CAPTURE_WIDTH", 640),
                height: env_u32("MIEN_CAPTURE_HEIGHT", 360),
                ..StreamConstraints::default()
            },
        }
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            confidence_threshold: self.confidence_threshold,
            low_confidence: self.low_confidence,
        }
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            aggregator: self.aggregator_config(),
            detect: self.detect,
            constraints: self.constraints.clone(),
            ..OrchestratorOptions::default()
        }
    }

    /// Resolve the source catalog: the configured TOML file if set,
    /// otherwise local-mirror-then-CDN.
    pub async fn source_catalog(&self) -> Result<SourceCatalog, CatalogError> {
        match &self.sources_file {
            Some(path) => SourceCatalog::load(path).await,
            None => Ok(SourceCatalog::default_cascade(&self.cache_dir)),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    std::env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".cache")
        })
        .join("mien")
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
