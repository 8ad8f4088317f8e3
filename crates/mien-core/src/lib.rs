//! mien-core — Expression detection domain types.
//!
//! Defines the closed set of expression categories, the classifier
//! capability trait consumed by the runtime, and the aggregation logic
//! that turns raw per-category scores into a stable display signal.

pub mod aggregator;
pub mod classifier;
pub mod types;

pub use aggregator::{AggregatorConfig, ExpressionAggregator, ExpressionUpdate, LowConfidencePolicy, TopExpression};
pub use classifier::{ClassifierError, ExpressionClassifier};
pub use types::{DetectOptions, Detection, ExpressionCategory, ExpressionScores, FaceBox, VideoFrame};
