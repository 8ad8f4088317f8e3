//! Top-expression selection with display hysteresis.
//!
//! Reduces a per-category score map to a single best category, applies a
//! confidence threshold, and tracks what was last shown so callers can
//! react only to changes instead of re-rendering on every frame.

use crate::types::{ExpressionCategory, ExpressionScores};

/// What to do when a face is present but no category clears the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowConfidencePolicy {
    /// Hide the expression indicator.
    Hide,
    /// Keep the last shown category visible.
    Fallback,
}

#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig {
    /// Minimum score for a category to be displayed at all.
    pub confidence_threshold: f32,
    pub low_confidence: LowConfidencePolicy,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.2,
            low_confidence: LowConfidencePolicy::Hide,
        }
    }
}

/// The winning category of one score map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopExpression {
    pub category: ExpressionCategory,
    pub score: f32,
}

impl TopExpression {
    pub fn confidence_percent(&self) -> f32 {
        self.score * 100.0
    }
}

/// Outcome of observing one detection result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExpressionUpdate {
    /// A category cleared the threshold. `changed` is true when it differs
    /// from the previously displayed category (or nothing was displayed).
    Expression { top: TopExpression, changed: bool },
    /// A face was present but every score fell below the threshold.
    LowConfidence,
    /// No face in the frame. Rendered differently from low confidence.
    NoFace,
}

pub struct ExpressionAggregator {
    config: AggregatorConfig,
    last_displayed: Option<ExpressionCategory>,
}

impl ExpressionAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            config,
            last_displayed: None,
        }
    }

    /// Pick the highest-scoring category above the threshold.
    ///
    /// Scans in the fixed enumeration order with strict-greater
    /// replacement, so ties resolve to the first category in
    /// [`ExpressionCategory::ALL`] regardless of how the input was built.
    pub fn select_top(&self, scores: &ExpressionScores) -> Option<TopExpression> {
        let mut best: Option<TopExpression> = None;
        for (category, score) in scores.iter() {
            match best {
                Some(current) if score <= current.score => {}
                _ => best = Some(TopExpression { category, score }),
            }
        }
        best.filter(|top| top.score >= self.config.confidence_threshold)
    }

    /// Feed one detection result (`None` = no face) through the hysteresis
    /// filter and report what the caller should render.
    pub fn observe(&mut self, scores: Option<&ExpressionScores>) -> ExpressionUpdate {
        let Some(scores) = scores else {
            return ExpressionUpdate::NoFace;
        };

        match self.select_top(scores) {
            Some(top) => {
                let changed = self.last_displayed != Some(top.category);
                self.last_displayed = Some(top.category);
                ExpressionUpdate::Expression { top, changed }
            }
            None => {
                if self.config.low_confidence == LowConfidencePolicy::Hide {
                    self.last_displayed = None;
                }
                ExpressionUpdate::LowConfidence
            }
        }
    }

    /// The category currently shown to the user, if any.
    pub fn last_displayed(&self) -> Option<ExpressionCategory> {
        self.last_displayed
    }

    /// Clear hysteresis state so the next result is always a change.
    pub fn reset(&mut self) {
        self.last_displayed = None;
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }
}
