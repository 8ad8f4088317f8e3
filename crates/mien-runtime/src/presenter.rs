//! Events produced for the UI presenter.
//!
//! The runtime never renders anything itself; it pushes status and
//! expression updates over a channel the embedding application consumes.

use mien_core::ExpressionCategory;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// The expression indicator's next rendering instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionSignal {
    /// Show this category. `changed` is false when only the confidence
    /// moved, letting the UI skip change-only animations.
    Detected {
        category: ExpressionCategory,
        confidence_percent: f32,
        changed: bool,
    },
    /// A frame was scored but contained no face.
    NoFace,
    /// Hide the indicator (low confidence, or detection stopped).
    Hidden,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PresenterEvent {
    Status {
        text: String,
        severity: Severity,
        visible: bool,
    },
    Expression(ExpressionSignal),
}

impl PresenterEvent {
    pub fn info(text: impl Into<String>) -> Self {
        PresenterEvent::Status {
            text: text.into(),
            severity: Severity::Info,
            visible: true,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        PresenterEvent::Status {
            text: text.into(),
            severity: Severity::Error,
            visible: true,
        }
    }

    /// Clear and hide the status line.
    pub fn status_hidden() -> Self {
        PresenterEvent::Status {
            text: String::new(),
            severity: Severity::Info,
            visible: false,
        }
    }
}

/// Channel pair the embedding application hands to the orchestrator.
pub fn presenter_channel(capacity: usize) -> (mpsc::Sender<PresenterEvent>, mpsc::Receiver<PresenterEvent>) {
    mpsc::channel(capacity)
}
