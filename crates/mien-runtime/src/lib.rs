//! mien-runtime — The live detection runtime.
//!
//! Ties a camera stream, the asset loader, and an injected expression
//! classifier into a bounded-rate polling loop with explicit lifecycle:
//! create, start/stop any number of times, drop. All state is owned by
//! the orchestrator instance; nothing is ambient, so tests can run many
//! independent instances.

pub mod clock;
pub mod config;
pub mod orchestrator;
pub mod presenter;
pub mod stream;

pub use clock::{FrameClock, RefreshClock};
pub use config::RuntimeConfig;
pub use orchestrator::{DetectionState, Orchestrator, OrchestratorOptions, StartError};
pub use presenter::{presenter_channel, ExpressionSignal, PresenterEvent, Severity};
pub use stream::{FramePoll, StreamManager};
