//! Assessment session lifecycle — model, stop locks, and the coordinator.

pub mod coordinator;
pub mod lock;
pub mod model;
pub mod prompts;

pub use coordinator::{SessionCoordinator, StopDisposition, StopOutcome, format_transcript};
pub use lock::{StopAttempt, StopLockMap, StopState};
pub use model::{AssessmentSession, SessionStatus};
pub use prompts::tutor_system_prompt;
