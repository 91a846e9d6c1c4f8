// Library interface for ghostrun
// This allows integration tests to access internal modules

pub mod collector;
pub mod errors;
pub mod geo;
pub mod session;
pub mod telemetry;
pub mod writer;

// Re-export commonly used types
pub use errors::GhostrunError;
pub use session::{RunRecord, RunStatus, RunningSession, SessionConfig, SessionUpdate};
pub use telemetry::{RawRunData, Telemetry};
