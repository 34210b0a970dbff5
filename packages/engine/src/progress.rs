//! Progress reporting for analysis runs.
//!
//! The engine advances one unit per pipeline stage. Rendering is left to the
//! caller; the CLI backs this with an `indicatif` bar.

/// Receives stage-level progress from [`crate::Engine::analyze_with`].
///
/// Implementations must be `Send + Sync` so a single reporter can be shared
/// with spawned tasks.
pub trait ProgressCallback: Send + Sync {
    /// Sets the number of stages in the run.
    fn set_total(&self, total: u64);

    /// Advances by `delta` stages.
    fn inc(&self, delta: u64);

    /// Names the stage currently running.
    fn set_message(&self, msg: String);

    /// Marks the run as complete.
    fn finish(&self, msg: String);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}
