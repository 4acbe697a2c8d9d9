//! Progress reporting for pipeline runs.
//!
//! The worker reports stage percentages through [`ProgressCallback`]; how
//! that is rendered (terminal bars, logs, nothing) is the caller's choice.

use std::sync::{Arc, Mutex};

/// Receives progress updates from a running pipeline.
///
/// Implementations must be `Send + Sync` because the worker runs on a
/// blocking thread while the caller keeps the handle.
pub trait ProgressCallback: Send + Sync {
    /// Sets the total number of units (100 for percentage reporting).
    fn set_total(&self, total: u64);

    /// Sets the absolute position.
    fn set_position(&self, pos: u64);

    /// Advances by `delta` units.
    fn inc(&self, delta: u64);

    /// Replaces the status message.
    fn set_message(&self, msg: String);

    /// Completes the indicator with a final message.
    fn finish(&self, msg: String);

    /// Completes the indicator and removes it.
    fn finish_and_clear(&self);

    /// Reports an overall percentage together with a status message.
    fn set_percent(&self, percent: u8, msg: String) {
        self.set_position(u64::from(percent.min(100)));
        self.set_message(msg);
    }
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _pos: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

/// Keeps every reported position and message, for inspection after a run.
#[derive(Default)]
pub struct RecordingProgress {
    positions: Mutex<Vec<u64>>,
    messages: Mutex<Vec<String>>,
}

impl RecordingProgress {
    /// Positions in the order they were reported.
    #[must_use]
    pub fn positions(&self) -> Vec<u64> {
        self.positions.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Messages in the order they were reported.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    fn push_position(&self, pos: u64) {
        if let Ok(mut positions) = self.positions.lock() {
            positions.push(pos);
        }
    }

    fn push_message(&self, msg: String) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(msg);
        }
    }
}

impl ProgressCallback for RecordingProgress {
    fn set_total(&self, _total: u64) {}

    fn set_position(&self, pos: u64) {
        self.push_position(pos);
    }

    fn inc(&self, delta: u64) {
        let last = self.positions().last().copied().unwrap_or(0);
        self.push_position(last + delta);
    }

    fn set_message(&self, msg: String) {
        self.push_message(msg);
    }

    fn finish(&self, msg: String) {
        self.push_message(msg);
    }

    fn finish_and_clear(&self) {}
}
