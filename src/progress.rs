//! Progress reporting
//!
//! Per-entry status updates for long-running phases. Purely
//! observational: nothing here feeds back into control flow.

use tracing::{debug, trace};

/// Sink for phase progress
pub trait Progress {
    /// A phase starts (`title` is human readable, e.g. "Validating")
    fn begin(&self, title: &str);

    /// `fraction` of the phase is done; `item` names the current entry
    fn update(&self, fraction: f32, item: &str);

    /// The phase finished with `outcome` ("done.", "error.")
    fn end(&self, outcome: &str);
}

/// Emits progress as tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl Progress for TracingProgress {
    fn begin(&self, title: &str) {
        debug!("{}", title);
    }

    fn update(&self, fraction: f32, item: &str) {
        trace!(percent = (fraction * 100.0) as u32, "{}", item);
    }

    fn end(&self, outcome: &str) {
        debug!("{}", outcome);
    }
}

/// Discards all progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn begin(&self, _title: &str) {}
    fn update(&self, _fraction: f32, _item: &str) {}
    fn end(&self, _outcome: &str) {}
}
