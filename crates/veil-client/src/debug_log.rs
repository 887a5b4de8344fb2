//! Bounded diagnostic recorder.
//!
//! Append-only ring buffer keeping the most recent entries. Diagnostics only:
//! nothing in the controller reads it back into control flow.

use std::collections::VecDeque;

/// Default number of retained entries.
pub const DEFAULT_CAPACITY: usize = 100;

/// Bounded ring-buffer logger for session diagnostics.
///
/// Best-effort failures (registration, debug snapshots, queue-leave, poll
/// ticks, channel errors) and stale-response drops land here so they can be
/// inspected without ever blocking or corrupting session state.
#[derive(Debug, Clone)]
pub struct DebugRecorder {
    entries: VecDeque<String>,
    capacity: usize,
}

impl DebugRecorder {
    /// Recorder retaining the most recent [`DEFAULT_CAPACITY`] entries.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Recorder retaining the most recent `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: VecDeque::with_capacity(capacity), capacity: capacity.max(1) }
    }

    /// Append an entry, evicting the oldest when full.
    pub fn record(&mut self, entry: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.into());
    }

    /// Retained entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DebugRecorder {
    fn default() -> Self {
        Self::new()
    }
}
