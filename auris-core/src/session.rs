//! Shared session transcript — the durable record of FINAL events.
//!
//! One log is shared by every connection in a session. The mutex is held
//! only for the duration of an append or a copy-out, never across I/O, so
//! cross-connection ordering is exactly append order.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::event::TranscriptFragment;

/// Cheaply clonable handle to the process-wide transcript log.
///
/// Injected into each pipeline rather than reached through global state.
#[derive(Clone, Default)]
pub struct SessionTranscript {
    fragments: Arc<Mutex<Vec<TranscriptFragment>>>,
}

impl SessionTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one finalized fragment. Fragments are never mutated or removed
    /// individually; only [`clear`](Self::clear) empties the log.
    pub fn append(&self, fragment: TranscriptFragment) {
        self.fragments.lock().push(fragment);
    }

    /// Ordered copy of the log, oldest first.
    pub fn snapshot(&self) -> Vec<TranscriptFragment> {
        self.fragments.lock().clone()
    }

    /// Session reset: drop every fragment. Returns how many were cleared.
    pub fn clear(&self) -> usize {
        let mut fragments = self.fragments.lock();
        let cleared = fragments.len();
        fragments.clear();
        info!(cleared, "session transcript reset");
        cleared
    }

    pub fn len(&self) -> usize {
        self.fragments.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::Value;

    use crate::event::TranscriptEvent;

    fn fragment(text: &str) -> TranscriptFragment {
        let event = TranscriptEvent::finalized(text, Some(0.9), Utc::now(), Value::Null);
        TranscriptFragment::from_event(&event, "host")
    }

    #[test]
    fn appends_preserve_order() {
        let session = SessionTranscript::new();
        session.append(fragment("first"));
        session.append(fragment("second"));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].text, "first");
        assert_eq!(snapshot[1].text, "second");
    }

    #[test]
    fn snapshot_is_a_copy() {
        let session = SessionTranscript::new();
        session.append(fragment("only"));

        let snapshot = session.snapshot();
        session.append(fragment("later"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn clear_empties_the_log_and_reports_count() {
        let session = SessionTranscript::new();
        session.append(fragment("a"));
        session.append(fragment("b"));

        assert_eq!(session.clear(), 2);
        assert!(session.is_empty());
        assert_eq!(session.clear(), 0);
    }
}
