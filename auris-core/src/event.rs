//! Transcript event and fragment types.
//!
//! `TranscriptEvent` is what adapters emit; `OutboundMessage` is the exact
//! JSON shape relayed to the client; `TranscriptFragment` is the persisted
//! form of a FINAL event in the session transcript.
//!
//! Invariant: `completed_at` is set if and only if the event is FINAL. The
//! two constructors are the only way this crate builds events, so the
//! invariant holds by construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Confidence reported to the client when the backend supplied none.
pub const DEFAULT_CONFIDENCE: f32 = 0.9;

/// Distinguishes tentative hypotheses from settled utterances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptKind {
    /// Best-effort hypothesis — may be revised or dropped.
    Partial,
    /// Settled transcription for a completed utterance; durably recorded.
    Final,
}

/// A transcription update produced by an adapter run.
#[derive(Debug, Clone)]
pub struct TranscriptEvent {
    pub kind: TranscriptKind,
    pub text: String,
    /// Backend confidence in [0.0, 1.0], when the backend reports one.
    pub confidence: Option<f32>,
    pub started_at: DateTime<Utc>,
    /// Set exactly when `kind == Final`.
    pub completed_at: Option<DateTime<Utc>>,
    /// Opaque engine-specific metadata, carried through to the fragment.
    pub raw: Value,
}

impl TranscriptEvent {
    pub fn partial(text: impl Into<String>, started_at: DateTime<Utc>, raw: Value) -> Self {
        Self {
            kind: TranscriptKind::Partial,
            text: text.into(),
            confidence: None,
            started_at,
            completed_at: None,
            raw,
        }
    }

    pub fn finalized(
        text: impl Into<String>,
        confidence: Option<f32>,
        started_at: DateTime<Utc>,
        raw: Value,
    ) -> Self {
        Self {
            kind: TranscriptKind::Final,
            text: text.into(),
            confidence,
            started_at,
            completed_at: Some(Utc::now()),
            raw,
        }
    }

    pub fn is_final(&self) -> bool {
        self.kind == TranscriptKind::Final
    }
}

/// The message relayed to the client for every transcript event.
///
/// Wire shape:
/// `{"type":"transcription","text":…,"speaker":…,"confidence":…,"is_final":…}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    pub speaker: String,
    pub confidence: f32,
    pub is_final: bool,
}

impl OutboundMessage {
    pub fn from_event(event: &TranscriptEvent, speaker: &str) -> Self {
        Self {
            kind: "transcription".to_string(),
            text: event.text.clone(),
            speaker: speaker.to_string(),
            confidence: event.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            is_final: event.is_final(),
        }
    }
}

/// Persisted form of a FINAL event. Appended once to the session transcript,
/// never mutated; only a session reset removes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptFragment {
    /// Wall-clock finalization time, `HH:MM:SS`.
    pub time: String,
    pub text: String,
    pub confidence: Option<f32>,
    pub speaker: String,
    pub raw: Value,
}

impl TranscriptFragment {
    pub fn from_event(event: &TranscriptEvent, speaker: &str) -> Self {
        let stamp = event.completed_at.unwrap_or(event.started_at);
        Self {
            time: stamp.format("%H:%M:%S").to_string(),
            text: event.text.clone(),
            confidence: event.confidence,
            speaker: speaker.to_string(),
            raw: event.raw.clone(),
        }
    }
}
