//! Deterministic stub backend.
//!
//! Stands in for a real engine when credentials or model files are missing,
//! when the operator forces it, or in integration tests. Output is a pure
//! function of the chunk count: every 3rd chunk reveals one more word of the
//! current canned phrase as a PARTIAL, every 9th chunk completes the phrase
//! with a FINAL and advances to the next one. End-of-stream flushes any
//! phrase still in progress as a summarizing FINAL carrying the chunk count
//! in `raw.chunks`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;

use crate::adapter::TranscriptionAdapter;
use crate::error::Result;
use crate::event::TranscriptEvent;
use crate::queue::AudioReceiver;

/// Phrases the stub cycles through, one FINAL each.
const CANNED_PHRASES: &[&str] = &[
    "the quick brown fox jumps over the lazy dog",
    "pack my box with five dozen liquor jugs",
    "how vexingly quick daft zebras jump",
];

/// Every 3rd chunk advances the partial by one word.
const PARTIAL_EVERY: u64 = 3;
/// Every 9th chunk completes the current phrase.
const FINAL_EVERY: u64 = 9;

pub struct StubAdapter {
    /// Engine whose place the stub is taking — recorded in `raw` metadata so
    /// logs and exports show which backend was substituted.
    engine_label: String,
    language: String,
    phrase_cursor: usize,
    words_revealed: usize,
    chunk_index: u64,
    chunks_since_final: u64,
    utterance_started: Option<DateTime<Utc>>,
}

impl StubAdapter {
    pub fn new(engine_label: &str, language: &str) -> Self {
        Self {
            engine_label: engine_label.to_string(),
            language: language.to_string(),
            phrase_cursor: 0,
            words_revealed: 0,
            chunk_index: 0,
            chunks_since_final: 0,
            utterance_started: None,
        }
    }

    fn current_phrase(&self) -> &'static str {
        CANNED_PHRASES[self.phrase_cursor]
    }

    /// Complete the current phrase and move the cursor forward.
    fn finalize(&mut self, started_at: DateTime<Utc>) -> TranscriptEvent {
        let phrase = self.current_phrase();
        let raw = json!({
            "chunks": self.chunks_since_final,
            "engine": self.engine_label,
            "language": self.language,
        });
        self.phrase_cursor = (self.phrase_cursor + 1) % CANNED_PHRASES.len();
        self.words_revealed = 0;
        self.chunks_since_final = 0;
        self.utterance_started = None;
        TranscriptEvent::finalized(phrase, Some(1.0), started_at, raw)
    }
}

#[async_trait]
impl TranscriptionAdapter for StubAdapter {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn run(
        &mut self,
        mut audio: AudioReceiver,
        events: mpsc::Sender<TranscriptEvent>,
    ) -> Result<()> {
        while let Some(chunk) = audio.recv().await {
            self.chunk_index += 1;
            self.chunks_since_final += 1;
            let started_at = *self.utterance_started.get_or_insert_with(Utc::now);
            debug!(seq = chunk.seq, size = chunk.data.len(), "stub consumed chunk");

            if self.chunk_index % PARTIAL_EVERY == 0 {
                let words: Vec<&str> = self.current_phrase().split_whitespace().collect();
                self.words_revealed = (self.words_revealed + 1).min(words.len());
                let text = words[..self.words_revealed].join(" ");
                let raw = json!({
                    "chunk_index": self.chunk_index,
                    "engine": self.engine_label,
                    "language": self.language,
                });
                if events
                    .send(TranscriptEvent::partial(text, started_at, raw))
                    .await
                    .is_err()
                {
                    return Ok(());
                }
            }

            if self.chunk_index % FINAL_EVERY == 0 {
                let event = self.finalize(started_at);
                if events.send(event).await.is_err() {
                    return Ok(());
                }
            }
        }

        // End-of-stream summarization: flush whatever phrase is in progress.
        if self.chunks_since_final > 0 {
            let started_at = self.utterance_started.unwrap_or_else(Utc::now);
            let event = self.finalize(started_at);
            let _ = events.send(event).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TranscriptKind;
    use crate::queue::{audio_queue, AudioChunk};

    /// Feed `count` chunks through the stub and collect every event.
    async fn run_stub(mut adapter: StubAdapter, count: u64) -> Vec<TranscriptEvent> {
        let (audio_tx, audio_rx) = audio_queue();
        let (events_tx, mut events_rx) = mpsc::channel(64);

        let task = tokio::spawn(async move { adapter.run(audio_rx, events_tx).await });

        for seq in 1..=count {
            assert!(
                audio_tx
                    .push(AudioChunk {
                        seq,
                        data: vec![0u8; 5],
                    })
                    .await
            );
        }
        audio_tx.finish().await;

        let mut events = Vec::new();
        while let Some(event) = events_rx.recv().await {
            events.push(event);
        }
        task.await.expect("stub task").expect("stub run");
        events
    }

    #[tokio::test]
    async fn nine_chunks_yield_three_partials_and_one_final() {
        let events = run_stub(StubAdapter::new("stub", "en"), 9).await;

        let kinds: Vec<TranscriptKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TranscriptKind::Partial,
                TranscriptKind::Partial,
                TranscriptKind::Partial,
                TranscriptKind::Final,
            ]
        );
        assert_eq!(events[0].text, "the");
        assert_eq!(events[1].text, "the quick");
        assert_eq!(events[2].text, "the quick brown");
        assert_eq!(events[3].text, CANNED_PHRASES[0]);
        assert!(events[3].completed_at.is_some());
    }

    #[tokio::test]
    async fn phrase_cursor_advances_after_a_final() {
        let events = run_stub(StubAdapter::new("stub", "en"), 18).await;

        let finals: Vec<&TranscriptEvent> = events.iter().filter(|e| e.is_final()).collect();
        assert_eq!(finals.len(), 2);
        assert_eq!(finals[0].text, CANNED_PHRASES[0]);
        assert_eq!(finals[1].text, CANNED_PHRASES[1]);
    }

    #[tokio::test]
    async fn end_of_stream_summarizes_pending_chunks() {
        let events = run_stub(StubAdapter::new("cloud", "en"), 2).await;

        assert_eq!(events.len(), 1);
        let fin = &events[0];
        assert!(fin.is_final());
        assert_eq!(fin.text, CANNED_PHRASES[0]);
        assert_eq!(fin.raw["chunks"], 2);
        assert_eq!(fin.raw["engine"], "cloud");
    }

    #[tokio::test]
    async fn no_chunks_means_no_events() {
        let events = run_stub(StubAdapter::new("stub", "en"), 0).await;
        assert!(events.is_empty());
    }
}
