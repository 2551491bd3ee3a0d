//! Offline recognizer backend.
//!
//! Feeds each chunk to an in-process recognizer and polls it for results:
//! a completed utterance becomes a FINAL whose confidence is the arithmetic
//! mean of the per-word confidences, a non-empty partial hypothesis becomes
//! a PARTIAL, and end-of-stream flushes the pending hypothesis as a last
//! FINAL. Recognizer calls are CPU-bound, so every one of them is dispatched
//! through `spawn_blocking` — concurrent connections keep their event loop.
//!
//! The whole backend is gated under the `offline` feature because it links a
//! native library; without the feature the factory substitutes the stub.

#[cfg(feature = "offline")]
use async_trait::async_trait;
#[cfg(feature = "offline")]
use chrono::{DateTime, Utc};
#[cfg(feature = "offline")]
use serde_json::{json, Value};
#[cfg(feature = "offline")]
use std::path::PathBuf;
#[cfg(feature = "offline")]
use tokio::sync::mpsc;
#[cfg(feature = "offline")]
use tracing::{debug, info};
#[cfg(feature = "offline")]
use vosk::{DecodingState, Model, Recognizer};

#[cfg(feature = "offline")]
use crate::adapter::{AdapterSettings, TranscriptionAdapter};
#[cfg(feature = "offline")]
use crate::error::{AurisError, Result};
#[cfg(feature = "offline")]
use crate::event::TranscriptEvent;
#[cfg(feature = "offline")]
use crate::queue::AudioReceiver;

/// Arithmetic mean of per-word confidences; `None` when the recognizer
/// reported no per-word scores.
pub fn mean_confidence(word_confidences: &[f32]) -> Option<f32> {
    if word_confidences.is_empty() {
        return None;
    }
    Some(word_confidences.iter().sum::<f32>() / word_confidences.len() as f32)
}

/// Reinterpret raw little-endian bytes as 16-bit PCM samples. A trailing odd
/// byte is dropped.
pub fn pcm_samples(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[cfg(feature = "offline")]
pub struct OfflineAdapter {
    /// Consumed by the first (only) run.
    recognizer: Option<Recognizer>,
    language: String,
    model_path: PathBuf,
}

#[cfg(feature = "offline")]
impl OfflineAdapter {
    /// # Errors
    /// `MissingCredentials` without a model path, `ModelNotFound` when the
    /// path does not exist, `BackendUnavailable` when the native recognizer
    /// refuses the model. All stub-recoverable.
    pub fn from_settings(settings: &AdapterSettings) -> Result<Self> {
        let model_path = settings
            .model_path
            .clone()
            .ok_or(AurisError::MissingCredentials { engine: "offline" })?;
        if !model_path.exists() {
            return Err(AurisError::ModelNotFound { path: model_path });
        }

        let model = Model::new(model_path.to_string_lossy().as_ref()).ok_or_else(|| {
            AurisError::BackendUnavailable(format!(
                "recognizer model failed to load from {}",
                model_path.display()
            ))
        })?;
        let mut recognizer = Recognizer::new(&model, settings.sample_rate_hz as f32)
            .ok_or_else(|| {
                AurisError::BackendUnavailable("recognizer construction failed".to_string())
            })?;
        recognizer.set_words(true);

        info!(model = %model_path.display(), sample_rate_hz = settings.sample_rate_hz, "offline recognizer ready");
        Ok(Self {
            recognizer: Some(recognizer),
            language: settings.language.clone(),
            model_path,
        })
    }
}

/// Pull the completed (or, at end-of-stream, pending) utterance out of the
/// recognizer. `None` when the hypothesis is empty.
#[cfg(feature = "offline")]
fn completed_utterance(
    recognizer: &mut Recognizer,
    flush: bool,
) -> Option<(String, Option<f32>, Value)> {
    let complete = if flush {
        recognizer.final_result()
    } else {
        recognizer.result()
    };
    let single = complete.single()?;
    if single.text.is_empty() {
        return None;
    }
    let confidences: Vec<f32> = single.result.iter().map(|word| word.conf).collect();
    let raw = json!({ "words": single.result.len(), "flushed": flush });
    Some((single.text.to_string(), mean_confidence(&confidences), raw))
}

#[cfg(feature = "offline")]
#[async_trait]
impl TranscriptionAdapter for OfflineAdapter {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn run(
        &mut self,
        mut audio: AudioReceiver,
        events: mpsc::Sender<TranscriptEvent>,
    ) -> Result<()> {
        let mut recognizer = self
            .recognizer
            .take()
            .ok_or_else(|| AurisError::Backend("offline adapter can only run once".to_string()))?;
        let mut utterance_started: Option<DateTime<Utc>> = None;

        while let Some(chunk) = audio.recv().await {
            let samples = pcm_samples(&chunk.data);
            if samples.is_empty() {
                continue;
            }
            let started_at = *utterance_started.get_or_insert_with(Utc::now);

            // CPU-bound call — keep it off the event loop.
            let (returned, state) = tokio::task::spawn_blocking(move || {
                let state = recognizer.accept_waveform(&samples);
                (recognizer, state)
            })
            .await
            .map_err(|e| AurisError::Backend(format!("recognizer worker failed: {e}")))?;
            recognizer = returned;

            match state {
                DecodingState::Finalized => {
                    utterance_started = None;
                    if let Some((text, confidence, raw)) =
                        completed_utterance(&mut recognizer, false)
                    {
                        let event = TranscriptEvent::finalized(text, confidence, started_at, raw);
                        if events.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                DecodingState::Running => {
                    let partial = recognizer.partial_result().partial.to_string();
                    if !partial.is_empty() {
                        let raw = json!({ "partial": true, "language": self.language });
                        let event = TranscriptEvent::partial(partial, started_at, raw);
                        if events.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                DecodingState::Failed => {
                    return Err(AurisError::Backend(format!(
                        "recognizer rejected waveform (model {})",
                        self.model_path.display()
                    )));
                }
            }
        }

        // End-of-stream: flush the recognizer's pending hypothesis.
        let started_at = utterance_started.unwrap_or_else(Utc::now);
        let flushed = tokio::task::spawn_blocking(move || {
            let flushed = completed_utterance(&mut recognizer, true);
            drop(recognizer);
            flushed
        })
        .await
        .map_err(|e| AurisError::Backend(format!("recognizer worker failed: {e}")))?;

        if let Some((text, confidence, raw)) = flushed {
            debug!(text_len = text.len(), "flushed pending utterance at end-of-stream");
            let _ = events
                .send(TranscriptEvent::finalized(text, confidence, started_at, raw))
                .await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_confidence_is_the_arithmetic_mean() {
        let mean = mean_confidence(&[0.5, 0.7, 0.9]).expect("mean");
        assert!((mean - 0.7).abs() < 1e-6);
    }

    #[test]
    fn mean_confidence_is_absent_without_word_scores() {
        assert_eq!(mean_confidence(&[]), None);
    }

    #[test]
    fn pcm_samples_decodes_little_endian_pairs() {
        // 0x0102 = 258, 0xFFFF = -1; trailing odd byte dropped.
        let samples = pcm_samples(&[0x02, 0x01, 0xFF, 0xFF, 0x7F]);
        assert_eq!(samples, vec![258, -1]);
    }

    #[test]
    fn pcm_samples_of_empty_input_is_empty() {
        assert!(pcm_samples(&[]).is_empty());
    }
}
