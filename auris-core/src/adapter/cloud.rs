//! Cloud streaming backend.
//!
//! Opens a bidirectional WebSocket session to a managed streaming-recognition
//! service: one JSON `start` frame (language, sample rate, punctuation),
//! then raw binary audio as chunks arrive. The service answers with `result`
//! frames carrying zero or more alternatives; only the top alternative is
//! used. On end-of-stream a `stop` frame is sent and the remaining results
//! are drained until the service closes.
//!
//! Transport failures abort the run — fallback is the caller's decision, not
//! this module's.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::adapter::{AdapterSettings, TranscriptionAdapter};
use crate::error::{AurisError, Result};
use crate::event::TranscriptEvent;
use crate::queue::AudioReceiver;

/// The three conventional browser capture rates. Anything else is a
/// configuration error at construction time.
pub const SUPPORTED_SAMPLE_RATES: [u32; 3] = [16_000, 44_100, 48_000];

/// One-time configuration frame, sent before any audio.
#[derive(Debug, Clone, Serialize)]
pub struct StreamingConfig {
    #[serde(rename = "type")]
    kind: &'static str,
    pub language: String,
    pub sample_rate_hz: u32,
    pub encoding: &'static str,
    pub punctuate: bool,
}

impl StreamingConfig {
    /// Select the pre-built configuration matching the negotiated rate.
    pub fn for_rate(language: &str, sample_rate_hz: u32, punctuate: bool) -> Result<Self> {
        if !SUPPORTED_SAMPLE_RATES.contains(&sample_rate_hz) {
            return Err(AurisError::UnsupportedSampleRate(sample_rate_hz));
        }
        Ok(Self {
            kind: "start",
            language: language.to_string(),
            sample_rate_hz,
            encoding: "linear16",
            punctuate,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ResultFrame {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
    confidence: Option<f32>,
}

/// Map one service frame to a transcript event, tracking utterance start
/// across partials. `None` for frames that carry nothing usable.
fn event_from_frame(raw: Value, utterance_started: &mut Option<DateTime<Utc>>) -> Option<TranscriptEvent> {
    let frame: ResultFrame = match serde_json::from_value(raw.clone()) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "unparseable frame from streaming service");
            return None;
        }
    };
    if frame.kind != "result" {
        return None;
    }
    let top = frame.alternatives.first()?;
    if top.transcript.is_empty() {
        return None;
    }

    let started_at = *utterance_started.get_or_insert_with(Utc::now);
    if frame.is_final {
        *utterance_started = None;
        Some(TranscriptEvent::finalized(
            top.transcript.clone(),
            top.confidence,
            started_at,
            raw,
        ))
    } else {
        Some(TranscriptEvent::partial(top.transcript.clone(), started_at, raw))
    }
}

#[derive(Debug)]
pub struct CloudStreamAdapter {
    endpoint: String,
    api_key: String,
    config: StreamingConfig,
}

impl CloudStreamAdapter {
    /// # Errors
    /// `MissingCredentials` without an API key; `UnsupportedSampleRate` for a
    /// rate with no pre-built configuration. Both are stub-recoverable.
    pub fn from_settings(settings: &AdapterSettings) -> Result<Self> {
        let api_key = settings
            .cloud_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(AurisError::MissingCredentials { engine: "cloud" })?;
        let config =
            StreamingConfig::for_rate(&settings.language, settings.sample_rate_hz, settings.punctuate)?;
        Ok(Self {
            endpoint: settings.cloud_endpoint.clone(),
            api_key,
            config,
        })
    }
}

#[async_trait]
impl TranscriptionAdapter for CloudStreamAdapter {
    fn name(&self) -> &'static str {
        "cloud"
    }

    async fn run(
        &mut self,
        mut audio: AudioReceiver,
        events: mpsc::Sender<TranscriptEvent>,
    ) -> Result<()> {
        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| AurisError::Transport(format!("invalid streaming endpoint: {e}")))?;
        let auth = HeaderValue::from_str(&format!("Token {}", self.api_key))
            .map_err(|e| AurisError::Transport(format!("invalid credentials header: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| AurisError::Transport(format!("streaming connect failed: {e}")))?;
        let (mut writer, mut reader) = stream.split();

        let config_frame = serde_json::to_string(&self.config)
            .map_err(|e| AurisError::Backend(format!("encode configuration frame: {e}")))?;
        writer
            .send(Message::Text(config_frame))
            .await
            .map_err(|e| AurisError::Transport(format!("configuration send failed: {e}")))?;
        info!(
            language = %self.config.language,
            sample_rate_hz = self.config.sample_rate_hz,
            "cloud streaming session opened"
        );

        let mut audio_done = false;
        let mut sent_chunks = 0u64;
        let mut utterance_started: Option<DateTime<Utc>> = None;

        loop {
            tokio::select! {
                chunk = audio.recv(), if !audio_done => match chunk {
                    Some(chunk) => {
                        sent_chunks += 1;
                        writer
                            .send(Message::Binary(chunk.data))
                            .await
                            .map_err(|e| AurisError::Transport(format!("audio send failed: {e}")))?;
                    }
                    None => {
                        audio_done = true;
                        // Ask the service to flush pending hypotheses, then
                        // half-close and drain what remains.
                        let _ = writer.send(Message::Text(r#"{"type":"stop"}"#.to_string())).await;
                        let _ = writer.send(Message::Close(None)).await;
                    }
                },
                frame = reader.next() => match frame {
                    Some(Ok(Message::Text(payload))) => {
                        let raw: Value = match serde_json::from_str(&payload) {
                            Ok(raw) => raw,
                            Err(e) => {
                                warn!(error = %e, "non-JSON frame from streaming service");
                                continue;
                            }
                        };
                        if let Some(event) = event_from_frame(raw, &mut utterance_started) {
                            if events.send(event).await.is_err() {
                                // Forward loop is gone — pipeline teardown.
                                return Ok(());
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Err(AurisError::Transport(format!("streaming read failed: {e}")));
                    }
                },
            }
        }

        debug!(chunks = sent_chunks, "cloud streaming session drained");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TranscriptKind;
    use serde_json::json;

    #[test]
    fn prebuilt_configs_cover_browser_rates_only() {
        for rate in SUPPORTED_SAMPLE_RATES {
            let config = StreamingConfig::for_rate("en", rate, true).expect("supported rate");
            assert_eq!(config.sample_rate_hz, rate);
            assert_eq!(config.encoding, "linear16");
        }
        match StreamingConfig::for_rate("en", 8_000, true) {
            Err(AurisError::UnsupportedSampleRate(rate)) => assert_eq!(rate, 8_000),
            other => panic!("expected UnsupportedSampleRate, got {other:?}"),
        }
    }

    #[test]
    fn configuration_frame_shape() {
        let config = StreamingConfig::for_rate("de", 48_000, false).expect("config");
        let json = serde_json::to_value(&config).expect("serialize");
        assert_eq!(json["type"], "start");
        assert_eq!(json["language"], "de");
        assert_eq!(json["sample_rate_hz"], 48_000);
        assert_eq!(json["punctuate"], false);
    }

    #[test]
    fn final_result_uses_top_alternative_confidence() {
        let mut started = None;
        let raw = json!({
            "type": "result",
            "is_final": true,
            "alternatives": [
                { "transcript": "hello world", "confidence": 0.87 },
                { "transcript": "hallo word", "confidence": 0.41 },
            ],
        });
        let event = event_from_frame(raw, &mut started).expect("event");
        assert_eq!(event.kind, TranscriptKind::Final);
        assert_eq!(event.text, "hello world");
        assert_eq!(event.confidence, Some(0.87));
        assert!(started.is_none(), "final closes the utterance");
    }

    #[test]
    fn interim_result_has_no_confidence() {
        let mut started = None;
        let raw = json!({
            "type": "result",
            "is_final": false,
            "alternatives": [{ "transcript": "hel", "confidence": 0.3 }],
        });
        let event = event_from_frame(raw, &mut started).expect("event");
        assert_eq!(event.kind, TranscriptKind::Partial);
        assert_eq!(event.confidence, None);
        assert!(started.is_some(), "partial keeps the utterance open");
    }

    #[test]
    fn empty_or_foreign_frames_are_skipped() {
        let mut started = None;
        assert!(event_from_frame(json!({ "type": "metadata" }), &mut started).is_none());
        assert!(event_from_frame(
            json!({ "type": "result", "is_final": false, "alternatives": [] }),
            &mut started,
        )
        .is_none());
        assert!(event_from_frame(
            json!({ "type": "result", "alternatives": [{ "transcript": "" }] }),
            &mut started,
        )
        .is_none());
    }

    #[test]
    fn missing_api_key_is_stub_recoverable() {
        let settings = AdapterSettings {
            engine: "cloud".to_string(),
            ..AdapterSettings::default()
        };
        let err = CloudStreamAdapter::from_settings(&settings).unwrap_err();
        assert!(err.is_stub_recoverable());
    }
}
