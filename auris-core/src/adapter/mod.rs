//! Speech recognition backend abstraction.
//!
//! The `TranscriptionAdapter` trait decouples the pipeline from any specific
//! backend (cloud streaming session, in-process recognizer, deterministic
//! stub). One adapter instance exists per connection and is consumed by a
//! single run.
//!
//! Selection is a factory function, not inheritance: [`build_adapter`] maps
//! the configured engine name to a variant and degrades to the stub when a
//! real backend cannot be constructed (missing credentials, missing model,
//! missing native dependency). An unrecognized engine name is a hard
//! configuration error — that one refuses the connection.

pub mod cloud;
pub mod offline;
pub mod stub;

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::{AurisError, Result};
use crate::event::TranscriptEvent;
use crate::queue::AudioReceiver;

pub use cloud::{CloudStreamAdapter, StreamingConfig, SUPPORTED_SAMPLE_RATES};
pub use stub::StubAdapter;

#[cfg(feature = "offline")]
pub use offline::OfflineAdapter;

/// Contract for speech recognition backends.
///
/// `run` consumes the audio chunk sequence until the end-of-stream sentinel
/// and pushes transcript events into `events`. The event channel is the lazy
/// event sequence: the forward loop drains it concurrently. Dropping of the
/// receiving side means the pipeline is tearing down — adapters treat it as
/// a normal stop, not an error. Returning `Err` aborts the run; the pipeline
/// logs it as a backend streaming failure and proceeds to drain.
#[async_trait]
pub trait TranscriptionAdapter: Send + 'static {
    /// Stable variant name, for logs.
    fn name(&self) -> &'static str;

    async fn run(
        &mut self,
        audio: AudioReceiver,
        events: mpsc::Sender<TranscriptEvent>,
    ) -> Result<()>;
}

/// Everything the factory needs to construct an adapter for one connection.
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    /// Requested engine: `"cloud"`, `"offline"` or `"stub"`.
    pub engine: String,
    /// BCP-47-ish language code handed to the backend.
    pub language: String,
    /// Negotiated client capture rate.
    pub sample_rate_hz: u32,
    /// Operator override: always use the stub, whatever `engine` says.
    pub force_stub: bool,
    pub cloud_endpoint: String,
    pub cloud_api_key: Option<String>,
    pub punctuate: bool,
    /// Offline recognizer model directory.
    pub model_path: Option<PathBuf>,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            engine: "stub".to_string(),
            language: "en".to_string(),
            sample_rate_hz: 16_000,
            force_stub: false,
            cloud_endpoint: "wss://asr.example.com/v1/stream".to_string(),
            cloud_api_key: None,
            punctuate: true,
            model_path: None,
        }
    }
}

/// Construct the adapter for one connection, applying the fallback policy.
///
/// # Errors
/// `AurisError::UnknownEngine` for an unrecognized engine name. Recoverable
/// construction failures of real backends never surface here — they degrade
/// to the stub with a warning.
pub fn build_adapter(settings: &AdapterSettings) -> Result<Box<dyn TranscriptionAdapter>> {
    if settings.force_stub {
        info!(engine = %settings.engine, "stub override active");
        return Ok(Box::new(StubAdapter::new(&settings.engine, &settings.language)));
    }

    match settings.engine.as_str() {
        "stub" => Ok(Box::new(StubAdapter::new("stub", &settings.language))),
        "cloud" => match CloudStreamAdapter::from_settings(settings) {
            Ok(adapter) => Ok(Box::new(adapter)),
            Err(e) if e.is_stub_recoverable() => {
                warn!(error = %e, "cloud backend unavailable — substituting stub");
                Ok(Box::new(StubAdapter::new("cloud", &settings.language)))
            }
            Err(e) => Err(e),
        },
        "offline" => build_offline(settings),
        other => Err(AurisError::UnknownEngine(other.to_string())),
    }
}

#[cfg(feature = "offline")]
fn build_offline(settings: &AdapterSettings) -> Result<Box<dyn TranscriptionAdapter>> {
    match OfflineAdapter::from_settings(settings) {
        Ok(adapter) => Ok(Box::new(adapter)),
        Err(e) if e.is_stub_recoverable() => {
            warn!(error = %e, "offline backend unavailable — substituting stub");
            Ok(Box::new(StubAdapter::new("offline", &settings.language)))
        }
        Err(e) => Err(e),
    }
}

#[cfg(not(feature = "offline"))]
fn build_offline(settings: &AdapterSettings) -> Result<Box<dyn TranscriptionAdapter>> {
    warn!(
        error = %AurisError::OfflineSupportMissing,
        "offline backend unavailable — substituting stub"
    );
    Ok(Box::new(StubAdapter::new("offline", &settings.language)))
}
