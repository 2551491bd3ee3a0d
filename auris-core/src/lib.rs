//! # auris-core
//!
//! Reusable real-time speech-transcription streaming SDK.
//!
//! ## Architecture
//!
//! ```text
//! client ─► FrameSource ─► ingest loop ─► AudioQueue(cap 8) ─► TranscriptionAdapter
//!                                                                     │
//!                                                         mpsc<TranscriptEvent>
//!                                                                     │
//!              EventSink ◄─ forward loop ◄───────────────────────────┘
//!                  ▲              │
//!            heartbeat loop    SessionTranscript (FINAL events only)
//! ```
//!
//! One `Pipeline` runs per client connection: the ingest loop feeds binary
//! audio into the bounded queue (backpressure happens there), the adapter
//! turns chunks into partial/final transcript events, and the forward loop
//! relays events to the client while appending finals to the shared session
//! transcript. Teardown is sentinel-driven so nothing already produced is
//! lost on disconnect.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod adapter;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod queue;
pub mod session;

// Convenience re-exports for downstream crates
pub use adapter::{build_adapter, AdapterSettings, TranscriptionAdapter};
pub use error::{AurisError, Result};
pub use event::{OutboundMessage, TranscriptEvent, TranscriptFragment, TranscriptKind};
pub use pipeline::{
    EventSink, FrameSource, Pipeline, PipelineConfig, PipelineState, PipelineSummary,
};
pub use queue::{audio_queue, AudioChunk, AudioReceiver, AudioSender, QUEUE_CAPACITY};
pub use session::SessionTranscript;

#[cfg(feature = "offline")]
pub use adapter::OfflineAdapter;
