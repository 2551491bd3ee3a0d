//! Per-connection pipeline coordinator.
//!
//! ## Lifecycle
//!
//! ```text
//! Open ──► Streaming ──► Draining ──► Closed
//!              │             ▲
//!              └──► Errored ─┘   (ingest failure; close code 1011)
//! ```
//!
//! `run()` spawns the adapter, forward and heartbeat tasks, then drives the
//! ingest loop on the calling task. Teardown always executes: the
//! end-of-stream sentinel is enqueued (unblocking the adapter), the
//! heartbeat is cancelled and awaited, and the forward and adapter tasks are
//! awaited so every event already produced reaches the session transcript
//! before `Closed`. An adapter error surfacing during drain is logged as a
//! backend streaming failure, never re-raised.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::adapter::TranscriptionAdapter;
use crate::error::Result;
use crate::event::{OutboundMessage, TranscriptEvent, TranscriptFragment};
use crate::queue::{audio_queue, AudioChunk, AudioSender};
use crate::session::SessionTranscript;

/// WebSocket close code sent when the ingest loop fails unexpectedly.
pub const INTERNAL_ERROR_CLOSE_CODE: u16 = 1011;

/// Buffered transcript events between the adapter task and the forward loop.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Read side of the client connection, as the ingest loop sees it.
#[async_trait]
pub trait FrameSource: Send {
    /// Next binary audio frame. `Ok(None)` is a clean client disconnect; an
    /// `Err` is an unexpected transport failure.
    async fn next_audio(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Write side of the client connection, shared by the forward and heartbeat
/// loops. Implementations serialize writes internally so that cancelling the
/// heartbeat can never corrupt an in-flight send.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<()>;
    async fn ping(&self) -> Result<()>;
    async fn close(&self, code: u16);
    fn is_connected(&self) -> bool;
}

/// Lifecycle of one connection's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Open,
    Streaming,
    Draining,
    Closed,
    Errored,
}

/// Why the ingest loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Client closed the stream.
    Disconnect,
    /// Transport read failed; connection was closed with 1011.
    IngestError,
    /// Adapter stopped consuming before the client disconnected.
    AdapterClosed,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Fixed speaker label stamped on every outbound message and fragment.
    pub speaker_label: String,
    pub heartbeat_interval: Duration,
    /// Optional bound on the teardown awaits. `None` keeps the drain
    /// unbounded, which means a hung backend can stall teardown.
    pub drain_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            speaker_label: "host".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            drain_timeout: None,
        }
    }
}

/// Forward-loop counters, reported in the summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardStats {
    /// Messages actually delivered to the client.
    pub forwarded: u64,
    /// Fragments appended to the session transcript.
    pub persisted: u64,
    /// 1 once the client stopped accepting sends, 0 otherwise.
    pub failed_sends: u64,
}

#[derive(Debug)]
pub struct PipelineSummary {
    pub chunks: u64,
    pub state: PipelineState,
    pub reason: CloseReason,
    pub stats: ForwardStats,
}

/// Coordinates the three per-connection loops around one adapter run.
pub struct Pipeline {
    session: SessionTranscript,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(session: SessionTranscript, config: PipelineConfig) -> Self {
        Self { session, config }
    }

    pub fn session(&self) -> &SessionTranscript {
        &self.session
    }

    /// Drive one connection to completion.
    ///
    /// Returns the summary on an orderly close (including client
    /// disconnects) and re-raises the ingest error after teardown when the
    /// transport failed unexpectedly.
    pub async fn run<S: FrameSource>(
        &self,
        source: &mut S,
        sink: Arc<dyn EventSink>,
        mut adapter: Box<dyn TranscriptionAdapter>,
    ) -> Result<PipelineSummary> {
        let mut state = PipelineState::Open;
        let (audio_tx, audio_rx) = audio_queue();
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let adapter_name = adapter.name();
        let adapter_task: JoinHandle<Result<()>> =
            tokio::spawn(async move { adapter.run(audio_rx, events_tx).await });
        let forward_task = tokio::spawn(forward_loop(
            events_rx,
            Arc::clone(&sink),
            self.session.clone(),
            self.config.speaker_label.clone(),
        ));
        let heartbeat_task = tokio::spawn(heartbeat_loop(
            Arc::clone(&sink),
            self.config.heartbeat_interval,
        ));

        transition(&mut state, PipelineState::Streaming);
        info!(adapter = adapter_name, "pipeline streaming");

        let (chunks, ingest_result) = ingest_loop(source, &audio_tx).await;

        let reason = match &ingest_result {
            Ok(IngestEnd::Disconnect) => {
                info!(chunks, reason = "disconnect", "client closed the stream");
                CloseReason::Disconnect
            }
            Ok(IngestEnd::AdapterClosed) => {
                info!(chunks, "adapter stopped consuming — draining early");
                CloseReason::AdapterClosed
            }
            Err(e) => {
                warn!(chunks, error = %e, "ingest failed — closing connection");
                sink.close(INTERNAL_ERROR_CLOSE_CODE).await;
                transition(&mut state, PipelineState::Errored);
                CloseReason::IngestError
            }
        };

        // ── Teardown: always runs, whatever ended the ingest loop ─────────
        transition(&mut state, PipelineState::Draining);
        audio_tx.finish().await;

        heartbeat_task.abort();
        let _ = heartbeat_task.await;

        let stats = match await_drained(forward_task, self.config.drain_timeout).await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "forward loop did not drain cleanly");
                ForwardStats::default()
            }
        };

        match await_drained(adapter_task, self.config.drain_timeout).await {
            Ok(Ok(())) => {}
            // Backend streaming failure — logged, never fatal to the process.
            Ok(Err(e)) => error!(adapter = adapter_name, error = %e, "backend streaming error"),
            Err(e) => error!(adapter = adapter_name, error = %e, "adapter task lost"),
        }

        transition(&mut state, PipelineState::Closed);
        info!(
            chunks,
            forwarded = stats.forwarded,
            persisted = stats.persisted,
            "pipeline closed"
        );

        match ingest_result {
            Err(e) => Err(e),
            Ok(_) => Ok(PipelineSummary {
                chunks,
                state,
                reason,
                stats,
            }),
        }
    }
}

fn transition(state: &mut PipelineState, next: PipelineState) {
    let from = *state;
    debug!(?from, ?next, "pipeline state change");
    *state = next;
}

enum IngestEnd {
    Disconnect,
    AdapterClosed,
}

/// Read frames off the connection and push them into the bounded queue. The
/// push suspends while the queue is full — that suspension is the
/// backpressure on the client's read loop.
async fn ingest_loop<S: FrameSource + ?Sized>(
    source: &mut S,
    audio_tx: &AudioSender,
) -> (u64, Result<IngestEnd>) {
    let mut seq = 0u64;
    loop {
        match source.next_audio().await {
            Ok(Some(data)) => {
                seq += 1;
                debug!(seq, size = data.len(), "audio chunk received");
                if !audio_tx.push(AudioChunk { seq, data }).await {
                    return (seq, Ok(IngestEnd::AdapterClosed));
                }
            }
            Ok(None) => return (seq, Ok(IngestEnd::Disconnect)),
            Err(e) => return (seq, Err(e)),
        }
    }
}

/// Relay adapter events to the client; append FINALs to the session
/// transcript. Persistence outlives delivery: after the first failed send
/// the loop stops relaying but keeps draining so every queued FINAL still
/// reaches the log.
async fn forward_loop(
    mut events: mpsc::Receiver<TranscriptEvent>,
    sink: Arc<dyn EventSink>,
    session: SessionTranscript,
    speaker: String,
) -> ForwardStats {
    let mut stats = ForwardStats::default();
    let mut client_gone = false;

    while let Some(event) = events.recv().await {
        let message = OutboundMessage::from_event(&event, &speaker);
        if !client_gone {
            match sink.send(&message).await {
                Ok(()) => {
                    stats.forwarded += 1;
                    debug!(
                        text_len = message.text.len(),
                        is_final = message.is_final,
                        "transcription relayed"
                    );
                }
                Err(e) => {
                    client_gone = true;
                    stats.failed_sends += 1;
                    info!(error = %e, "client send failed — persisting remaining finals without relay");
                }
            }
        }
        if event.is_final() {
            session.append(TranscriptFragment::from_event(&event, &speaker));
            stats.persisted += 1;
        }
    }
    stats
}

/// Periodic protocol ping so intermediary proxies keep the connection open.
/// Any failure just stops the loop — keepalive is never fatal.
async fn heartbeat_loop(sink: Arc<dyn EventSink>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        if !sink.is_connected() {
            break;
        }
        if sink.ping().await.is_err() {
            debug!("heartbeat ping failed — stopping keepalive");
            break;
        }
    }
}

/// Await a teardown task, optionally bounded. On timeout the task is aborted
/// so it cannot outlive the connection.
async fn await_drained<T>(
    mut task: JoinHandle<T>,
    bound: Option<Duration>,
) -> std::result::Result<T, String> {
    match bound {
        None => task.await.map_err(|e| e.to_string()),
        Some(limit) => match tokio::time::timeout(limit, &mut task).await {
            Ok(joined) => joined.map_err(|e| e.to_string()),
            Err(_) => {
                task.abort();
                Err(format!("drain timed out after {}ms", limit.as_millis()))
            }
        },
    }
}
