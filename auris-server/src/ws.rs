//! WebSocket transcription endpoint.
//!
//! Binary frames are audio; text frames are logged and skipped. The socket
//! is split so the pipeline's ingest loop owns the read half while the
//! forward and heartbeat loops share the write half through `WsEventSink`,
//! which serializes writes behind a mutex.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use auris_core::pipeline::INTERNAL_ERROR_CLOSE_CODE;
use auris_core::{build_adapter, AurisError, EventSink, FrameSource, OutboundMessage, Result};

use crate::AppState;

pub async fn transcription_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    info!("transcription stream opened");

    let adapter = match build_adapter(&state.adapter_settings) {
        Ok(adapter) => adapter,
        Err(e) => {
            // Unknown engine and the like: refuse the connection outright.
            error!(error = %e, "adapter construction failed — refusing connection");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: INTERNAL_ERROR_CLOSE_CODE,
                    reason: "configuration error".into(),
                })))
                .await;
            return;
        }
    };

    let (writer, reader) = socket.split();
    let sink: Arc<dyn EventSink> = Arc::new(WsEventSink::new(writer));
    let mut source = WsFrameSource { reader };

    match state.pipeline.run(&mut source, sink, adapter).await {
        Ok(summary) => info!(
            chunks = summary.chunks,
            forwarded = summary.stats.forwarded,
            persisted = summary.stats.persisted,
            reason = ?summary.reason,
            "transcription stream closed"
        ),
        Err(e) => error!(error = %e, "transcription stream failed"),
    }
}

struct WsFrameSource {
    reader: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameSource for WsFrameSource {
    async fn next_audio(&mut self) -> Result<Option<Vec<u8>>> {
        while let Some(frame) = self.reader.next().await {
            match frame {
                Ok(Message::Binary(data)) => return Ok(Some(data)),
                Ok(Message::Close(_)) => return Ok(None),
                Ok(Message::Text(text)) => {
                    warn!(len = text.len(), "ignoring text frame on the audio stream");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Err(e) => return Err(AurisError::Transport(format!("websocket read failed: {e}"))),
            }
        }
        Ok(None)
    }
}

struct WsEventSink {
    writer: Mutex<SplitSink<WebSocket, Message>>,
    connected: AtomicBool,
}

impl WsEventSink {
    fn new(writer: SplitSink<WebSocket, Message>) -> Self {
        Self {
            writer: Mutex::new(writer),
            connected: AtomicBool::new(true),
        }
    }

    async fn dispatch(&self, message: Message) -> Result<()> {
        let mut writer = self.writer.lock().await;
        match writer.send(message).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                Err(AurisError::Transport(format!("websocket send failed: {e}")))
            }
        }
    }
}

#[async_trait]
impl EventSink for WsEventSink {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        let payload = serde_json::to_string(message)
            .map_err(|e| AurisError::Backend(format!("encode outbound message: {e}")))?;
        self.dispatch(Message::Text(payload)).await
    }

    async fn ping(&self) -> Result<()> {
        self.dispatch(Message::Ping(Vec::new())).await
    }

    async fn close(&self, code: u16) {
        let _ = self
            .dispatch(Message::Close(Some(CloseFrame {
                code,
                reason: "internal error".into(),
            })))
            .await;
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
