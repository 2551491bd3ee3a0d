//! End-to-end shutdown behavior through the public API: a short client
//! stream must leave exactly its summarized final in the session transcript,
//! and nothing produced before the sentinel may be lost.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use auris_core::{
    build_adapter, AdapterSettings, AurisError, EventSink, FrameSource, OutboundMessage, Pipeline,
    PipelineConfig, Result, SessionTranscript,
};

struct ByteSource {
    frames: VecDeque<Vec<u8>>,
}

#[async_trait]
impl FrameSource for ByteSource {
    async fn next_audio(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.frames.pop_front())
    }
}

#[derive(Default)]
struct CollectingSink {
    messages: Mutex<Vec<OutboundMessage>>,
    disconnected: AtomicBool,
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(AurisError::Transport("client gone".to_string()));
        }
        self.messages.lock().push(message.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self, _code: u16) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }
}

fn stub_settings() -> AdapterSettings {
    AdapterSettings {
        engine: "stub".to_string(),
        ..AdapterSettings::default()
    }
}

#[tokio::test]
async fn two_binary_chunks_then_disconnect_leave_one_summarized_fragment() {
    let session = SessionTranscript::new();
    let pipeline = Pipeline::new(session.clone(), PipelineConfig::default());
    let adapter = build_adapter(&stub_settings()).expect("stub adapter");

    let mut source = ByteSource {
        frames: vec![vec![1u8; 5], vec![2u8; 5]].into(),
    };
    let sink = Arc::new(CollectingSink::default());

    let summary = pipeline
        .run(&mut source, sink.clone(), adapter)
        .await
        .expect("pipeline run");

    assert_eq!(summary.chunks, 2);

    let snapshot = session.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].raw["chunks"], 2);
    assert_eq!(snapshot[0].speaker, "host");

    // The summarized final was also relayed before the close.
    let messages = sink.messages.lock();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_final);
    assert_eq!(messages[0].kind, "transcription");
}

#[tokio::test]
async fn every_event_produced_before_the_sentinel_is_drained() {
    let session = SessionTranscript::new();
    let pipeline = Pipeline::new(session.clone(), PipelineConfig::default());
    let adapter = build_adapter(&stub_settings()).expect("stub adapter");

    // Two full stub cycles: finals at chunks 9 and 18.
    let mut source = ByteSource {
        frames: (0..18).map(|_| vec![0u8; 640]).collect(),
    };
    let sink = Arc::new(CollectingSink::default());

    let summary = pipeline
        .run(&mut source, sink.clone(), adapter)
        .await
        .expect("pipeline run");

    assert_eq!(summary.chunks, 18);
    assert_eq!(session.len(), 2, "both finals persisted before Closed");

    let messages = sink.messages.lock();
    assert_eq!(messages.len(), 8, "6 partials + 2 finals all relayed");
    assert_eq!(messages.iter().filter(|m| m.is_final).count(), 2);
}
