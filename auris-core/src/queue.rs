//! Bounded audio chunk queue — the concurrency backbone of a connection.
//!
//! A tokio mpsc channel of `Option<AudioChunk>` with capacity
//! [`QUEUE_CAPACITY`]. `None` is the end-of-stream sentinel. The sender
//! suspends while the queue is full, which is what back-pressures the ingest
//! loop; the receiver suspends while it is empty, which is what idles the
//! adapter between chunks.
//!
//! Exactly one sentinel is ever enqueued per connection:
//! [`AudioSender::finish`] consumes the sender, so a second sentinel cannot
//! be sent, and the pipeline calls it unconditionally during teardown.

use tokio::sync::mpsc;

/// Queue capacity — the backpressure window between ingest and recognition.
pub const QUEUE_CAPACITY: usize = 8;

/// One binary audio frame read off the client connection.
///
/// Moved into the queue by the ingest loop and out by the adapter; never
/// shared. `seq` exists for logging only.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub seq: u64,
    pub data: Vec<u8>,
}

/// Producer half, held by the ingest loop.
pub struct AudioSender {
    tx: mpsc::Sender<Option<AudioChunk>>,
}

/// Consumer half, owned by the adapter for the duration of its run.
pub struct AudioReceiver {
    rx: mpsc::Receiver<Option<AudioChunk>>,
    done: bool,
}

/// Create a matched sender/receiver pair for one connection.
pub fn audio_queue() -> (AudioSender, AudioReceiver) {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    (AudioSender { tx }, AudioReceiver { rx, done: false })
}

impl AudioSender {
    /// Enqueue a chunk, suspending while the queue is full.
    ///
    /// Returns `false` when the consumer hung up (the adapter stopped early);
    /// the chunk is dropped in that case.
    pub async fn push(&self, chunk: AudioChunk) -> bool {
        self.tx.send(Some(chunk)).await.is_ok()
    }

    /// Enqueue the end-of-stream sentinel.
    ///
    /// Consuming `self` guarantees at most one sentinel per connection. A
    /// failed send only means the consumer is already gone, which is fine —
    /// end-of-stream has nothing left to signal.
    pub async fn finish(self) {
        let _ = self.tx.send(None).await;
    }
}

impl AudioReceiver {
    /// Next chunk, or `None` once the sentinel has been read.
    ///
    /// Fused: after end-of-stream every further call returns `None` without
    /// touching the channel.
    pub async fn recv(&mut self) -> Option<AudioChunk> {
        if self.done {
            return None;
        }
        match self.rx.recv().await {
            Some(Some(chunk)) => Some(chunk),
            // Sentinel, or all senders dropped — both terminate the sequence.
            Some(None) | None => {
                self.done = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn chunk(seq: u64) -> AudioChunk {
        AudioChunk {
            seq,
            data: vec![0u8; 5],
        }
    }

    #[tokio::test]
    async fn chunks_arrive_in_fifo_order() {
        let (tx, mut rx) = audio_queue();
        for seq in 0..3 {
            assert!(tx.push(chunk(seq)).await);
        }
        tx.finish().await;

        for seq in 0..3 {
            assert_eq!(rx.recv().await.expect("chunk").seq, seq);
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn ninth_push_backpressures_until_a_recv() {
        let (tx, mut rx) = audio_queue();
        for seq in 0..QUEUE_CAPACITY as u64 {
            assert!(tx.push(chunk(seq)).await);
        }

        let mut ninth = Box::pin(tx.push(chunk(QUEUE_CAPACITY as u64)));
        assert!(
            timeout(Duration::from_millis(50), &mut ninth).await.is_err(),
            "9th push should suspend while the queue is full"
        );

        assert_eq!(rx.recv().await.expect("chunk").seq, 0);
        let accepted = timeout(Duration::from_millis(500), &mut ninth)
            .await
            .expect("9th push should resume once a slot frees up");
        assert!(accepted);
    }

    #[tokio::test]
    async fn receiver_is_fused_after_sentinel() {
        let (tx, mut rx) = audio_queue();
        assert!(tx.push(chunk(0)).await);
        tx.finish().await;

        assert_eq!(rx.recv().await.expect("chunk").seq, 0);
        assert!(rx.recv().await.is_none());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn push_reports_consumer_gone() {
        let (tx, rx) = audio_queue();
        drop(rx);
        assert!(!tx.push(chunk(0)).await);
    }
}
