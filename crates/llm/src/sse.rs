//! The writer side of the client-facing SSE stream.
//!
//! The orchestrator runs in its own task and publishes named frames into a
//! bounded channel; the axum handler turns them into wire events and
//! drains them into the socket. The bound is the back-pressure mechanism:
//! when the client reads slowly the channel fills, `send` suspends, and
//! the orchestrator stops pulling provider chunks. A failed send means the
//! client is gone, which the orchestrator treats as cancellation.

use serde::Serialize;
use tokio::sync::mpsc;

/// Frames buffered between the orchestrator and the socket. Small on
/// purpose: the buffer absorbs bursts, back-pressure does the rest.
const CHANNEL_CAPACITY: usize = 64;

/// One named event before wire framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    /// Event name (`delta`, `tool_call`, ...).
    pub(crate) name: &'static str,
    /// JSON payload.
    pub(crate) data: String,
}

/// The consumer half disappeared: the client disconnected or the response
/// was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ClientGone;

/// Single-producer writer for one request's event stream.
#[derive(Clone)]
pub(crate) struct EventSender {
    tx: mpsc::Sender<SseFrame>,
}

impl EventSender {
    /// Serialize and enqueue one named event. Suspends under back-pressure;
    /// fails only when the client is gone.
    pub(crate) async fn send<T: Serialize>(&self, name: &'static str, payload: &T) -> Result<(), ClientGone> {
        let data = sonic_rs::to_string(payload).unwrap_or_else(|e| {
            log::error!("Failed to serialize '{name}' event: {e}");
            "{}".to_string()
        });

        self.tx.send(SseFrame { name, data }).await.map_err(|_| ClientGone)
    }
}

/// Create the writer and the stream of frames for the response body.
pub(crate) fn channel() -> (EventSender, impl futures::Stream<Item = SseFrame> + Send) {
    let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);

    let stream = futures::stream::poll_fn(move |cx| rx.poll_recv(cx));

    (EventSender { tx }, stream)
}
