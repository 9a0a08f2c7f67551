//! In-process transport over channels.

use super::{FrameSink, FrameSource, Transport};
use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use garden_core::JsonValue;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Builds connected [`Transport`] / [`MemoryPeer`] pairs.
///
/// ```rust
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use garden_client::transport::MemoryTransport;
///
/// let (mut transport, mut peer) = MemoryTransport::pair();
/// peer.push("ping");
/// assert_eq!(transport.source.next_text().await.unwrap().unwrap(), "ping");
///
/// transport.sink.send_text("pong".into()).await.unwrap();
/// assert_eq!(peer.recv().await.as_deref(), Some("pong"));
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryTransport;

impl MemoryTransport {
    /// A client-side transport and the server end driving it.
    #[must_use]
    pub fn pair() -> (Transport, MemoryPeer) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();

        let transport = Transport::new(
            MemorySink {
                outbound: outbound_tx,
                closed: closed.clone(),
            },
            MemorySource {
                inbound: inbound_rx,
                closed: closed.clone(),
            },
        );
        let peer = MemoryPeer {
            inbound: Some(inbound_tx),
            outbound: outbound_rx,
            closed,
        };
        (transport, peer)
    }
}

struct MemorySink {
    outbound: mpsc::UnboundedSender<String>,
    closed: CancellationToken,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_text(&mut self, text: String) -> TransportResult<()> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(text)
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.closed.cancel();
        Ok(())
    }
}

struct MemorySource {
    inbound: mpsc::UnboundedReceiver<String>,
    closed: CancellationToken,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_text(&mut self) -> Option<TransportResult<String>> {
        tokio::select! {
            biased;
            frame = self.inbound.recv() => frame.map(Ok),
            _ = self.closed.cancelled() => None,
        }
    }
}

/// Server end of a [`MemoryTransport`].
#[derive(Debug)]
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<String>>,
    outbound: mpsc::UnboundedReceiver<String>,
    closed: CancellationToken,
}

impl MemoryPeer {
    /// Queue a frame for the client. Returns `false` once disconnected.
    pub fn push(&self, text: impl Into<String>) -> bool {
        match &self.inbound {
            Some(tx) => tx.send(text.into()).is_ok(),
            None => false,
        }
    }

    /// Queue a JSON frame for the client.
    pub fn push_json(&self, value: &JsonValue) -> bool {
        self.push(value.to_string())
    }

    /// Close the server side. The client reads any queued frames, then sees
    /// the end of the stream.
    pub fn disconnect(&mut self) {
        self.inbound = None;
    }

    /// Next frame sent by the client, or `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Next frame sent by the client parsed as JSON. Non-JSON frames such as
    /// bare heartbeats come back as strings.
    pub async fn recv_json(&mut self) -> Option<JsonValue> {
        let text = self.recv().await?;
        Some(serde_json::from_str(&text).unwrap_or(JsonValue::String(text)))
    }

    /// Every frame the client has sent so far without waiting.
    pub fn drain(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Whether the client closed the connection.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (mut transport, mut peer) = MemoryTransport::pair();

        assert!(peer.push("one"));
        assert!(peer.push_json(&serde_json::json!({"type": "Ping"})));
        assert_eq!(transport.source.next_text().await.unwrap().unwrap(), "one");
        assert_eq!(
            transport.source.next_text().await.unwrap().unwrap(),
            r#"{"type":"Ping"}"#
        );

        transport.sink.send_text("pong".into()).await.unwrap();
        transport.sink.send_text(r#"{"a":1}"#.into()).await.unwrap();
        assert_eq!(peer.recv_json().await, Some(JsonValue::String("pong".into())));
        assert_eq!(peer.drain(), vec![r#"{"a":1}"#.to_owned()]);
    }

    #[tokio::test]
    async fn peer_disconnect_ends_the_stream_after_queued_frames() {
        let (mut transport, mut peer) = MemoryTransport::pair();
        peer.push("last");
        peer.disconnect();

        assert!(!peer.push("dropped"));
        assert_eq!(transport.source.next_text().await.unwrap().unwrap(), "last");
        assert!(transport.source.next_text().await.is_none());
    }

    #[tokio::test]
    async fn client_close_stops_both_halves() {
        let (mut transport, peer) = MemoryTransport::pair();
        transport.sink.close().await.unwrap();
        transport.sink.close().await.unwrap();

        assert!(peer.is_closed());
        assert!(transport.source.next_text().await.is_none());
        assert_matches!(
            transport.sink.send_text("late".into()).await,
            Err(TransportError::Closed)
        );
    }
}
