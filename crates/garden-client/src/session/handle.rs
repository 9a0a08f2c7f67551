use crate::audit::AuditLog;
use crate::error::{SessionError, SessionResult};
use crate::store::{Counter, SessionStore};
use crate::transport::FrameSink;
use garden_core::OutboundMessage;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Sending side of one live connection, shared by every task of that
/// connection.
///
/// Once the connection is marked down, sends fail immediately with
/// [`SessionError::NotConnected`] without touching the socket, the counters
/// or the audit trail.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    connected: AtomicBool,
    cancel: CancellationToken,
    sink: Mutex<Box<dyn FrameSink>>,
    store: SessionStore,
    audit: AuditLog,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    pub(crate) fn new(
        sink: Box<dyn FrameSink>,
        store: SessionStore,
        audit: AuditLog,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                connected: AtomicBool::new(true),
                cancel,
                sink: Mutex::new(sink),
                store,
                audit,
            }),
        }
    }

    /// Whether the connection is still up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Resolves once the connection is going down.
    pub async fn cancelled(&self) {
        self.inner.cancel.cancelled().await;
    }

    /// Token cancelled when the connection goes down.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Serialize and send `message`.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] when the connection is down,
    /// [`SessionError::Encode`] if serialization fails, and the transport
    /// error if the write fails (which also marks the connection down).
    pub async fn send(&self, message: &OutboundMessage) -> SessionResult<()> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        let text = message.to_text().map_err(|source| SessionError::Encode {
            kind: message.kind.clone(),
            source,
        })?;
        self.write(text).await?;
        self.inner.store.increment(Counter::MessagesSent);
        Ok(())
    }

    /// Send a bare text frame such as a heartbeat reply.
    pub(crate) async fn send_raw(&self, text: &str) -> SessionResult<()> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.write(text.to_owned()).await
    }

    async fn write(&self, text: String) -> SessionResult<()> {
        let mut sink = self.inner.sink.lock().await;
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        match sink.send_text(text.clone()).await {
            Ok(()) => {
                self.inner.audit.record("SENT", &text);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%err, "write failed; marking connection down");
                self.mark_disconnected();
                Err(err.into())
            }
        }
    }

    /// Mark the connection down and wake every task waiting on it.
    pub(crate) fn mark_disconnected(&self) {
        self.inner.connected.store(false, Ordering::Release);
        self.inner.cancel.cancel();
    }

    /// Close the socket.
    pub(crate) async fn close(&self) {
        self.mark_disconnected();
        let mut sink = self.inner.sink.lock().await;
        if let Err(err) = sink.close().await {
            tracing::debug!(%err, "error closing socket");
        }
    }
}
