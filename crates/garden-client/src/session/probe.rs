//! Room probe: confirm a freshly opened socket leads into the room.

use crate::audit::AuditLog;
use crate::config::SessionSettings;
use crate::error::{SessionError, SessionResult, TransportError};
use crate::transport::Transport;
use garden_core::message::{BARE_PONG, is_bare_ping};
use garden_core::{Document, InboundMessage, JsonValue, OutboundMessage, PlayerId, RoomId, patch, world};
use std::time::Duration;
use tokio::time::Instant;

pub(crate) struct Probe<'a> {
    pub room: &'a RoomId,
    pub player_id: &'a PlayerId,
    pub settings: &'a SessionSettings,
    pub audit: &'a AuditLog,
}

impl Probe<'_> {
    /// Run the join handshake on `transport` and return the room document.
    ///
    /// Sends the game selection commands, waits for the first snapshot and,
    /// when the player is not listed yet, keeps applying updates for a short
    /// grace period. The caller closes the transport on error.
    pub async fn run(&self, transport: &mut Transport) -> SessionResult<Document> {
        self.send(transport, OutboundMessage::vote_for_game()).await?;
        self.send(transport, OutboundMessage::set_selected_game()).await?;

        let deadline = Instant::now() + self.settings.welcome_timeout;
        let text = loop {
            let text = self
                .next_frame(transport, deadline, self.settings.welcome_timeout, "snapshot")
                .await?;
            if is_bare_ping(&text) {
                self.pong(transport).await?;
                continue;
            }
            break text;
        };

        let value: JsonValue =
            serde_json::from_str(&text).map_err(|_| self.unexpected("non-JSON"))?;
        self.audit_received(&value);
        let mut document = self.snapshot_of(value)?;

        if world::is_player_in_room(&document, self.player_id) {
            if world::is_room_full_for(&document, self.player_id) {
                return Err(self.room_full());
            }
            return Ok(document);
        }

        tracing::debug!(room = %self.room, "not listed yet; waiting for membership");
        let deadline = Instant::now() + self.settings.membership_grace;
        loop {
            let text = match self
                .next_frame(transport, deadline, self.settings.membership_grace, "membership")
                .await
            {
                Ok(text) => text,
                Err(SessionError::Transport(TransportError::Timeout { .. })) => break,
                Err(err) => return Err(err),
            };
            if is_bare_ping(&text) {
                self.pong(transport).await?;
                continue;
            }
            let Ok(value) = serde_json::from_str::<JsonValue>(&text) else {
                continue;
            };
            self.audit_received(&value);
            match InboundMessage::from_value(value) {
                Ok(InboundMessage::PatchBatch { patches: Some(ops) }) => {
                    patch::apply_batch(&mut document, &ops);
                }
                Ok(InboundMessage::Snapshot {
                    full_state: Some(state),
                }) => document = state,
                _ => continue,
            }
            if world::is_player_in_room(&document, self.player_id) {
                tracing::debug!(room = %self.room, "membership confirmed");
                return Ok(document);
            }
        }

        if world::is_room_full_for(&document, self.player_id) {
            Err(self.room_full())
        } else {
            Err(SessionError::PlayerNotPresent {
                room: self.room.to_string(),
            })
        }
    }

    fn snapshot_of(&self, value: JsonValue) -> SessionResult<Document> {
        let kind = value
            .get("type")
            .and_then(JsonValue::as_str)
            .unwrap_or("untyped")
            .to_owned();
        match InboundMessage::from_value(value) {
            Ok(InboundMessage::Snapshot {
                full_state: Some(state),
            }) if state.pointer("/data/players").is_some() => Ok(state),
            Ok(InboundMessage::Snapshot { .. }) => Err(self.unexpected("incomplete Welcome")),
            _ => Err(self.unexpected(&kind)),
        }
    }

    async fn next_frame(
        &self,
        transport: &mut Transport,
        deadline: Instant,
        window: Duration,
        waiting_for: &'static str,
    ) -> SessionResult<String> {
        match tokio::time::timeout_at(deadline, transport.source.next_text()).await {
            Err(_) => Err(TransportError::Timeout {
                duration_ms: window.as_millis() as u64,
                waiting_for,
            }
            .into()),
            Ok(None) => Err(TransportError::Closed.into()),
            Ok(Some(frame)) => Ok(frame?),
        }
    }

    async fn send(&self, transport: &mut Transport, message: OutboundMessage) -> SessionResult<()> {
        let text = message.to_text().map_err(|source| SessionError::Encode {
            kind: message.kind.clone(),
            source,
        })?;
        transport.sink.send_text(text.clone()).await?;
        self.audit.record("SENT", &text);
        Ok(())
    }

    async fn pong(&self, transport: &mut Transport) -> SessionResult<()> {
        transport.sink.send_text(BARE_PONG.to_owned()).await?;
        self.audit.record("SENT", BARE_PONG);
        Ok(())
    }

    fn audit_received(&self, value: &JsonValue) {
        let kind = value.get("type").and_then(JsonValue::as_str).unwrap_or("untyped");
        self.audit.record_json(&format!("RECEIVED ({kind})"), value);
    }

    fn unexpected(&self, found: &str) -> SessionError {
        SessionError::UnexpectedFrame {
            room: self.room.to_string(),
            found: found.to_owned(),
        }
    }

    fn room_full(&self) -> SessionError {
        SessionError::RoomFull {
            room: self.room.to_string(),
        }
    }
}
