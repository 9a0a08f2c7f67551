//! Routes inbound frames into the [`SessionStore`].

use crate::audit::AuditLog;
use crate::error::{SessionError, SessionResult};
use crate::store::{Counter, SessionStore};
use garden_core::{Document, InboundMessage, JsonValue, patch, world};

/// What a processed frame amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    /// A snapshot replaced the document.
    Snapshot,
    /// A patch batch was applied; counts are per operation.
    Patched { applied: usize, failed: usize },
    /// A patch batch arrived before any snapshot and was dropped.
    Discarded,
    /// Server heartbeat request.
    HeartbeatRequest,
    /// Server heartbeat reply.
    HeartbeatResponse,
    /// A well-formed frame with nothing to act on.
    Ignored { kind: Option<String> },
    /// The frame was not JSON.
    Unparsed,
}

/// Applies inbound frames to the store and writes them to the audit trail.
///
/// Processing never fails on malformed input: bad frames and bad patch
/// operations are logged and skipped. The only error is
/// [`SessionError::RoomFull`], raised when a snapshot shows every seat held
/// by someone else.
#[derive(Debug, Clone)]
pub struct MessageProcessor {
    store: SessionStore,
    audit: AuditLog,
}

impl MessageProcessor {
    pub fn new(store: SessionStore, audit: AuditLog) -> Self {
        Self { store, audit }
    }

    /// The store frames are applied to.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// The audit trail frames are recorded in.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Process one text frame.
    ///
    /// # Errors
    ///
    /// [`SessionError::RoomFull`] if the frame is a snapshot of a full room.
    pub fn process(&self, text: &str) -> SessionResult<Processed> {
        self.store.increment(Counter::MessagesReceived);

        let value: JsonValue = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(%err, "non-JSON frame");
                self.audit.record("RECEIVED (RAW)", text);
                return Ok(Processed::Unparsed);
            }
        };

        let kind = value
            .get("type")
            .and_then(JsonValue::as_str)
            .map(str::to_owned);
        self.audit.record_json(
            &format!("RECEIVED ({})", kind.as_deref().unwrap_or("untyped")),
            &value,
        );

        let message = match InboundMessage::from_value(value) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(?kind, %err, "ignoring malformed frame");
                return Ok(Processed::Ignored { kind });
            }
        };

        match message {
            InboundMessage::Snapshot {
                full_state: Some(state),
            } => {
                self.apply_snapshot(state)?;
                Ok(Processed::Snapshot)
            }
            InboundMessage::Snapshot { full_state: None } => {
                tracing::warn!("snapshot frame without fullState");
                Ok(Processed::Ignored { kind })
            }
            InboundMessage::PatchBatch { patches: Some(ops) } => Ok(self.apply_patches(&ops)),
            InboundMessage::PatchBatch { patches: None } => {
                tracing::warn!("patch frame without patches");
                Ok(Processed::Ignored { kind })
            }
            InboundMessage::HeartbeatRequest { .. } => {
                self.store.increment(Counter::HeartbeatsReceived);
                Ok(Processed::HeartbeatRequest)
            }
            InboundMessage::HeartbeatResponse { .. } => {
                self.store.increment(Counter::HeartbeatsAcked);
                Ok(Processed::HeartbeatResponse)
            }
            InboundMessage::Unknown => Ok(Processed::Ignored { kind }),
        }
    }

    /// Install `state` as the document and refresh identity from it.
    ///
    /// # Errors
    ///
    /// [`SessionError::RoomFull`] if all seats are held by other players. The
    /// document is still installed so observers can see the room.
    pub fn apply_snapshot(&self, state: Document) -> SessionResult<()> {
        let player_id = self.store.player_id();
        let full = world::is_room_full_for(&state, &player_id);
        let occupied = world::occupied_seats(&state).len();
        let host = world::host_player_id(&state).map(str::to_owned);

        self.store.install_document(state);
        self.store.refresh_identity();
        self.store.touch_last_update();

        let seat = self.store.local_seat();
        tracing::info!(
            ?seat,
            occupied,
            is_host = host.as_deref() == Some(player_id.as_str()),
            player = %self.store.identity().display_name(),
            "snapshot installed"
        );

        if full {
            let room = self
                .store
                .room_id()
                .map(|r| r.to_string())
                .unwrap_or_default();
            tracing::warn!(%room, "all seats are taken by other players");
            return Err(SessionError::RoomFull { room });
        }
        Ok(())
    }

    fn apply_patches(&self, ops: &[JsonValue]) -> Processed {
        let Some(outcome) = self
            .store
            .mutate_locked(|doc| patch::apply_batch(doc, ops))
        else {
            tracing::warn!(ops = ops.len(), "patch batch before snapshot; discarding");
            return Processed::Discarded;
        };

        let failed = outcome.failures.len();
        self.store
            .add(Counter::PatchesApplied, outcome.applied as u64);
        self.store.add(Counter::PatchOpsFailed, failed as u64);
        if failed > 0 {
            tracing::warn!("{failed} of {} operations failed", outcome.total());
        }

        self.store.touch_last_update();
        self.store.refresh_identity();
        Processed::Patched {
            applied: outcome.applied,
            failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::CookieJar;
    use assert_matches::assert_matches;
    use garden_core::{PlayerId, RoomId};
    use serde_json::json;

    fn processor() -> MessageProcessor {
        let store = SessionStore::new(PlayerId::new("p_me"), CookieJar::default());
        store.set_room_id(Some(RoomId::new("MG3")));
        MessageProcessor::new(store, AuditLog::disabled())
    }

    fn welcome(slots: JsonValue) -> String {
        json!({
            "type": "Welcome",
            "fullState": {
                "data": {"players": [{"id": "p_me", "name": "Me"}]},
                "child": {"scope": "Quinoa", "data": {"userSlots": slots}}
            }
        })
        .to_string()
    }

    #[test]
    fn snapshot_installs_document_and_identity() {
        let p = processor();
        let frame = welcome(json!([null, null, {"playerId": "p_me", "data": {"coinsCount": 0}}]));
        assert_eq!(p.process(&frame).unwrap(), Processed::Snapshot);
        assert_eq!(p.store().local_seat(), Some(2));
        assert_eq!(p.store().player_name().as_deref(), Some("Me"));
        assert!(p.store().statistics().last_update.is_some());
    }

    #[test]
    fn full_room_snapshot_is_an_error() {
        let p = processor();
        let slots: Vec<_> = (0..6).map(|i| json!({"playerId": format!("p_{i}")})).collect();
        let err = p.process(&welcome(JsonValue::Array(slots))).unwrap_err();
        assert_matches!(err, SessionError::RoomFull { room } if room == "MG3");
    }

    #[test]
    fn patches_before_snapshot_are_discarded() {
        let p = processor();
        let frame = json!({
            "type": "PartialState",
            "patches": [{"op": "add", "path": "/x", "value": 1}]
        });
        assert_eq!(p.process(&frame.to_string()).unwrap(), Processed::Discarded);
        assert!(p.store().snapshot().is_none());
        assert_eq!(p.store().statistics().patches_applied, 0);
    }

    #[test]
    fn patch_counting_is_per_operation() {
        let p = processor();
        p.process(&welcome(json!([{"playerId": "p_me", "data": {"coinsCount": 0}}])))
            .unwrap();

        let frame = json!({
            "type": "PartialState",
            "patches": [
                {"op": "replace", "path": "/child/data/userSlots/0/data/coinsCount", "value": 50},
                {"op": "remove", "path": "/child/data/userSlots/0/data/nothing"},
                {"op": "add", "path": "/child/data/userSlots/1", "value": null}
            ]
        });
        assert_eq!(
            p.process(&frame.to_string()).unwrap(),
            Processed::Patched {
                applied: 2,
                failed: 1
            }
        );

        let stats = p.store().statistics();
        assert_eq!(stats.patches_applied, 2);
        assert_eq!(stats.patch_ops_failed, 1);
        assert_eq!(stats.messages_received, 2);
        assert_eq!(
            p.store().local_seat_record().unwrap()["data"]["coinsCount"],
            json!(50)
        );
    }

    #[test]
    fn patches_can_move_us_into_a_seat() {
        let p = processor();
        p.process(&welcome(json!([null, null]))).unwrap();
        assert_eq!(p.store().local_seat(), None);

        let frame = json!({
            "type": "PartialState",
            "patches": [{"op": "replace", "path": "/child/data/userSlots/1", "value": {"playerId": "p_me"}}]
        });
        p.process(&frame.to_string()).unwrap();
        assert_eq!(p.store().local_seat(), Some(1));
    }

    #[test]
    fn heartbeats_are_counted() {
        let p = processor();
        assert_eq!(
            p.process(r#"{"type":"Ping","id":5}"#).unwrap(),
            Processed::HeartbeatRequest
        );
        assert_eq!(
            p.process(r#"{"type":"Pong","id":5}"#).unwrap(),
            Processed::HeartbeatResponse
        );
        let stats = p.store().statistics();
        assert_eq!(stats.heartbeats_received, 1);
        assert_eq!(stats.heartbeats_acked, 1);
    }

    #[test]
    fn odd_frames_are_not_errors() {
        let p = processor();
        assert_eq!(p.process("garbage").unwrap(), Processed::Unparsed);
        assert_eq!(
            p.process(r#"{"type":"Chat","text":"hi"}"#).unwrap(),
            Processed::Ignored {
                kind: Some("Chat".into())
            }
        );
        assert_eq!(
            p.process(r#"{"no":"type"}"#).unwrap(),
            Processed::Ignored { kind: None }
        );
        assert_eq!(
            p.process(r#"{"type":"PartialState"}"#).unwrap(),
            Processed::Ignored {
                kind: Some("PartialState".into())
            }
        );
        assert_eq!(p.store().statistics().messages_received, 4);
    }

    #[test]
    fn frames_are_audited() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let store = SessionStore::new(PlayerId::new("p_me"), CookieJar::default());
        let p = MessageProcessor::new(store, AuditLog::create(&path).unwrap());

        p.process(r#"{"type":"Pong"}"#).unwrap();
        p.process("not json").unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("RECEIVED (Pong)"));
        assert!(text.contains("RECEIVED (RAW)"));
        assert!(text.contains("\nnot json\n"));
    }
}
