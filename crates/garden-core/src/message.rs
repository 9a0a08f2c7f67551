//! Wire frames exchanged with the room server.
//!
//! Inbound frames are JSON objects discriminated by their `type` field.
//! Outbound frames carry a `scopePath` naming the receiving scope, a `type`
//! and any number of extra top-level fields.

use crate::types::Position;
use crate::world::GAME_SCOPE;
use crate::JsonValue;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::collections::BTreeMap;

/// Bare text keep-alive sent by the server outside the JSON protocol.
pub const BARE_PING: &str = "ping";

/// Reply to [`BARE_PING`].
pub const BARE_PONG: &str = "pong";

/// Scope of room-level commands.
pub const ROOM_SCOPE: &str = "Room";

/// Whether a raw text frame is the bare keep-alive (case and surrounding
/// whitespace are ignored).
#[must_use]
pub fn is_bare_ping(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(BARE_PING)
}

/// A frame received from the server.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    /// Full document snapshot, sent on join and occasionally afterwards.
    #[serde(rename = "Welcome")]
    Snapshot {
        #[serde(rename = "fullState", default)]
        full_state: Option<JsonValue>,
    },

    /// Ordered batch of patch operations against the current document.
    #[serde(rename = "PartialState")]
    PatchBatch {
        #[serde(default)]
        patches: Option<Vec<JsonValue>>,
    },

    /// Server-initiated heartbeat.
    #[serde(rename = "Ping")]
    HeartbeatRequest {
        #[serde(default)]
        id: Option<JsonValue>,
    },

    /// Server reply to one of our heartbeats.
    #[serde(rename = "Pong")]
    HeartbeatResponse {
        #[serde(default)]
        id: Option<JsonValue>,
    },

    /// Any other frame type. Audited and otherwise ignored.
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    /// Decode a frame from an already parsed JSON value.
    ///
    /// # Errors
    ///
    /// Fails if the value is not an object with a string `type`.
    pub fn from_value(value: JsonValue) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// The wire name of this frame type, or `None` for [`InboundMessage::Unknown`].
    #[must_use]
    pub fn wire_type(&self) -> Option<&'static str> {
        match self {
            Self::Snapshot { .. } => Some("Welcome"),
            Self::PatchBatch { .. } => Some("PartialState"),
            Self::HeartbeatRequest { .. } => Some("Ping"),
            Self::HeartbeatResponse { .. } => Some("Pong"),
            Self::Unknown => None,
        }
    }
}

/// A command frame sent to the server.
///
/// # Example
///
/// ```rust
/// use garden_core::OutboundMessage;
/// use serde_json::json;
///
/// let msg = OutboundMessage::game("HarvestCrop").with("slot", 3).with("slotsIndex", 0);
/// assert_eq!(
///     serde_json::to_value(&msg).unwrap(),
///     json!({"scopePath": ["Room", "Quinoa"], "type": "HarvestCrop", "slot": 3, "slotsIndex": 0})
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OutboundMessage {
    #[serde(rename = "scopePath")]
    pub scope_path: Vec<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub fields: Map<String, JsonValue>,
}

impl OutboundMessage {
    /// A command addressed to the given scope path.
    pub fn new<S: Into<String>>(
        scope_path: impl IntoIterator<Item = S>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            scope_path: scope_path.into_iter().map(Into::into).collect(),
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    /// A room-level command (`["Room"]`).
    pub fn room(kind: impl Into<String>) -> Self {
        Self::new([ROOM_SCOPE], kind)
    }

    /// A garden game command (`["Room", "Quinoa"]`).
    pub fn game(kind: impl Into<String>) -> Self {
        Self::new([ROOM_SCOPE, GAME_SCOPE], kind)
    }

    /// Add a top-level field.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Vote for the garden game when joining a room.
    pub fn vote_for_game() -> Self {
        Self::room("VoteForGame").with("gameName", GAME_SCOPE)
    }

    /// Select the garden game when joining a room.
    pub fn set_selected_game() -> Self {
        Self::room("SetSelectedGame").with("gameName", GAME_SCOPE)
    }

    /// Heartbeat carrying a millisecond timestamp id.
    pub fn ping(id: i64) -> Self {
        Self::game("Ping").with("id", id)
    }

    /// Move the avatar to a server position.
    pub fn player_position(position: Position) -> Self {
        Self::game("PlayerPosition").with("position", position.to_json())
    }

    /// Place pets at server positions, keyed by pet id.
    pub fn pet_positions(positions: &BTreeMap<String, Position>) -> Self {
        let map: Map<String, JsonValue> = positions
            .iter()
            .map(|(id, pos)| (id.clone(), pos.to_json()))
            .collect();
        Self::game("PetPositions").with("petPositions", JsonValue::Object(map))
    }

    /// Look up an extra field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&JsonValue> {
        self.fields.get(key)
    }

    /// Serialize to the JSON text sent on the wire.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` serialization errors.
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
