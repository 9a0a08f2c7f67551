//! Scripted server for session integration tests.
//!
//! Rooms are configured up front: whether authentication succeeds, which
//! cookies it sets and which in-memory sockets `open` hands out. The test
//! keeps the [`MemoryPeer`] of each socket to play the server side.

#![allow(dead_code)]

use async_trait::async_trait;
use garden_client::config::{Persistence, RoomPlan, SessionSettings};
use garden_client::cookies::CookieJar;
use garden_client::error::{TransportError, TransportResult};
use garden_client::transport::{Authentication, Connector, MemoryPeer, MemoryTransport, Transport};
use garden_client::{Session, SessionStore};
use garden_core::{JsonValue, PlayerId, RoomId};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

pub const PLAYER: &str = "p_me";

#[derive(Default)]
struct RoomScript {
    authenticated: bool,
    set_cookies: Vec<String>,
    sockets: VecDeque<Transport>,
}

#[derive(Clone, Default)]
pub struct ScriptedConnector {
    rooms: Arc<Mutex<HashMap<String, RoomScript>>>,
    events: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authentication for `room` answers "not authenticated".
    pub fn reject(&self, room: &str) {
        self.rooms.lock().entry(room.to_owned()).or_default().authenticated = false;
    }

    /// Authentication for `room` succeeds and sets `set_cookies`.
    pub fn accept(&self, room: &str, set_cookies: &[&str]) {
        let mut rooms = self.rooms.lock();
        let script = rooms.entry(room.to_owned()).or_default();
        script.authenticated = true;
        script.set_cookies = set_cookies.iter().map(|c| (*c).to_owned()).collect();
    }

    /// Queue a socket for `room`, accepting authentication, and return its
    /// server end.
    pub fn socket(&self, room: &str) -> MemoryPeer {
        let (transport, peer) = MemoryTransport::pair();
        let mut rooms = self.rooms.lock();
        let script = rooms.entry(room.to_owned()).or_default();
        script.authenticated = true;
        script.sockets.push_back(transport);
        peer
    }

    /// `auth <room>` / `open <room>` in call order.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn authenticate(
        &self,
        room: &RoomId,
        _cookies: &CookieJar,
    ) -> TransportResult<Authentication> {
        self.events.lock().push(format!("auth {room}"));
        let rooms = self.rooms.lock();
        let script = rooms.get(room.as_str()).ok_or(TransportError::Http {
            status: 404,
            message: "unknown room".into(),
        })?;
        Ok(Authentication {
            authenticated: script.authenticated,
            set_cookies: script.set_cookies.clone(),
        })
    }

    async fn open(
        &self,
        room: &RoomId,
        _player_id: &PlayerId,
        _cookies: &CookieJar,
    ) -> TransportResult<Transport> {
        self.events.lock().push(format!("open {room}"));
        self.rooms
            .lock()
            .get_mut(room.as_str())
            .and_then(|script| script.sockets.pop_front())
            .ok_or(TransportError::ConnectionFailed {
                reason: "no socket scripted".into(),
            })
    }
}

/// Records what the session asked to persist.
#[derive(Clone, Default)]
pub struct RecordingPersistence {
    pub cookies: Arc<Mutex<Vec<String>>>,
    pub rooms: Arc<Mutex<Vec<String>>>,
}

impl Persistence for RecordingPersistence {
    fn save_cookies(&self, cookies: &CookieJar) {
        self.cookies.lock().push(cookies.to_header());
    }

    fn save_last_room(&self, room: &RoomId) {
        self.rooms.lock().push(room.to_string());
    }
}

pub fn store() -> SessionStore {
    SessionStore::new(PlayerId::new(PLAYER), CookieJar::parse("mc_jwt=old; theme=dark"))
}

pub fn session(
    connector: &ScriptedConnector,
    plan: RoomPlan,
) -> (Session<ScriptedConnector>, RecordingPersistence) {
    let persistence = RecordingPersistence::default();
    let session = Session::new(connector.clone(), store(), SessionSettings::default())
        .with_room_plan(plan)
        .with_persistence(persistence.clone());
    (session, persistence)
}

pub fn only(room: &str) -> RoomPlan {
    RoomPlan {
        override_room: Some(RoomId::new(room)),
        last_room: None,
        search_main_rooms: false,
    }
}

/// Snapshot frame listing us as a player, seated at `seat` with `pets`.
pub fn welcome(seat: Option<usize>, pets: &[&str]) -> JsonValue {
    let mut slots = vec![JsonValue::Null; 6];
    if let Some(seat) = seat {
        let pets: Vec<_> = pets.iter().map(|id| json!({"id": id})).collect();
        slots[seat] = json!({
            "playerId": PLAYER,
            "data": {"coinsCount": 100, "petSlots": pets}
        });
    }
    json!({
        "type": "Welcome",
        "fullState": {
            "data": {"players": [{"id": PLAYER, "name": "Gardener"}]},
            "child": {"scope": "Quinoa", "data": {"userSlots": slots}}
        }
    })
}

/// Snapshot of a room whose six seats are all taken by others.
pub fn full_room() -> JsonValue {
    let slots: Vec<_> = (0..6).map(|i| json!({"playerId": format!("p_{i}")})).collect();
    json!({
        "type": "Welcome",
        "fullState": {
            "data": {"players": [{"id": PLAYER}]},
            "child": {"scope": "Quinoa", "data": {"userSlots": slots}}
        }
    })
}

/// Read frames the client sent until one has `type == kind`.
pub async fn expect_sent(peer: &mut MemoryPeer, kind: &str) -> JsonValue {
    loop {
        let frame = peer
            .recv_json()
            .await
            .unwrap_or_else(|| panic!("connection ended before a {kind} frame"));
        if frame["type"] == kind || frame == JsonValue::String(kind.to_owned()) {
            return frame;
        }
    }
}
