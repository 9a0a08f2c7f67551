//! Shared store for the mirrored document, session identity and statistics.

use crate::cookies::CookieJar;
use chrono::{DateTime, Local};
use garden_core::types::Position;
use garden_core::{Document, JsonValue, PlayerId, RoomId, world};
use parking_lot::ReentrantMutex;
use serde::Serialize;
use std::cell::RefCell;
use std::sync::Arc;

/// Who this client is and where it sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable client-generated id.
    pub player_id: PlayerId,
    /// Display name from the room player list; falls back to the id.
    pub player_name: Option<String>,
    /// Room of the current or last connection.
    pub room_id: Option<RoomId>,
    /// Confirmed seat index, unknown until the server lists us in a seat.
    pub seat: Option<usize>,
    /// Last avatar position we reported, in server coordinates.
    pub position: Option<Position>,
    /// Session cookies sent with authentication and connection requests.
    pub cookies: CookieJar,
}

impl Identity {
    /// A fresh identity with nothing confirmed yet.
    pub fn new(player_id: PlayerId, cookies: CookieJar) -> Self {
        Self {
            player_id,
            player_name: None,
            room_id: None,
            seat: None,
            position: None,
            cookies,
        }
    }

    /// Name to show for this player.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.player_name.as_deref().unwrap_or(&self.player_id)
    }
}

/// Monotonic connection counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub messages_received: u64,
    pub messages_sent: u64,
    /// Heartbeats we sent.
    pub heartbeats_sent: u64,
    /// Heartbeats the server sent us (JSON `Ping` or bare `ping`).
    pub heartbeats_received: u64,
    /// `Pong` replies to our heartbeats.
    pub heartbeats_acked: u64,
    /// Bare `pong` replies we sent.
    pub pongs_sent: u64,
    /// Patch operations applied, counted per operation.
    pub patches_applied: u64,
    /// Patch operations skipped because they failed.
    pub patch_ops_failed: u64,
    /// When the document last changed.
    pub last_update: Option<DateTime<Local>>,
}

/// Selects one of the [`Statistics`] counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    MessagesReceived,
    MessagesSent,
    HeartbeatsSent,
    HeartbeatsReceived,
    HeartbeatsAcked,
    PongsSent,
    PatchesApplied,
    PatchOpsFailed,
}

impl Statistics {
    fn counter_mut(&mut self, counter: Counter) -> &mut u64 {
        match counter {
            Counter::MessagesReceived => &mut self.messages_received,
            Counter::MessagesSent => &mut self.messages_sent,
            Counter::HeartbeatsSent => &mut self.heartbeats_sent,
            Counter::HeartbeatsReceived => &mut self.heartbeats_received,
            Counter::HeartbeatsAcked => &mut self.heartbeats_acked,
            Counter::PongsSent => &mut self.pongs_sent,
            Counter::PatchesApplied => &mut self.patches_applied,
            Counter::PatchOpsFailed => &mut self.patch_ops_failed,
        }
    }

    /// Current value of a counter.
    #[must_use]
    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::MessagesReceived => self.messages_received,
            Counter::MessagesSent => self.messages_sent,
            Counter::HeartbeatsSent => self.heartbeats_sent,
            Counter::HeartbeatsReceived => self.heartbeats_received,
            Counter::HeartbeatsAcked => self.heartbeats_acked,
            Counter::PongsSent => self.pongs_sent,
            Counter::PatchesApplied => self.patches_applied,
            Counter::PatchOpsFailed => self.patch_ops_failed,
        }
    }
}

struct StoreCells {
    document: RefCell<Option<Document>>,
    identity: RefCell<Identity>,
    stats: RefCell<Statistics>,
}

/// Thread-safe owner of the mirrored document, identity and statistics.
///
/// All three live behind one `parking_lot::ReentrantMutex`, each in its own
/// cell. The receive loop applies a whole patch batch inside a single
/// [`mutate_locked`](Self::mutate_locked) call, so readers on other threads
/// see the document either before or after the batch, never in between.
///
/// # Reentrancy
///
/// Identity and statistics accessors may be called from inside a
/// `mutate_locked` or `read` callback on the same thread. Document accessors
/// ([`snapshot`](Self::snapshot), [`read`](Self::read),
/// [`mutate_locked`](Self::mutate_locked), [`replace_document`](Self::replace_document))
/// must not be nested inside a `mutate_locked` callback; the document cell
/// is already mutably borrowed there and the nested call panics.
///
/// Lock-held sections are synchronous; never hold a callback across an
/// `.await`.
///
/// # Example
///
/// ```rust
/// use garden_client::store::{Counter, SessionStore};
/// use garden_core::PlayerId;
/// use serde_json::json;
///
/// let store = SessionStore::new(PlayerId::new("p_me"), Default::default());
/// assert!(store.snapshot().is_none());
///
/// store.replace_document(&json!({"child": {"data": {"coins": 1}}}));
/// store.mutate_locked(|doc| {
///     doc["child"]["data"]["coins"] = json!(2);
///     store.increment(Counter::PatchesApplied);
/// });
///
/// let coins = store.read(|doc| doc.map(|d| d["child"]["data"]["coins"].clone()));
/// assert_eq!(coins, Some(json!(2)));
/// assert_eq!(store.statistics().patches_applied, 1);
/// ```
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<ReentrantMutex<StoreCells>>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("identity", &self.identity())
            .field("has_document", &self.has_document())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Create an empty store for `player_id`.
    pub fn new(player_id: PlayerId, cookies: CookieJar) -> Self {
        Self {
            inner: Arc::new(ReentrantMutex::new(StoreCells {
                document: RefCell::new(None),
                identity: RefCell::new(Identity::new(player_id, cookies)),
                stats: RefCell::new(Statistics::default()),
            })),
        }
    }

    // ---- document ----

    /// Deep copy of the current document, or `None` before the first
    /// snapshot. The copy is independent of later mutations.
    #[must_use]
    pub fn snapshot(&self) -> Option<Document> {
        let cells = self.inner.lock();
        let document = cells.document.borrow();
        document.clone()
    }

    /// Run `f` against the live document without copying it.
    ///
    /// The store stays locked for the duration of `f`.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(Option<&Document>) -> R,
    {
        let cells = self.inner.lock();
        let document = cells.document.borrow();
        f(document.as_ref())
    }

    /// Whether a snapshot has been received.
    #[must_use]
    pub fn has_document(&self) -> bool {
        self.read(|doc| doc.is_some())
    }

    /// Mutate the live document in place under the store lock.
    ///
    /// Returns `None` without calling `f` when there is no document yet.
    pub fn mutate_locked<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut Document) -> R,
    {
        let cells = self.inner.lock();
        let mut document = cells.document.borrow_mut();
        document.as_mut().map(f)
    }

    /// Install a deep copy of `doc` as the current document.
    pub fn replace_document(&self, doc: &Document) {
        let cells = self.inner.lock();
        *cells.document.borrow_mut() = Some(doc.clone());
    }

    /// Take ownership of `doc` as the current document.
    pub fn install_document(&self, doc: Document) {
        let cells = self.inner.lock();
        *cells.document.borrow_mut() = Some(doc);
    }

    // ---- seats ----

    /// Deep copy of the seat record held by `player_id`.
    #[must_use]
    pub fn find_seat_for(&self, player_id: &str) -> Option<JsonValue> {
        self.read(|doc| doc.and_then(|d| world::seat_of(d, player_id)).cloned())
    }

    /// Seat index currently held by `player_id` according to the document.
    #[must_use]
    pub fn seat_index_for(&self, player_id: &str) -> Option<usize> {
        self.read(|doc| doc.and_then(|d| world::seat_index_of(d, player_id)))
    }

    /// The confirmed seat of the local player.
    #[must_use]
    pub fn local_seat(&self) -> Option<usize> {
        let cells = self.inner.lock();
        let seat = cells.identity.borrow().seat;
        seat
    }

    /// Deep copy of the local player's seat record.
    #[must_use]
    pub fn local_seat_record(&self) -> Option<JsonValue> {
        let cells = self.inner.lock();
        let player_id = cells.identity.borrow().player_id.clone();
        let document = cells.document.borrow();
        document
            .as_ref()
            .and_then(|d| world::seat_of(d, &player_id))
            .cloned()
    }

    /// Re-derive display name and seat from the current document.
    ///
    /// A name listed in the room wins; without one the name falls back to the
    /// player id the first time. A seat is only overwritten when the document
    /// lists us in one.
    pub fn refresh_identity(&self) {
        let cells = self.inner.lock();
        let document = cells.document.borrow();
        let Some(doc) = document.as_ref() else {
            return;
        };
        let mut identity = cells.identity.borrow_mut();
        let player_id = identity.player_id.clone();

        if world::is_player_in_room(doc, &player_id) {
            match world::player_name(doc, &player_id) {
                Some(name) => identity.player_name = Some(name.to_owned()),
                None if identity.player_name.is_none() => {
                    identity.player_name = Some(player_id.to_string());
                }
                None => {}
            }
        }
        if let Some(seat) = world::seat_index_of(doc, &player_id) {
            if identity.seat != Some(seat) {
                tracing::info!(seat, "seat confirmed");
            }
            identity.seat = Some(seat);
        }
    }

    // ---- identity ----

    /// Copy of the full identity.
    #[must_use]
    pub fn identity(&self) -> Identity {
        let cells = self.inner.lock();
        let identity = cells.identity.borrow().clone();
        identity
    }

    #[must_use]
    pub fn player_id(&self) -> PlayerId {
        self.with_identity(|id| id.player_id.clone())
    }

    #[must_use]
    pub fn player_name(&self) -> Option<String> {
        self.with_identity(|id| id.player_name.clone())
    }

    #[must_use]
    pub fn room_id(&self) -> Option<RoomId> {
        self.with_identity(|id| id.room_id.clone())
    }

    pub fn set_room_id(&self, room: Option<RoomId>) {
        self.update_identity(|id| id.room_id = room);
    }

    /// Forget the confirmed seat, e.g. when joining another room.
    pub fn clear_seat(&self) {
        self.update_identity(|id| id.seat = None);
    }

    #[must_use]
    pub fn position(&self) -> Option<Position> {
        self.with_identity(|id| id.position)
    }

    pub fn set_position(&self, position: Position) {
        self.update_identity(|id| id.position = Some(position));
    }

    #[must_use]
    pub fn cookies(&self) -> CookieJar {
        self.with_identity(|id| id.cookies.clone())
    }

    pub fn set_cookies(&self, cookies: CookieJar) {
        self.update_identity(|id| id.cookies = cookies);
    }

    fn with_identity<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Identity) -> R,
    {
        let cells = self.inner.lock();
        let identity = cells.identity.borrow();
        f(&identity)
    }

    fn update_identity<F>(&self, f: F)
    where
        F: FnOnce(&mut Identity),
    {
        let cells = self.inner.lock();
        f(&mut cells.identity.borrow_mut());
    }

    // ---- statistics ----

    /// Add one to `counter`.
    pub fn increment(&self, counter: Counter) {
        self.add(counter, 1);
    }

    /// Add `n` to `counter`.
    pub fn add(&self, counter: Counter, n: u64) {
        let cells = self.inner.lock();
        let mut stats = cells.stats.borrow_mut();
        let value = stats.counter_mut(counter);
        *value = value.saturating_add(n);
    }

    /// Stamp the last-update time with the current local time.
    pub fn touch_last_update(&self) {
        let cells = self.inner.lock();
        cells.stats.borrow_mut().last_update = Some(Local::now());
    }

    /// Copy of all counters.
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        let cells = self.inner.lock();
        let stats = cells.stats.borrow().clone();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garden_core::patch;
    use serde_json::json;
    use std::thread;

    fn store() -> SessionStore {
        SessionStore::new(PlayerId::new("p_me"), CookieJar::parse("a=1"))
    }

    fn room_doc() -> Document {
        json!({
            "data": {"players": [{"id": "p_me", "name": "Gardener"}]},
            "child": {"scope": "Quinoa", "data": {"userSlots": [
                null,
                {"playerId": "p_me", "data": {"coinsCount": 0}},
                null, null, null, null
            ]}}
        })
    }

    #[test]
    fn empty_store() {
        let store = store();
        assert!(store.snapshot().is_none());
        assert!(!store.has_document());
        assert_eq!(store.mutate_locked(|_| 1), None);
        assert_eq!(store.local_seat(), None);
        assert_eq!(store.statistics(), Statistics::default());
    }

    #[test]
    fn snapshot_is_isolated_from_later_mutation() {
        let store = store();
        store.replace_document(&room_doc());
        let before = store.snapshot().unwrap();

        store.mutate_locked(|doc| {
            doc["child"]["data"]["userSlots"][1]["data"]["coinsCount"] = json!(50);
        });

        assert_eq!(before["child"]["data"]["userSlots"][1]["data"]["coinsCount"], json!(0));
        let after = store.snapshot().unwrap();
        assert_eq!(after["child"]["data"]["userSlots"][1]["data"]["coinsCount"], json!(50));
    }

    #[test]
    fn replace_document_copies_input() {
        let store = store();
        let mut doc = room_doc();
        store.replace_document(&doc);
        doc["data"] = json!(null);
        assert!(store.read(|d| d.unwrap()["data"].is_object()));
    }

    #[test]
    fn refresh_identity_picks_up_name_and_seat() {
        let store = store();
        store.install_document(room_doc());
        store.refresh_identity();
        assert_eq!(store.local_seat(), Some(1));
        assert_eq!(store.player_name().as_deref(), Some("Gardener"));
        assert_eq!(store.seat_index_for("p_me"), Some(1));
        assert_eq!(store.seat_index_for("p_other"), None);
        assert_eq!(
            store.local_seat_record().unwrap()["data"]["coinsCount"],
            json!(0)
        );
    }

    #[test]
    fn seat_record_follows_patches() {
        let store = store();
        store.install_document(json!({
            "child": {"scope": "Quinoa", "data": {"userSlots": [
                {"playerId": "p1", "data": {"coinsCount": 0}}
            ]}}
        }));
        store.mutate_locked(|doc| {
            let ops = [json!({
                "op": "replace",
                "path": "/child/data/userSlots/0/data/coinsCount",
                "value": 50
            })];
            patch::apply_batch(doc, &ops)
        });

        let mut seat = store.find_seat_for("p1").unwrap();
        assert_eq!(seat["data"]["coinsCount"], json!(50));
        assert_eq!(store.find_seat_for("p2"), None);

        seat["data"]["coinsCount"] = json!(0);
        assert_eq!(
            store.find_seat_for("p1").unwrap()["data"]["coinsCount"],
            json!(50)
        );
    }

    #[test]
    fn unnamed_player_falls_back_to_id() {
        let store = store();
        let mut doc = room_doc();
        doc["data"]["players"][0]["name"] = json!("");
        store.install_document(doc);
        store.refresh_identity();
        assert_eq!(store.identity().display_name(), "p_me");
    }

    #[test]
    fn identity_and_stats_are_reachable_inside_mutation() {
        let store = store();
        store.install_document(room_doc());
        let seen = store.mutate_locked(|doc| {
            let ops = [json!({"op": "replace", "path": "/data/players/0/name", "value": "Renamed"})];
            let outcome = patch::apply_batch(doc, &ops);
            store.add(Counter::PatchesApplied, outcome.applied as u64);
            store.set_position(Position::new(40, 14));
            store.player_id()
        });
        assert_eq!(seen.as_deref(), Some("p_me"));
        assert_eq!(store.statistics().patches_applied, 1);
        assert_eq!(store.position(), Some(Position::new(40, 14)));
    }

    #[test]
    fn readers_never_see_half_applied_batches() {
        let store = store();
        store.install_document(json!({"a": 0, "b": 0}));

        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for i in 1..=500 {
                    store.mutate_locked(|doc| {
                        let ops = [
                            json!({"op": "replace", "path": "/a", "value": i}),
                            json!({"op": "replace", "path": "/b", "value": i}),
                        ];
                        patch::apply_batch(doc, &ops);
                    });
                }
            })
        };
        let reader = {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    let (a, b) = store.read(|doc| {
                        let doc = doc.unwrap();
                        (doc["a"].clone(), doc["b"].clone())
                    });
                    assert_eq!(a, b);
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(store.snapshot().unwrap(), json!({"a": 500, "b": 500}));
    }

    #[test]
    fn concurrent_mutations_do_not_interleave() {
        let store = store();
        store.install_document(json!({"log": []}));

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        store.mutate_locked(|doc| {
                            let log = doc["log"].as_array_mut().unwrap();
                            log.push(json!(format!("start {w} {i}")));
                            thread::yield_now();
                            log.push(json!(format!("end {w} {i}")));
                        });
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let log = store.snapshot().unwrap()["log"].as_array().unwrap().clone();
        assert_eq!(log.len(), 4 * 200 * 2);
        for pair in log.chunks(2) {
            let end = pair[1].as_str().unwrap();
            let tag = end.strip_prefix("end ").unwrap();
            assert_eq!(pair[0], json!(format!("start {tag}")));
        }
    }

    #[test]
    fn statistics_serialize_with_snake_case_keys() {
        let store = store();
        store.add(Counter::PatchesApplied, 3);
        let value = serde_json::to_value(store.statistics()).unwrap();
        assert_eq!(value["patches_applied"], json!(3));
        assert_eq!(value["last_update"], JsonValue::Null);
    }

    #[test]
    fn counters_accumulate_across_threads() {
        let store = store();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        store.increment(Counter::MessagesReceived);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.statistics().get(Counter::MessagesReceived), 400);
    }

    #[test]
    fn last_update_is_stamped() {
        let store = store();
        assert!(store.statistics().last_update.is_none());
        store.touch_last_update();
        assert!(store.statistics().last_update.is_some());
    }
}
