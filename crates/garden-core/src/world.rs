//! Navigation of the game-specific branches of the mirrored document.
//!
//! ```text
//! {
//!   "data":  { "hostPlayerId": .., "players": [ {"id", "name"}, .. ] },
//!   "child": {
//!     "scope": "Quinoa",
//!     "data":  { "userSlots": [ seat | null; 6 ] }
//!   }
//! }
//! ```
//!
//! A seat record holds `playerId`, its `data` (inventory, `petSlots`,
//! `coinsCount`, garden tiles) and `petSlotInfos` keyed by pet id. Any of
//! these branches may be missing while the server is still filling the
//! document in; every helper here treats absence as "nothing yet".

use crate::types::Position;
use crate::{Document, JsonValue};
use serde_json::Map;

/// Scope name of the garden game inside the room document.
pub const GAME_SCOPE: &str = "Quinoa";

/// Number of seats in a garden.
pub const SEAT_COUNT: usize = 6;

/// The game scope's `data` branch, if the child scope is the garden game.
#[must_use]
pub fn game_state(doc: &Document) -> Option<&JsonValue> {
    let child = doc.get("child")?;
    if child.get("scope")?.as_str()? != GAME_SCOPE {
        return None;
    }
    child.get("data")
}

fn game_state_mut(doc: &mut Document) -> Option<&mut JsonValue> {
    let child = doc.get_mut("child")?;
    if child.get("scope")?.as_str()? != GAME_SCOPE {
        return None;
    }
    child.get_mut("data")
}

/// The seat list, occupied or not.
#[must_use]
pub fn user_slots(doc: &Document) -> Option<&Vec<JsonValue>> {
    game_state(doc)?.get("userSlots")?.as_array()
}

/// Index of the seat held by `player_id`.
#[must_use]
pub fn seat_index_of(doc: &Document, player_id: &str) -> Option<usize> {
    user_slots(doc)?
        .iter()
        .position(|seat| seat_player_id(seat) == Some(player_id))
}

/// The seat record held by `player_id`.
#[must_use]
pub fn seat_of<'a>(doc: &'a Document, player_id: &str) -> Option<&'a JsonValue> {
    user_slots(doc)?
        .iter()
        .find(|seat| seat_player_id(seat) == Some(player_id))
}

/// Mutable access to the seat record held by `player_id`.
pub fn seat_of_mut<'a>(doc: &'a mut Document, player_id: &str) -> Option<&'a mut JsonValue> {
    game_state_mut(doc)?
        .get_mut("userSlots")?
        .as_array_mut()?
        .iter_mut()
        .find(|seat| seat_player_id(seat) == Some(player_id))
}

/// Indices of seats that hold any record.
#[must_use]
pub fn occupied_seats(doc: &Document) -> Vec<usize> {
    user_slots(doc)
        .map(|slots| {
            slots
                .iter()
                .enumerate()
                .filter(|(_, seat)| is_occupied(seat))
                .map(|(index, _)| index)
                .collect()
        })
        .unwrap_or_default()
}

/// True when every seat is taken and none of them belongs to `player_id`.
#[must_use]
pub fn is_room_full_for(doc: &Document, player_id: &str) -> bool {
    occupied_seats(doc).len() >= SEAT_COUNT && seat_index_of(doc, player_id).is_none()
}

/// The room's player list (`data.players`), empty if absent.
#[must_use]
pub fn room_players(doc: &Document) -> &[JsonValue] {
    doc.get("data")
        .and_then(|data| data.get("players"))
        .and_then(JsonValue::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Whether `player_id` appears in the room's player list.
#[must_use]
pub fn is_player_in_room(doc: &Document, player_id: &str) -> bool {
    room_players(doc).iter().any(|player| {
        player.get("id").and_then(JsonValue::as_str) == Some(player_id)
    })
}

/// Display name of `player_id` as listed in the room, if set and non-empty.
#[must_use]
pub fn player_name<'a>(doc: &'a Document, player_id: &str) -> Option<&'a str> {
    room_players(doc)
        .iter()
        .find(|player| player.get("id").and_then(JsonValue::as_str) == Some(player_id))?
        .get("name")?
        .as_str()
        .filter(|name| !name.is_empty())
}

/// The room host's player id.
#[must_use]
pub fn host_player_id(doc: &Document) -> Option<&str> {
    doc.get("data")?.get("hostPlayerId")?.as_str()
}

/// Ids of the active pets in a seat record (`data.petSlots[*].id`).
#[must_use]
pub fn pet_ids(seat: &JsonValue) -> Vec<String> {
    seat.get("data")
        .and_then(|data| data.get("petSlots"))
        .and_then(JsonValue::as_array)
        .map(|pets| {
            pets.iter()
                .filter_map(|pet| pet.get("id")?.as_str())
                .filter(|id| !id.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Record a pet position under the seat's `petSlotInfos`, creating the
/// intermediate entries as needed. Any existing fields on the entry are kept.
pub fn set_pet_position(seat: &mut JsonValue, pet_id: &str, position: Position) {
    let Some(seat) = seat.as_object_mut() else {
        return;
    };
    let Some(infos) = ensure_object(
        seat.entry("petSlotInfos")
            .or_insert_with(|| JsonValue::Object(Map::new())),
    ) else {
        return;
    };
    let Some(entry) = ensure_object(
        infos
            .entry(pet_id.to_owned())
            .or_insert_with(|| JsonValue::Object(Map::new())),
    ) else {
        return;
    };
    entry.insert("position".to_owned(), position.to_json());
}

fn ensure_object(value: &mut JsonValue) -> Option<&mut Map<String, JsonValue>> {
    if !value.is_object() {
        *value = JsonValue::Object(Map::new());
    }
    value.as_object_mut()
}

fn seat_player_id(seat: &JsonValue) -> Option<&str> {
    seat.get("playerId")?.as_str()
}

fn is_occupied(seat: &JsonValue) -> bool {
    match seat {
        JsonValue::Null => false,
        JsonValue::Object(map) => !map.is_empty(),
        _ => true,
    }
}
