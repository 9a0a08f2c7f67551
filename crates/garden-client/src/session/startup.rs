//! Per-connection background routines: heartbeat, spawn and pet seeding.

use super::handle::SessionHandle;
use crate::error::SessionResult;
use crate::store::{Counter, SessionStore};
use chrono::Utc;
use garden_core::{OutboundMessage, Position, world};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

/// Send a heartbeat every `interval` until the connection goes down.
pub(crate) async fn heartbeat(handle: SessionHandle, store: SessionStore, interval: Duration) {
    loop {
        tokio::select! {
            _ = handle.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        if !handle.is_connected() {
            break;
        }
        let id = Utc::now().timestamp_millis();
        match handle.send(&OutboundMessage::ping(id)).await {
            Ok(()) => store.increment(Counter::HeartbeatsSent),
            Err(err) => {
                tracing::debug!(%err, "heartbeat stopped");
                break;
            }
        }
    }
}

/// Timing for [`startup`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct SeatWait {
    pub timeout: Duration,
    pub poll: Duration,
}

/// Move the avatar to the seat's spawn point and seed pet positions.
///
/// Waits for the seat to be confirmed when the snapshot did not list us in
/// one yet. Gives up quietly if no seat shows up in time.
pub(crate) async fn startup(
    handle: SessionHandle,
    store: SessionStore,
    wait: SeatWait,
) -> SessionResult<()> {
    let seat = match store.local_seat() {
        Some(seat) => Some(seat),
        None => wait_for_seat(&handle, &store, wait).await,
    };
    let Some(seat) = seat else {
        if handle.is_connected() {
            tracing::warn!(
                timeout_secs = wait.timeout.as_secs(),
                "no seat confirmed; skipping spawn"
            );
        }
        return Ok(());
    };
    let Some(spawn) = Position::spawn_for_seat(seat) else {
        tracing::warn!(seat, "seat has no spawn point");
        return Ok(());
    };

    handle.send(&OutboundMessage::player_position(spawn)).await?;
    store.set_position(spawn);
    tracing::info!(seat, x = spawn.x, y = spawn.y, "moved to spawn");

    seed_pet_positions(&handle, &store, seat).await
}

async fn wait_for_seat(handle: &SessionHandle, store: &SessionStore, wait: SeatWait) -> Option<usize> {
    let deadline = Instant::now() + wait.timeout;
    while Instant::now() < deadline {
        if let Some(seat) = store.local_seat() {
            return Some(seat);
        }
        tokio::select! {
            _ = handle.cancelled() => return None,
            _ = tokio::time::sleep(wait.poll) => {}
        }
    }
    store.local_seat()
}

/// Place every active pet at a random spot of our garden, then record the
/// positions locally ahead of the server's echo.
async fn seed_pet_positions(
    handle: &SessionHandle,
    store: &SessionStore,
    seat: usize,
) -> SessionResult<()> {
    let Some(record) = store.local_seat_record() else {
        return Ok(());
    };
    let positions: BTreeMap<String, Position> = world::pet_ids(&record)
        .into_iter()
        .filter_map(|id| Some((id, Position::random_local().local_to_server(seat)?)))
        .collect();
    if positions.is_empty() {
        return Ok(());
    }

    handle
        .send(&OutboundMessage::pet_positions(&positions))
        .await?;

    let player_id = store.player_id();
    store.mutate_locked(|doc| {
        if let Some(record) = world::seat_of_mut(doc, &player_id) {
            for (pet_id, position) in &positions {
                world::set_pet_position(record, pet_id, *position);
            }
        }
    });
    tracing::info!(pets = positions.len(), "seeded pet positions");
    Ok(())
}
