//! Settings file, reconnection policy and session tuning.
//!
//! The settings file is a JSON object shared with other tools, so keys this
//! crate does not know about are preserved whenever it is rewritten.
//!
//! ```json
//! {
//!   "player_id": "p_4kX9mQ2wZr7bN3Tc",
//!   "cookies": "mc_jwt=...",
//!   "room_id": "MG7",
//!   "search_main_rooms": true,
//!   "reconnection": {"max_retries": 5, "base_delay": 5, "max_delay": 60}
//! }
//! ```

use crate::cookies::CookieJar;
use crate::error::{ConfigError, ConfigResult};
use garden_core::{JsonValue, PlayerId, RoomId};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default settings file name.
pub const DEFAULT_CONFIG_FILE: &str = "bot_config.json";

/// Host serving both the authentication API and the room sockets.
pub const DEFAULT_HOST: &str = "magicgarden.gg";

/// Client build the server expects in URLs.
pub const DEFAULT_GAME_VERSION: &str = "cb622cd";

/// Number of rooms in the public pool.
pub const MAIN_ROOM_COUNT: u32 = 15;

/// Bounded exponential backoff between reconnection attempts.
///
/// Delays are whole seconds, as stored in the settings file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Attempts allowed before giving up (0–100).
    pub max_retries: u32,
    /// Delay before the first retry (1–60 s).
    pub base_delay: u64,
    /// Upper bound for any delay (`base_delay`–300 s).
    pub max_delay: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: 5,
            max_delay: 60,
        }
    }
}

impl ReconnectPolicy {
    /// Build a policy from raw values, clamping each into its allowed range.
    #[must_use]
    pub fn clamped(max_retries: i64, base_delay: i64, max_delay: i64) -> Self {
        let base_delay = base_delay.clamp(1, 60);
        let max_delay = max_delay.min(300).max(base_delay);
        Self {
            max_retries: max_retries.clamp(0, 100) as u32,
            base_delay: base_delay as u64,
            max_delay: max_delay as u64,
        }
    }

    /// Delay before retry number `attempt` (1-based):
    /// `min(base * 2^(attempt - 1), max)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let secs = self.base_delay.saturating_mul(factor).min(self.max_delay);
        Duration::from_secs(secs)
    }
}

/// Timing and endpoint knobs of a session. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub host: String,
    pub game_version: String,
    /// How long the probe waits for the first snapshot.
    pub welcome_timeout: Duration,
    /// How long the probe keeps listening for us to appear in the room.
    pub membership_grace: Duration,
    /// Interval between heartbeat frames.
    pub heartbeat_interval: Duration,
    /// How long startup waits for a confirmed seat.
    pub seat_wait: Duration,
    /// Poll interval while waiting for a seat.
    pub seat_poll: Duration,
    /// How long sibling tasks get to stop before they are aborted.
    pub shutdown_grace: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            game_version: DEFAULT_GAME_VERSION.to_owned(),
            welcome_timeout: Duration::from_secs(5),
            membership_grace: Duration::from_secs(3),
            heartbeat_interval: Duration::from_secs(2),
            seat_wait: Duration::from_secs(10),
            seat_poll: Duration::from_millis(100),
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

/// Which rooms to try, in what order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomPlan {
    /// Room requested on the command line.
    pub override_room: Option<RoomId>,
    /// Room of the last successful connection.
    pub last_room: Option<RoomId>,
    /// Whether to fall back to the public pool.
    pub search_main_rooms: bool,
}

impl RoomPlan {
    /// Candidate rooms, deduplicated, in priority order: the override (or,
    /// without one, the last room), then the public pool when searching.
    #[must_use]
    pub fn candidates(&self) -> Vec<RoomId> {
        let preferred = self.override_room.as_ref().or(self.last_room.as_ref());
        let mut rooms: Vec<RoomId> = preferred.cloned().into_iter().collect();
        if self.search_main_rooms {
            for room in RoomId::main_pool(MAIN_ROOM_COUNT) {
                if !rooms.contains(&room) {
                    rooms.push(room);
                }
            }
        }
        rooms
    }
}

/// Saves state the session learns at runtime.
///
/// Failures are logged by the implementation and never reach the session.
pub trait Persistence: Send + Sync {
    /// Store refreshed cookies.
    fn save_cookies(&self, cookies: &CookieJar);
    /// Store the room of a successful connection.
    fn save_last_room(&self, room: &RoomId);
}

/// Persistence that keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPersistence;

impl Persistence for NoPersistence {
    fn save_cookies(&self, _cookies: &CookieJar) {}
    fn save_last_room(&self, _room: &RoomId) {}
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawReconnect {
    max_retries: Option<i64>,
    base_delay: Option<i64>,
    max_delay: Option<i64>,
}

/// Loaded and validated settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub player_id: PlayerId,
    pub cookies: CookieJar,
    pub last_room: Option<RoomId>,
    pub search_main_rooms: bool,
    pub reconnection: ReconnectPolicy,
}

impl BotConfig {
    /// Load settings from `path`, filling in and writing back defaults.
    ///
    /// A missing file counts as empty. A missing player id is generated;
    /// missing `search_main_rooms`, `reconnection` and `cookies` entries are
    /// added with defaults. Reconnection values are clamped.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for a file that is not a JSON object,
    /// [`ConfigError::Io`] if it cannot be read, and
    /// [`ConfigError::MissingCookies`] when no cookies are configured (after
    /// the defaults have been written so the user can fill them in).
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let file = ConfigFile::new(path.as_ref());
        let mut raw = file.read()?;
        let mut dirty = false;

        let existing_id = raw
            .get("player_id")
            .and_then(JsonValue::as_str)
            .filter(|id| !id.is_empty())
            .map(PlayerId::new);
        let player_id = match existing_id {
            Some(id) => id,
            None => {
                let id = PlayerId::generate();
                tracing::info!(player_id = %id, "generated new player id");
                raw.insert("player_id".into(), JsonValue::String(id.to_string()));
                dirty = true;
                id
            }
        };

        let search_main_rooms = match raw.get("search_main_rooms").and_then(JsonValue::as_bool) {
            Some(search) => search,
            None => {
                raw.insert("search_main_rooms".into(), JsonValue::Bool(true));
                dirty = true;
                true
            }
        };

        let stored_policy = raw.get("reconnection").filter(|v| v.is_object()).cloned();
        let reconnection = match stored_policy {
            Some(value) => {
                let parsed: RawReconnect =
                    serde_json::from_value(value).map_err(|source| ConfigError::Parse {
                        path: file.display(),
                        source,
                    })?;
                let defaults = ReconnectPolicy::default();
                ReconnectPolicy::clamped(
                    parsed.max_retries.unwrap_or(i64::from(defaults.max_retries)),
                    parsed.base_delay.unwrap_or(defaults.base_delay as i64),
                    parsed.max_delay.unwrap_or(defaults.max_delay as i64),
                )
            }
            None => {
                let defaults = ReconnectPolicy::default();
                raw.insert("reconnection".into(), to_json(&defaults));
                dirty = true;
                defaults
            }
        };

        let cookies = raw
            .get("cookies")
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_owned();
        if !raw.contains_key("cookies") {
            raw.insert("cookies".into(), JsonValue::String(String::new()));
            dirty = true;
        }

        let last_room = raw
            .get("room_id")
            .and_then(JsonValue::as_str)
            .filter(|room| !room.is_empty())
            .map(RoomId::new);

        if dirty {
            if let Err(err) = file.write(&raw) {
                tracing::warn!(%err, "failed to write settings defaults");
            }
        }

        if cookies.is_empty() {
            return Err(ConfigError::MissingCookies {
                path: file.display(),
            });
        }

        tracing::info!(
            %player_id,
            search_main_rooms,
            max_retries = reconnection.max_retries,
            base_delay = reconnection.base_delay,
            max_delay = reconnection.max_delay,
            "settings loaded"
        );

        Ok(Self {
            player_id,
            cookies: CookieJar::parse(&cookies),
            last_room,
            search_main_rooms,
            reconnection,
        })
    }

    /// Room plan for this configuration with an optional override.
    #[must_use]
    pub fn room_plan(&self, override_room: Option<RoomId>) -> RoomPlan {
        RoomPlan {
            override_room,
            last_room: self.last_room.clone(),
            search_main_rooms: self.search_main_rooms,
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> JsonValue {
    serde_json::to_value(value).unwrap_or(JsonValue::Null)
}

/// The settings file on disk. Updates rewrite a single key and keep
/// everything else, including keys this crate does not use.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }

    fn read(&self) -> ConfigResult<Map<String, JsonValue>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.display(),
                    source,
                });
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: self.display(),
            source,
        })
    }

    fn write(&self, raw: &Map<String, JsonValue>) -> ConfigResult<()> {
        let text = serde_json::to_string_pretty(raw).map_err(|source| ConfigError::Parse {
            path: self.display(),
            source,
        })?;
        std::fs::write(&self.path, text).map_err(|source| ConfigError::Io {
            path: self.display(),
            source,
        })
    }

    /// Set one top-level key, leaving the rest of the file intact.
    /// Skips the write when the value is unchanged.
    ///
    /// # Errors
    ///
    /// Propagates read, parse and write failures.
    pub fn update_key(&self, key: &str, value: JsonValue) -> ConfigResult<()> {
        let mut raw = self.read()?;
        if raw.get(key) == Some(&value) {
            return Ok(());
        }
        raw.insert(key.to_owned(), value);
        self.write(&raw)
    }
}

impl Persistence for ConfigFile {
    fn save_cookies(&self, cookies: &CookieJar) {
        if let Err(err) = self.update_key("cookies", JsonValue::String(cookies.to_header())) {
            tracing::warn!(%err, "failed to persist cookies");
        }
    }

    fn save_last_room(&self, room: &RoomId) {
        if let Err(err) = self.update_key("room_id", JsonValue::String(room.to_string())) {
            tracing::warn!(%err, room = %room, "failed to persist last room");
        }
    }
}
