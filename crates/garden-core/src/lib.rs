//! Core types for the garden sync protocol.
//!
//! The server mirrors its world to clients as one JSON document: a full
//! snapshot on join followed by a stream of RFC 6902 style patch batches.
//! This crate holds everything that can be expressed without a network
//! connection:
//!
//! - [`pointer`] resolves slash-delimited pointers against a [`Document`]
//! - [`patch`] applies `replace` / `add` / `remove` operations best-effort
//! - [`world`] navigates the game-specific branches (seats, players, pets)
//! - [`message`] defines inbound and outbound wire frames
//! - [`types`] holds identifiers and coordinates
//!
//! # Example
//!
//! ```rust
//! use garden_core::{patch, pointer};
//! use serde_json::json;
//!
//! let mut doc = json!({"child": {"data": {"coins": 0}}});
//! let outcome = patch::apply_batch(&mut doc, &[
//!     json!({"op": "replace", "path": "/child/data/coins", "value": 50}),
//!     json!({"op": "remove", "path": "/child/data/missing"}),
//! ]);
//!
//! assert_eq!(outcome.applied, 1);
//! assert_eq!(outcome.failures.len(), 1);
//! assert_eq!(pointer::get(&doc, "/child/data/coins").unwrap(), &json!(50));
//! ```

pub mod error;
pub mod message;
pub mod patch;
pub mod pointer;
pub mod types;
pub mod world;

pub use error::{PatchError, PatchResult, PointerError, PointerResult};
pub use message::{InboundMessage, OutboundMessage};
pub use patch::{BatchOutcome, PatchFailure};
pub use types::{PlayerId, Position, RoomId};

/// Re-export to ensure the same type is used
pub use serde_json::Value as JsonValue;

/// The mirrored server document.
///
/// Kept as an untyped JSON tree: the server decides its shape and the client
/// only checks for the branches it needs before navigating them.
pub type Document = JsonValue;
