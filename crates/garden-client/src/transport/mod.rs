//! Frame transport seam between the session and the network.
//!
//! A [`Connector`] authenticates against a room and opens a [`Transport`],
//! a pair of text frame halves. [`web::WebConnector`] talks to the real
//! server; [`memory::MemoryTransport`] backs tests and local tooling.

pub mod memory;
pub mod web;

use crate::cookies::CookieJar;
use crate::error::TransportResult;
use async_trait::async_trait;
use garden_core::{PlayerId, RoomId};

pub use memory::{MemoryPeer, MemoryTransport};
pub use web::WebConnector;

/// Writing half of a connection.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> TransportResult<()>;

    /// Close the connection. Closing twice is not an error.
    async fn close(&mut self) -> TransportResult<()>;
}

/// Reading half of a connection.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Next text frame, or `None` once the peer has closed the connection.
    async fn next_text(&mut self) -> Option<TransportResult<String>>;
}

/// An open connection.
pub struct Transport {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

impl Transport {
    pub fn new(sink: impl FrameSink + 'static, source: impl FrameSource + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            source: Box::new(source),
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// Result of an authentication request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Authentication {
    /// Whether the server accepted the session.
    pub authenticated: bool,
    /// Raw `Set-Cookie` headers of the response.
    pub set_cookies: Vec<String>,
}

/// Opens connections to rooms.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Ask the server to authenticate `cookies` for `room`.
    async fn authenticate(
        &self,
        room: &RoomId,
        cookies: &CookieJar,
    ) -> TransportResult<Authentication>;

    /// Open a socket to `room` as `player_id`.
    async fn open(
        &self,
        room: &RoomId,
        player_id: &PlayerId,
        cookies: &CookieJar,
    ) -> TransportResult<Transport>;
}
