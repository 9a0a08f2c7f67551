//! Client runtime for the garden sync protocol.
//!
//! Keeps a local mirror of a room's world document in sync over a websocket
//! and keeps the connection alive.
//!
//! # Architecture
//!
//! 1. **[`SessionStore`]** - the mirrored document, player identity and
//!    counters behind one reentrant lock
//! 2. **[`MessageProcessor`]** - applies snapshots and patch batches
//! 3. **[`Session`]** - picks a room, authenticates, probes and runs one
//!    connection at a time over a [`transport::Connector`]
//! 4. **[`Supervisor`]** - reconnects with bounded exponential backoff
//!
//! Automation hooks in through [`automation::AutomationTask`]; every
//! registered task is restarted on each connection.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use garden_client::config::{BotConfig, ConfigFile, SessionSettings, DEFAULT_CONFIG_FILE};
//! use garden_client::{Session, SessionStore, Supervisor, WebConnector};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BotConfig::load(DEFAULT_CONFIG_FILE)?;
//! let settings = SessionSettings::default();
//! let store = SessionStore::new(config.player_id.clone(), config.cookies.clone());
//! let stop = CancellationToken::new();
//!
//! let mut session = Session::new(WebConnector::new(&settings), store, settings)
//!     .with_room_plan(config.room_plan(None))
//!     .with_persistence(ConfigFile::new(DEFAULT_CONFIG_FILE))
//!     .with_stop_token(stop.clone());
//!
//! Supervisor::new(config.reconnection).run(&mut session, &stop).await?;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod automation;
pub mod config;
pub mod cookies;
pub mod error;
pub mod processor;
pub mod session;
pub mod store;
pub mod supervisor;
pub mod transport;

pub use audit::AuditLog;
pub use cookies::CookieJar;
pub use error::{ConfigError, SessionError, SessionResult, TransportError};
pub use processor::{MessageProcessor, Processed};
pub use session::{CommandSender, Session, SessionHandle, SessionState};
pub use store::{Counter, Identity, SessionStore, Statistics};
pub use supervisor::{SessionDriver, Supervisor};
pub use transport::WebConnector;
