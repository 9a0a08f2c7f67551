//! Connection lifecycle: pick a room, authenticate, probe, run.
//!
//! A [`Session`] owns the connector and the store for the lifetime of the
//! process. Each successful [`Session::connect`] yields one live connection
//! that [`Session::run`] drives until the server or the stop token ends it.
//! Reconnecting is the supervisor's job.

mod handle;
mod probe;
mod startup;

pub use handle::SessionHandle;

use crate::audit::AuditLog;
use crate::automation::{self, TaskContext, TaskRegistry};
use crate::config::{NoPersistence, Persistence, RoomPlan, SessionSettings};
use crate::cookies::CookieJar;
use crate::error::{SessionError, SessionResult, TransportError};
use crate::processor::MessageProcessor;
use crate::store::{Counter, SessionStore};
use crate::transport::{Connector, FrameSource, Transport};
use garden_core::message::{BARE_PONG, is_bare_ping};
use garden_core::{OutboundMessage, PlayerId, RoomId};
use probe::Probe;
use startup::SeatWait;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Authenticating,
    ProbingRoom,
    Connected,
}

/// Queues commands for the live connection.
///
/// Commands are only accepted while connected. Commands still queued when
/// a connection ends are dropped.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<OutboundMessage>,
    state: watch::Receiver<SessionState>,
}

impl CommandSender {
    /// Queue `message` for sending.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] unless a connection is live.
    pub fn send(&self, message: OutboundMessage) -> SessionResult<()> {
        if *self.state.borrow() != SessionState::Connected {
            return Err(SessionError::NotConnected);
        }
        self.tx
            .send(message)
            .map_err(|_| SessionError::NotConnected)
    }
}

struct Link {
    handle: SessionHandle,
    source: Box<dyn FrameSource>,
}

/// A bot session against one server.
pub struct Session<C> {
    connector: C,
    store: SessionStore,
    processor: MessageProcessor,
    audit: AuditLog,
    settings: SessionSettings,
    plan: RoomPlan,
    persistence: Arc<dyn Persistence>,
    tasks: TaskRegistry,
    stop: CancellationToken,
    state: watch::Sender<SessionState>,
    commands_tx: mpsc::UnboundedSender<OutboundMessage>,
    commands_rx: Arc<Mutex<mpsc::UnboundedReceiver<OutboundMessage>>>,
    link: Option<Link>,
}

impl<C> std::fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &*self.state.borrow())
            .field("plan", &self.plan)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Session<C> {
    pub fn new(connector: C, store: SessionStore, settings: SessionSettings) -> Self {
        let audit = AuditLog::disabled();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            processor: MessageProcessor::new(store.clone(), audit.clone()),
            store,
            audit,
            settings,
            plan: RoomPlan::default(),
            persistence: Arc::new(NoPersistence),
            tasks: TaskRegistry::default(),
            stop: CancellationToken::new(),
            state: watch::channel(SessionState::Disconnected).0,
            commands_tx,
            commands_rx: Arc::new(Mutex::new(commands_rx)),
            link: None,
        }
    }

    #[must_use]
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.processor = MessageProcessor::new(self.store.clone(), audit.clone());
        self.audit = audit;
        self
    }

    #[must_use]
    pub fn with_room_plan(mut self, plan: RoomPlan) -> Self {
        self.plan = plan;
        self
    }

    #[must_use]
    pub fn with_persistence(mut self, persistence: impl Persistence + 'static) -> Self {
        self.persistence = Arc::new(persistence);
        self
    }

    #[must_use]
    pub fn with_tasks(mut self, tasks: TaskRegistry) -> Self {
        self.tasks = tasks;
        self
    }

    /// Use `stop` to end the session. Cancelling it closes the live
    /// connection.
    #[must_use]
    pub fn with_stop_token(mut self, stop: CancellationToken) -> Self {
        self.stop = stop;
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn command_sender(&self) -> CommandSender {
        CommandSender {
            tx: self.commands_tx.clone(),
            state: self.state.subscribe(),
        }
    }

    /// Handle of the connection established by the last [`Session::connect`]
    /// until [`Session::run`] takes it over.
    pub fn handle(&self) -> Option<SessionHandle> {
        self.link.as_ref().map(|link| link.handle.clone())
    }

    /// Send on the pending connection.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] when there is none.
    pub async fn send(&self, message: &OutboundMessage) -> SessionResult<()> {
        match &self.link {
            Some(link) => link.handle.send(message).await,
            None => Err(SessionError::NotConnected),
        }
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(?previous, ?state, "session state changed");
        }
    }

    /// Authenticate the current cookies for `room`.
    ///
    /// Cookies set by the server are merged into the store and persisted
    /// when they change. Returns the cookies to connect with, or `None` if
    /// the request failed or the server did not authenticate us.
    pub async fn authenticate(&self, room: &RoomId) -> Option<CookieJar> {
        let mut cookies = self.store.cookies();
        let auth = match self.connector.authenticate(room, &cookies).await {
            Ok(auth) => auth,
            Err(err) => {
                tracing::warn!(%room, %err, "authentication request failed");
                return None;
            }
        };

        let mut changed = false;
        for header in &auth.set_cookies {
            changed |= cookies.merge_set_cookie(header);
        }
        if changed {
            tracing::debug!(%room, cookies = cookies.len(), "session cookies refreshed");
            self.store.set_cookies(cookies.clone());
            self.persistence.save_cookies(&cookies);
        }

        if !auth.authenticated {
            tracing::warn!(%room, "server did not authenticate the session");
            return None;
        }
        Some(cookies)
    }

    /// Join the first candidate room that accepts us.
    ///
    /// # Errors
    ///
    /// [`SessionError::NoRoomCandidates`] if there is nothing to try and
    /// [`SessionError::NoRoomAvailable`] if every candidate failed.
    pub async fn connect(&mut self) -> SessionResult<RoomId> {
        if let Some(link) = self.link.take() {
            link.handle.close().await;
        }
        let candidates = self.plan.candidates();
        if candidates.is_empty() {
            return Err(SessionError::NoRoomCandidates);
        }

        let player_id = self.store.player_id();
        for room in &candidates {
            if self.stop.is_cancelled() {
                break;
            }
            match self.join(room, &player_id).await {
                Ok(()) => return Ok(room.clone()),
                Err(err) => tracing::info!(%room, %err, "room unavailable"),
            }
        }

        self.set_state(SessionState::Disconnected);
        Err(SessionError::NoRoomAvailable {
            tried: candidates.len(),
        })
    }

    async fn join(&mut self, room: &RoomId, player_id: &PlayerId) -> SessionResult<()> {
        self.set_state(SessionState::Authenticating);
        let cookies = self
            .authenticate(room)
            .await
            .ok_or_else(|| SessionError::AuthenticationFailed {
                room: room.to_string(),
            })?;

        self.set_state(SessionState::ProbingRoom);
        let mut transport = self.connector.open(room, player_id, &cookies).await?;
        let probe = Probe {
            room,
            player_id,
            settings: &self.settings,
            audit: &self.audit,
        };
        let document = match probe.run(&mut transport).await {
            Ok(document) => document,
            Err(err) => {
                close(&mut transport).await;
                return Err(err);
            }
        };

        self.store.set_room_id(Some(room.clone()));
        self.store.clear_seat();
        if let Err(err) = self.processor.apply_snapshot(document) {
            close(&mut transport).await;
            return Err(err);
        }
        self.persistence.save_last_room(room);
        self.plan.last_room = Some(room.clone());

        let Transport { sink, source } = transport;
        let handle = SessionHandle::new(
            sink,
            self.store.clone(),
            self.audit.clone(),
            self.stop.child_token(),
        );
        self.link = Some(Link { handle, source });
        self.set_state(SessionState::Connected);

        let identity = self.store.identity();
        tracing::info!(
            %room,
            player = identity.display_name(),
            seat = ?identity.seat,
            "connected"
        );
        Ok(())
    }

    /// Drive the connection from the last successful [`Session::connect`]
    /// until it ends.
    ///
    /// Heartbeat, startup, command forwarding and every registered
    /// automation task run alongside the receive loop. When the loop ends
    /// they are cancelled and awaited before this returns.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] without a pending connection, the
    /// transport error that ended the connection, or
    /// [`SessionError::RoomFull`] if a later snapshot shows a full room.
    pub async fn run(&mut self) -> SessionResult<()> {
        let Some(Link { handle, mut source }) = self.link.take() else {
            return Err(SessionError::NotConnected);
        };

        let mut tasks = JoinSet::new();
        tasks.spawn(startup::heartbeat(
            handle.clone(),
            self.store.clone(),
            self.settings.heartbeat_interval,
        ));
        let wait = SeatWait {
            timeout: self.settings.seat_wait,
            poll: self.settings.seat_poll,
        };
        let (startup_handle, startup_store) = (handle.clone(), self.store.clone());
        tasks.spawn(async move {
            if let Err(err) = startup::startup(startup_handle, startup_store, wait).await {
                tracing::debug!(%err, "startup interrupted");
            }
        });
        tasks.spawn(forward_commands(handle.clone(), self.commands_rx.clone()));
        for task in self.tasks.instantiate() {
            let ctx = TaskContext {
                handle: handle.clone(),
                store: self.store.clone(),
            };
            tasks.spawn(automation::run_task(task, ctx));
        }

        let result = self.receive(source.as_mut(), &handle).await;

        handle.mark_disconnected();
        self.set_state(SessionState::Disconnected);
        self.join_tasks(tasks).await;
        handle.close().await;
        self.drop_queued_commands().await;

        let stats = self.store.statistics();
        tracing::info!(
            received = stats.messages_received,
            sent = stats.messages_sent,
            heartbeats = stats.heartbeats_sent,
            "connection ended"
        );
        result
    }

    async fn receive(&self, source: &mut dyn FrameSource, handle: &SessionHandle) -> SessionResult<()> {
        loop {
            let frame = tokio::select! {
                _ = handle.cancelled() => {
                    return if self.stop.is_cancelled() {
                        Ok(())
                    } else {
                        Err(TransportError::Closed.into())
                    };
                }
                frame = source.next_text() => frame,
            };
            let text = match frame {
                None => {
                    tracing::info!("server closed the connection");
                    return Ok(());
                }
                Some(Err(err)) => {
                    tracing::warn!(%err, "receive failed");
                    return Err(err.into());
                }
                Some(Ok(text)) => text,
            };

            if is_bare_ping(&text) {
                self.store.increment(Counter::HeartbeatsReceived);
                if handle.send_raw(BARE_PONG).await.is_ok() {
                    self.store.increment(Counter::PongsSent);
                }
                continue;
            }
            self.processor.process(&text)?;
        }
    }

    async fn join_tasks(&self, mut tasks: JoinSet<()>) {
        let drained = tokio::time::timeout(self.settings.shutdown_grace, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(err) = joined {
                    if err.is_panic() {
                        tracing::error!(%err, "connection task panicked");
                    }
                }
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(remaining = tasks.len(), "tasks did not stop in time; aborting");
            tasks.shutdown().await;
        }
    }

    async fn drop_queued_commands(&self) {
        let mut commands = self.commands_rx.lock().await;
        let mut dropped = 0usize;
        while commands.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::warn!(dropped, "discarded commands queued for the closed connection");
        }
    }
}

async fn close(transport: &mut Transport) {
    if let Err(err) = transport.sink.close().await {
        tracing::debug!(%err, "error closing rejected socket");
    }
}

async fn forward_commands(
    handle: SessionHandle,
    commands: Arc<Mutex<mpsc::UnboundedReceiver<OutboundMessage>>>,
) {
    let mut commands = commands.lock().await;
    loop {
        let message = tokio::select! {
            _ = handle.cancelled() => break,
            message = commands.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        if let Err(err) = handle.send(&message).await {
            tracing::warn!(kind = %message.kind, %err, "dropping command");
            if err.is_disconnect() {
                break;
            }
        }
    }
}
