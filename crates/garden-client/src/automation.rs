//! Pluggable automation tasks run alongside each connection.
//!
//! A fresh instance of every registered task is created for each successful
//! connection and cancelled when that connection goes down.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use garden_client::automation::{AutomationTask, TaskContext, TaskRegistry};
//! use garden_client::error::SessionResult;
//! use garden_core::OutboundMessage;
//! use std::time::Duration;
//!
//! struct Harvester;
//!
//! #[async_trait]
//! impl AutomationTask for Harvester {
//!     fn name(&self) -> &str {
//!         "harvester"
//!     }
//!
//!     async fn run(&mut self, ctx: TaskContext) -> SessionResult<()> {
//!         while ctx.sleep(Duration::from_secs(30)).await {
//!             ctx.send(&OutboundMessage::game("HarvestCrop").with("slot", 0)).await?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut registry = TaskRegistry::default();
//! registry.register(|| Harvester);
//! assert_eq!(registry.len(), 1);
//! ```

use crate::error::SessionResult;
use crate::session::SessionHandle;
use crate::store::SessionStore;
use async_trait::async_trait;
use garden_core::OutboundMessage;
use std::sync::Arc;
use std::time::Duration;

/// What a task gets to work with for one connection.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub handle: SessionHandle,
    pub store: SessionStore,
}

impl TaskContext {
    /// Whether the connection is still up.
    pub fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }

    /// Resolves once the connection is going down.
    pub async fn cancelled(&self) {
        self.handle.cancelled().await;
    }

    /// Sleep for `duration`. Returns `false` if the connection went down
    /// first.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.handle.cancelled() => false,
            _ = tokio::time::sleep(duration) => self.handle.is_connected(),
        }
    }

    /// Send a command on this connection.
    pub async fn send(&self, message: &OutboundMessage) -> SessionResult<()> {
        self.handle.send(message).await
    }
}

/// A unit of automation bound to one connection.
#[async_trait]
pub trait AutomationTask: Send {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Run until done or until the connection goes down.
    async fn run(&mut self, ctx: TaskContext) -> SessionResult<()>;
}

type TaskFactory = Arc<dyn Fn() -> Box<dyn AutomationTask> + Send + Sync>;

/// Factories for the tasks started on every connection.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    factories: Vec<TaskFactory>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.factories.len())
            .finish()
    }
}

impl TaskRegistry {
    /// Register a factory producing a fresh task per connection.
    pub fn register<F, T>(&mut self, factory: F)
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: AutomationTask + 'static,
    {
        self.factories
            .push(Arc::new(move || Box::new(factory()) as Box<dyn AutomationTask>));
    }

    /// New instances of every registered task.
    pub fn instantiate(&self) -> Vec<Box<dyn AutomationTask>> {
        self.factories.iter().map(|factory| factory()).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Run `task` to completion, logging how it ended.
pub(crate) async fn run_task(mut task: Box<dyn AutomationTask>, ctx: TaskContext) {
    let name = task.name().to_owned();
    tracing::debug!(task = %name, "automation task started");
    match task.run(ctx).await {
        Ok(()) => tracing::debug!(task = %name, "automation task finished"),
        Err(err) if err.is_disconnect() => {
            tracing::debug!(task = %name, %err, "automation task stopped by disconnect");
        }
        Err(err) => tracing::warn!(task = %name, %err, "automation task failed"),
    }
}
