//! Actor-based concurrency for the ledger
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One logical writer task totally orders every state-changing command
//! - Each command is prepared, persisted, then applied before the next one starts
//! - Async message passing with backpressure
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │           Ledger / Session (many callers)             │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends commands to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │   prepare (read lock) → Storage::append_event         │
//! │              → apply (write lock)                     │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Readers take the `RwLock` directly and always see the latest applied event.

use crate::{
    metrics::Metrics,
    state::{Command, LedgerState},
    types::{now_nanos, Address, LedgerEvent},
    Error, Result, Storage,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Execute a state-changing command
    Execute {
        /// Submitting account
        caller: Address,
        /// Command
        command: Command,
        /// Committed event or rejection
        response: oneshot::Sender<Result<LedgerEvent>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that serializes all ledger mutations
#[derive(Debug)]
pub struct LedgerActor {
    /// Shared state (actor is the only writer)
    state: Arc<RwLock<LedgerState>>,

    /// Storage backend
    storage: Arc<Storage>,

    /// Metrics
    metrics: Metrics,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        state: Arc<RwLock<LedgerState>>,
        storage: Arc<Storage>,
        metrics: Metrics,
        mailbox: mpsc::Receiver<LedgerMessage>,
    ) -> Self {
        Self {
            state,
            storage,
            metrics,
            mailbox,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Execute {
                    caller,
                    command,
                    response,
                } => {
                    let result = self.execute(&caller, command);
                    let _ = response.send(result);
                }
                LedgerMessage::Shutdown => break,
            }
        }

        tracing::info!("Ledger actor stopped");
    }

    /// Prepare, persist and apply a single command
    fn execute(&mut self, caller: &Address, command: Command) -> Result<LedgerEvent> {
        let started = Instant::now();
        let operation = command.name();
        let now = now_nanos();

        let result = self.commit(caller, &command, now);
        self.metrics
            .record_command_duration(started.elapsed().as_secs_f64());

        match &result {
            Ok(event) => {
                self.metrics.record_commit(event.kind.name());
                tracing::info!(
                    operation,
                    caller = %caller,
                    sequence = event.sequence,
                    event = event.kind.name(),
                    "Command committed"
                );
            }
            Err(e) if e.is_rejection() => {
                self.metrics.record_rejection(e.kind());
                tracing::warn!(operation, caller = %caller, error = %e, "Command rejected");
            }
            Err(e) => {
                self.metrics.record_rejection(e.kind());
                tracing::error!(operation, caller = %caller, error = %e, "Command failed");
            }
        }

        result
    }

    fn commit(&mut self, caller: &Address, command: &Command, now: i64) -> Result<LedgerEvent> {
        let event = self.state.read().prepare(caller, command, now)?;

        // Durable first: a failed write leaves the in-memory state untouched.
        self.storage.append_event(&event)?;

        if let Err(e) = self.state.write().apply(&event) {
            tracing::error!(
                sequence = event.sequence,
                error = %e,
                "Persisted event could not be applied; restart replays the log"
            );
            return Err(Error::InvariantViolation(format!(
                "event {} persisted but not applied: {}",
                event.sequence, e
            )));
        }

        Ok(event)
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    /// Submit a command and wait for it to commit or be rejected
    pub async fn execute(&self, caller: Address, command: Command) -> Result<LedgerEvent> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Execute {
                caller,
                command,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    state: Arc<RwLock<LedgerState>>,
    storage: Arc<Storage>,
    metrics: Metrics,
    mailbox_capacity: usize,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity);
    let actor = LedgerActor::new(state, storage, metrics, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}
