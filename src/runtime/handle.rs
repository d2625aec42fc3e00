use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::{
    engine::{Engine, EngineError},
    events::{ChangeBus, Changed, DEFAULT_EVENT_CAPACITY, Subscription},
    model::Assignment,
    op::{Changes, LogQuery, OperationKind, OperationLogEntry},
    persist::Store,
    types::LogId,
};

/// Failure seen by a [`BoardHandle`] caller.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The engine rejected or failed the command.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// The writer has stopped.
    #[error("board writer is no longer running")]
    ChannelClosed,
    /// A [`BoardHandle::with_engine`] closure panicked. The writer keeps running.
    #[error("engine job panicked")]
    JobPanicked,
}

/// Tuning for [`spawn_board`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Commands buffered before callers wait.
    pub command_queue_bound: usize,
    /// Broadcast buffer of a bus built from this config.
    pub event_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_queue_bound: 256,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

type EngineJob<S> = Box<dyn FnOnce(&mut Engine<S>) + Send>;

enum Command<S: Store> {
    Apply {
        kind: OperationKind,
        changes: Changes,
        description: String,
        resp: oneshot::Sender<Result<LogId, EngineError>>,
    },
    Undo {
        id: LogId,
        resp: oneshot::Sender<Result<bool, EngineError>>,
    },
    Redo {
        id: LogId,
        resp: oneshot::Sender<Result<bool, EngineError>>,
    },
    ToggleLinear {
        id: LogId,
        resp: oneshot::Sender<Result<bool, EngineError>>,
    },
    List {
        query: LogQuery,
        resp: oneshot::Sender<Result<Vec<OperationLogEntry>, EngineError>>,
    },
    Recompute {
        assignment: Box<Assignment>,
        resp: oneshot::Sender<Result<usize, EngineError>>,
    },
    CompactLog {
        resp: oneshot::Sender<Result<usize, EngineError>>,
    },
    WithEngine(EngineJob<S>),
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Cloneable async front of a board engine owned by one writer.
pub struct BoardHandle<S: Store> {
    cmd_tx: mpsc::Sender<Command<S>>,
    bus: ChangeBus,
}

impl<S: Store> Clone for BoardHandle<S> {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            bus: self.bus.clone(),
        }
    }
}

/// Moves `engine` onto a blocking writer and returns a handle to it.
///
/// Must be called from within a tokio runtime.
pub fn spawn_board<S: Store + 'static>(engine: Engine<S>, config: RuntimeConfig) -> BoardHandle<S> {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command<S>>(config.command_queue_bound.max(1));
    let bus = engine.bus().clone();

    tokio::task::spawn_blocking(move || {
        let mut engine = engine;
        tracing::info!("board writer started");
        while let Some(cmd) = cmd_rx.blocking_recv() {
            if handle_command(cmd, &mut engine) {
                break;
            }
        }
        tracing::info!("board writer stopped");
    });

    BoardHandle { cmd_tx, bus }
}

/// Returns true when the writer should stop.
fn handle_command<S: Store + 'static>(cmd: Command<S>, engine: &mut Engine<S>) -> bool {
    // A dropped receiver means the caller gave up waiting.
    match cmd {
        Command::Apply {
            kind,
            changes,
            description,
            resp,
        } => {
            let _ = resp.send(engine.apply(kind, changes, description));
        }
        Command::Undo { id, resp } => {
            let _ = resp.send(engine.undo(&id));
        }
        Command::Redo { id, resp } => {
            let _ = resp.send(engine.redo(&id));
        }
        Command::ToggleLinear { id, resp } => {
            let _ = resp.send(engine.toggle_linear(&id));
        }
        Command::List { query, resp } => {
            let _ = resp.send(engine.list(&query));
        }
        Command::Recompute { assignment, resp } => {
            let _ = resp.send(engine.recompute_day_allocation(&assignment));
        }
        Command::CompactLog { resp } => {
            let _ = resp.send(engine.compact_log());
        }
        Command::WithEngine(job) => job(engine),
        Command::Shutdown { resp } => {
            let _ = resp.send(());
            return true;
        }
    }
    false
}

impl<S: Store + 'static> BoardHandle<S> {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, EngineError>>) -> Command<S>,
    ) -> Result<T, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        Ok(rx.await.map_err(|_| RuntimeError::ChannelClosed)??)
    }

    /// Receiver of every change committed after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Changed> {
        self.bus.subscribe()
    }

    /// Registers a synchronous listener; it runs on the writer thread.
    pub fn on_changed<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Changed) + Send + Sync + 'static,
    {
        self.bus.on_changed(callback)
    }

    /// See [`Engine::apply`].
    pub async fn apply(
        &self,
        kind: OperationKind,
        changes: Changes,
        description: impl Into<String>,
    ) -> Result<LogId, RuntimeError> {
        let description = description.into();
        self.request(|resp| Command::Apply {
            kind,
            changes,
            description,
            resp,
        })
        .await
    }

    /// See [`Engine::undo`].
    pub async fn undo(&self, id: impl Into<LogId>) -> Result<bool, RuntimeError> {
        let id = id.into();
        self.request(|resp| Command::Undo { id, resp }).await
    }

    /// See [`Engine::redo`].
    pub async fn redo(&self, id: impl Into<LogId>) -> Result<bool, RuntimeError> {
        let id = id.into();
        self.request(|resp| Command::Redo { id, resp }).await
    }

    /// See [`Engine::toggle_linear`].
    pub async fn toggle_linear(&self, id: impl Into<LogId>) -> Result<bool, RuntimeError> {
        let id = id.into();
        self.request(|resp| Command::ToggleLinear { id, resp }).await
    }

    /// See [`Engine::list`].
    pub async fn list(&self, query: LogQuery) -> Result<Vec<OperationLogEntry>, RuntimeError> {
        self.request(|resp| Command::List { query, resp }).await
    }

    /// See [`Engine::recompute_day_allocation`].
    pub async fn recompute_day_allocation(&self, assignment: Assignment) -> Result<usize, RuntimeError> {
        self.request(|resp| Command::Recompute {
            assignment: Box::new(assignment),
            resp,
        })
        .await
    }

    /// See [`Engine::compact_log`].
    pub async fn compact_log(&self) -> Result<usize, RuntimeError> {
        self.request(|resp| Command::CompactLog { resp }).await
    }

    /// Runs `f` on the engine inside the writer and returns its result.
    ///
    /// A panic in `f` is caught on the writer and reported as
    /// [`RuntimeError::JobPanicked`].
    pub async fn with_engine<F, T>(&self, f: F) -> Result<T, RuntimeError>
    where
        F: FnOnce(&mut Engine<S>) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: EngineJob<S> = Box::new(move |engine| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(engine)));
            if outcome.is_err() {
                tracing::warn!("engine job panicked");
            }
            let _ = tx.send(outcome.map_err(|_| RuntimeError::JobPanicked));
        });
        self.cmd_tx
            .send(Command::WithEngine(job))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Stops the writer once queued commands ahead of this one are done.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}
