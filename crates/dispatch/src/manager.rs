//! Manager: owns the task queue and the listener, and runs the shutdown
//! sequence.
//!
//! A run moves through [`ManagerPhase`]s in order:
//!
//! 1. **Listening**: a listener task accepts connections and spawns one
//!    [`WorkerSession`] per connection.
//! 2. **DrainWait**: the control task waits until the queue is observed empty.
//! 3. **Closing**: the draining token is cancelled, the accept loop exits and
//!    drops the listening socket.
//! 4. **Joining**: the listener task is joined, then every session in spawn
//!    order.
//! 5. **Done**: the [`RunReport`] is returned.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::queue::TaskQueue;
use crate::session::{ResultHook, SessionOutcome, SessionReport, WorkerSession};
use crate::task::{Task, WorkerId};
use crate::wire::FrameCodec;

// ── Phase ────────────────────────────────────────────────────────────

/// Lifecycle phase of a [`Manager`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ManagerPhase {
    Listening,
    DrainWait,
    Closing,
    Joining,
    Done,
}

// ── Report ───────────────────────────────────────────────────────────

/// Outcome of a whole run: one [`SessionReport`] per accepted connection, in
/// accept order.
#[derive(Debug, Clone)]
pub struct RunReport<R> {
    pub sessions: Vec<SessionReport<R>>,
}

impl<R> RunReport<R> {
    /// Number of connections the manager accepted.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Total results collected across all sessions.
    pub fn result_count(&self) -> usize {
        self.sessions.iter().map(|s| s.results.len()).sum()
    }

    /// Sessions that ended on a connection or protocol fault.
    pub fn aborted(&self) -> impl Iterator<Item = &SessionReport<R>> {
        self.sessions.iter().filter(|s| !s.outcome.is_completed())
    }

    pub fn results(&self) -> impl Iterator<Item = &R> {
        self.sessions.iter().flat_map(|s| s.results.iter())
    }

    pub fn into_results(self) -> impl Iterator<Item = R> {
        self.sessions.into_iter().flat_map(|s| s.results)
    }
}

// ── Builder ──────────────────────────────────────────────────────────

/// Fluent builder for a [`Manager`].
///
/// # Example
/// ```ignore
/// let manager = ManagerBuilder::new(config)
///     .on_result(|worker, row: &RowResult| debug!(%worker, row = row.row, "row done"))
///     .bind(tasks)
///     .await?;
/// let report = manager.run().await;
/// ```
pub struct ManagerBuilder<T: Task> {
    config: DispatchConfig,
    on_result: Option<ResultHook<T::Output>>,
}

impl<T: Task> ManagerBuilder<T> {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            on_result: None,
        }
    }

    /// Register a callback invoked once per received result, from the
    /// session that received it.
    pub fn on_result<F>(mut self, hook: F) -> Self
    where
        F: Fn(WorkerId, &T::Output) + Send + Sync + 'static,
    {
        self.on_result = Some(Arc::new(hook));
        self
    }

    /// Populate the queue and bind the listener.
    ///
    /// Failing to bind is fatal for the run and is the only error a manager
    /// surfaces.
    pub async fn bind(self, tasks: impl IntoIterator<Item = T>) -> Result<Manager<T>, DispatchError> {
        self.config.validate()?;

        let queue = Arc::new(TaskQueue::new(tasks));
        let addr = self.config.manager.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| DispatchError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, tasks = queue.len(), "manager listening");

        let (phase, _) = watch::channel(ManagerPhase::Listening);
        Ok(Manager {
            listener,
            local_addr,
            queue,
            config: self.config,
            on_result: self.on_result,
            phase,
            draining: CancellationToken::new(),
        })
    }
}

// ── Manager ──────────────────────────────────────────────────────────

struct SessionHandle<R> {
    worker_id: WorkerId,
    peer: SocketAddr,
    started_at: DateTime<Utc>,
    join: JoinHandle<SessionReport<R>>,
}

type SessionList<R> = Arc<Mutex<Vec<SessionHandle<R>>>>;

/// Orchestrates one run over a pre-populated queue.
pub struct Manager<T: Task> {
    listener: TcpListener,
    local_addr: SocketAddr,
    queue: Arc<TaskQueue<T>>,
    config: DispatchConfig,
    on_result: Option<ResultHook<T::Output>>,
    phase: watch::Sender<ManagerPhase>,
    draining: CancellationToken,
}

impl<T: Task> Manager<T> {
    /// Address the listener is bound to (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn queue(&self) -> &Arc<TaskQueue<T>> {
        &self.queue
    }

    /// Subscribe to phase transitions.
    pub fn phase(&self) -> watch::Receiver<ManagerPhase> {
        self.phase.subscribe()
    }

    /// Serve the queue until it is exhausted, then shut down and report.
    pub async fn run(self) -> RunReport<T::Output> {
        let Manager {
            listener,
            local_addr,
            queue,
            config,
            on_result,
            phase,
            draining,
        } = self;

        let sessions: SessionList<T::Output> = Arc::new(Mutex::new(Vec::new()));
        let limiter = config
            .manager
            .max_sessions
            .map(|limit| Arc::new(Semaphore::new(limit)));

        let acceptor = AcceptLoop {
            listener,
            queue: Arc::clone(&queue),
            sessions: Arc::clone(&sessions),
            codec: FrameCodec::new(config.wire.max_frame_bytes),
            on_result,
            limiter,
            draining: draining.clone(),
        };
        let listener_handle = tokio::spawn(acceptor.run());

        phase.send_replace(ManagerPhase::DrainWait);
        info!(addr = %local_addr, "waiting for task queue to drain");
        queue.wait_until_empty().await;

        phase.send_replace(ManagerPhase::Closing);
        draining.cancel();

        phase.send_replace(ManagerPhase::Joining);
        if let Err(e) = listener_handle.await {
            warn!(error = %e, "listener task failed");
        }
        info!("listener closed, waiting for sessions to finish");

        let handles = std::mem::take(&mut *lock(&sessions));
        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            reports.push(join_session(handle).await);
        }

        let report = RunReport { sessions: reports };
        phase.send_replace(ManagerPhase::Done);
        info!(
            sessions = report.session_count(),
            results = report.result_count(),
            aborted = report.aborted().count(),
            "run complete"
        );
        report
    }
}

async fn join_session<R>(handle: SessionHandle<R>) -> SessionReport<R> {
    match handle.join.await {
        Ok(report) => report,
        Err(e) => {
            warn!(worker = %handle.worker_id, error = %e, "session task failed");
            SessionReport {
                worker_id: handle.worker_id,
                peer: handle.peer,
                results: Vec::new(),
                outcome: SessionOutcome::Aborted {
                    reason: format!("session task failed: {e}"),
                    lost_task: None,
                },
                started_at: handle.started_at,
                finished_at: Utc::now(),
            }
        }
    }
}

// Session handles are only pushed and drained; a poisoned lock still holds
// a consistent list.
fn lock<R>(sessions: &SessionList<R>) -> MutexGuard<'_, Vec<SessionHandle<R>>> {
    sessions.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Accept loop ──────────────────────────────────────────────────────

/// Pause after a failed accept (e.g. EMFILE) before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

struct AcceptLoop<T: Task> {
    listener: TcpListener,
    queue: Arc<TaskQueue<T>>,
    sessions: SessionList<T::Output>,
    codec: FrameCodec,
    on_result: Option<ResultHook<T::Output>>,
    limiter: Option<Arc<Semaphore>>,
    draining: CancellationToken,
}

impl<T: Task> AcceptLoop<T> {
    /// Accept until the draining token fires. The listening socket is closed
    /// when `self` is dropped on return.
    async fn run(self) {
        loop {
            let permit = match self.acquire_slot().await {
                Some(permit) => permit,
                None => break,
            };

            let accepted = tokio::select! {
                biased;
                _ = self.draining.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => self.spawn_session(stream, peer, permit),
                Err(e) if self.draining.is_cancelled() => {
                    debug!(error = %e, "accept interrupted by shutdown");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
        info!("queue is empty, listener stopped accepting");
    }

    /// Wait for a free session slot. `Some(None)` when unbounded; `None` once
    /// draining has begun.
    async fn acquire_slot(&self) -> Option<Option<OwnedSemaphorePermit>> {
        let Some(limiter) = &self.limiter else {
            return Some(None);
        };
        tokio::select! {
            biased;
            _ = self.draining.cancelled() => None,
            permit = Arc::clone(limiter).acquire_owned() => permit.ok().map(Some),
        }
    }

    /// Reserve the next id and register the session under one lock.
    fn spawn_session(
        &self,
        stream: tokio::net::TcpStream,
        peer: SocketAddr,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        let started_at = Utc::now();
        let mut sessions = lock(&self.sessions);
        let worker_id = WorkerId(sessions.len() as u64);
        info!(worker = %worker_id, peer = %peer, "worker connected");

        let session = WorkerSession::new(
            worker_id,
            peer,
            stream,
            self.codec.clone(),
            Arc::clone(&self.queue),
            self.on_result.clone(),
        );
        let join = tokio::spawn(async move {
            let report = session.run().await;
            drop(permit);
            report
        });
        sessions.push(SessionHandle {
            worker_id,
            peer,
            started_at,
            join,
        });
    }
}
