//! Per-connection handler on the manager side.
//!
//! A [`WorkerSession`] owns one worker connection and serves tasks from the
//! shared queue until it runs dry:
//!
//! 1. send `Assign(id)`
//! 2. repeat: `take()` a task, send it, wait for its `Result`
//! 3. send `Shutdown`, close the write half, drain until EOF
//!
//! Any failure ends only this session. A task that was already dequeued when
//! the failure happened is not put back; its result is absent from the run.

use std::any::Any;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::error::DispatchError;
use crate::queue::TaskQueue;
use crate::task::{Task, WorkerId};
use crate::wire::{Frame, FrameCodec, FrameKind, Message};

/// Callback invoked once for every result a session receives.
pub type ResultHook<R> = Arc<dyn Fn(WorkerId, &R) + Send + Sync>;

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The queue ran dry and the sentinel was delivered.
    Completed,
    /// The connection failed. `lost_task` describes the task that was in
    /// flight, if any.
    Aborted {
        reason: String,
        lost_task: Option<String>,
    },
}

impl SessionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Everything a finished session hands back to the manager.
#[derive(Debug, Clone)]
pub struct SessionReport<R> {
    pub worker_id: WorkerId,
    pub peer: SocketAddr,
    /// Results in the order this session received them.
    pub results: Vec<R>,
    pub outcome: SessionOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Serves tasks from the shared queue to one remote worker.
pub struct WorkerSession<T: Task> {
    worker_id: WorkerId,
    peer: SocketAddr,
    conn: Framed<TcpStream, FrameCodec>,
    queue: Arc<TaskQueue<T>>,
    on_result: Option<ResultHook<T::Output>>,
    results: Vec<T::Output>,
    in_flight: Option<String>,
}

impl<T: Task> WorkerSession<T> {
    pub fn new(
        worker_id: WorkerId,
        peer: SocketAddr,
        stream: TcpStream,
        codec: FrameCodec,
        queue: Arc<TaskQueue<T>>,
        on_result: Option<ResultHook<T::Output>>,
    ) -> Self {
        Self {
            worker_id,
            peer,
            conn: Framed::new(stream, codec),
            queue,
            on_result,
            results: Vec::new(),
            in_flight: None,
        }
    }

    /// Drive the session to completion. Never fails: connection errors are
    /// folded into [`SessionOutcome::Aborted`].
    pub async fn run(mut self) -> SessionReport<T::Output> {
        let started_at = Utc::now();
        let outcome = match self.serve().await {
            Ok(()) => {
                info!(
                    worker = %self.worker_id,
                    results = self.results.len(),
                    "session finished"
                );
                SessionOutcome::Completed
            }
            Err(e) => {
                let lost_task = self.in_flight.take();
                warn!(
                    worker = %self.worker_id,
                    peer = %self.peer,
                    error = %e,
                    lost_task = lost_task.as_deref().unwrap_or("none"),
                    "session aborted"
                );
                SessionOutcome::Aborted {
                    reason: e.to_string(),
                    lost_task,
                }
            }
        };

        SessionReport {
            worker_id: self.worker_id,
            peer: self.peer,
            results: self.results,
            outcome,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn serve(&mut self) -> Result<(), DispatchError> {
        self.send(Message::Assign(self.worker_id)).await?;

        while let Some(task) = self.queue.take() {
            let description = task.describe();
            self.in_flight = Some(description.clone());
            self.send(Message::Task(task)).await?;

            let result = self.recv_result().await?;
            debug!(worker = %self.worker_id, task = %description, "result received");

            if let Some(hook) = &self.on_result {
                let worker_id = self.worker_id;
                panic::catch_unwind(AssertUnwindSafe(|| hook(worker_id, &result)))
                    .map_err(|payload| {
                        DispatchError::Execution(format!(
                            "result hook panicked: {}",
                            panic_message(payload.as_ref())
                        ))
                    })?;
            }
            self.in_flight = None;
            self.results.push(result);
        }

        self.shutdown().await
    }

    async fn send(&mut self, msg: Message<T, T::Output>) -> Result<(), DispatchError> {
        self.conn.send(msg.to_frame()?).await
    }

    async fn recv_result(&mut self) -> Result<T::Output, DispatchError> {
        let frame = match self.conn.next().await {
            Some(frame) => frame?,
            None => return Err(DispatchError::ConnectionClosed),
        };
        match Message::<T, T::Output>::from_frame(&frame)? {
            Message::Result(result) => Ok(result),
            other => Err(DispatchError::UnexpectedFrame {
                expected: FrameKind::Result,
                got: other.kind(),
            }),
        }
    }

    /// Send the sentinel, close our half, then read until the worker hangs up.
    async fn shutdown(&mut self) -> Result<(), DispatchError> {
        self.send(Message::Shutdown).await?;
        SinkExt::<Frame>::close(&mut self.conn).await?;

        // The sentinel is out; from here on nothing the worker does can lose
        // a result, so read errors just end the drain.
        while let Some(frame) = self.conn.next().await {
            match frame {
                Ok(frame) => warn!(
                    worker = %self.worker_id,
                    kind = %frame.kind,
                    "worker sent a frame after shutdown, discarding"
                ),
                Err(e) => {
                    debug!(worker = %self.worker_id, error = %e, "drain ended with error");
                    break;
                }
            }
        }
        debug!(worker = %self.worker_id, "connection drained");
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}
