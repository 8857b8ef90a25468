//! Worker side of the protocol.
//!
//! A [`WorkerClient`] connects to a manager, learns its [`WorkerId`], and then
//! executes whatever tasks the manager sends until it receives the shutdown
//! sentinel. Tasks run on tokio's blocking pool so a long computation does not
//! stall the connection's runtime thread.

use std::marker::PhantomData;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument};

use crate::config::WireConfig;
use crate::error::DispatchError;
use crate::task::{Task, WorkerId};
use crate::wire::{Frame, FrameCodec, FrameKind, Message};

/// What a worker did before the manager shut it down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    pub worker_id: WorkerId,
    pub tasks_executed: usize,
}

/// A connected worker for task type `T`.
pub struct WorkerClient<T: Task> {
    worker_id: WorkerId,
    conn: Framed<TcpStream, FrameCodec>,
    _task: PhantomData<fn() -> T>,
}

impl<T: Task> WorkerClient<T> {
    /// Connect with default wire limits and wait for the id assignment.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, DispatchError> {
        Self::connect_with(addr, &WireConfig::default()).await
    }

    /// Connect and wait for the id assignment.
    #[instrument(skip_all)]
    pub async fn connect_with(
        addr: impl ToSocketAddrs,
        wire: &WireConfig,
    ) -> Result<Self, DispatchError> {
        let stream = TcpStream::connect(addr).await?;
        let peer = stream.peer_addr()?;
        let mut conn = Framed::new(stream, FrameCodec::new(wire.max_frame_bytes));

        let frame = next_frame(&mut conn).await?;
        let worker_id = match Message::<T, T::Output>::from_frame(&frame)? {
            Message::Assign(id) => id,
            other => {
                return Err(DispatchError::UnexpectedFrame {
                    expected: FrameKind::Assign,
                    got: other.kind(),
                })
            }
        };
        info!(worker = %worker_id, manager = %peer, "worker starting");

        Ok(Self {
            worker_id,
            conn,
            _task: PhantomData,
        })
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Execute tasks until the manager sends the shutdown sentinel.
    pub async fn run(mut self) -> Result<WorkerSummary, DispatchError> {
        let mut tasks_executed = 0;

        loop {
            let frame = next_frame(&mut self.conn).await?;
            match Message::<T, T::Output>::from_frame(&frame)? {
                Message::Task(task) => {
                    let description = task.describe();
                    let result = tokio::task::spawn_blocking(move || task.execute())
                        .await
                        .map_err(|e| DispatchError::Execution(e.to_string()))?;
                    debug!(worker = %self.worker_id, task = %description, "task executed");

                    let reply = Message::<T, T::Output>::Result(result).to_frame()?;
                    self.conn.send(reply).await?;
                    tasks_executed += 1;
                }
                Message::Shutdown => {
                    SinkExt::<Frame>::close(&mut self.conn).await?;
                    info!(worker = %self.worker_id, tasks = tasks_executed, "worker done");
                    return Ok(WorkerSummary {
                        worker_id: self.worker_id,
                        tasks_executed,
                    });
                }
                other => {
                    return Err(DispatchError::UnexpectedFrame {
                        expected: FrameKind::Task,
                        got: other.kind(),
                    })
                }
            }
        }
    }
}

async fn next_frame(conn: &mut Framed<TcpStream, FrameCodec>) -> Result<Frame, DispatchError> {
    match conn.next().await {
        Some(frame) => frame,
        None => Err(DispatchError::ConnectionClosed),
    }
}
