//! Master/worker task dispatch over TCP.
//!
//! A [`Manager`] serves a pre-populated [`TaskQueue`] to any number of remote
//! [`WorkerClient`]s, one [`WorkerSession`] per connection, and shuts down once
//! the queue has been observed empty.

pub mod config;
pub mod error;
pub mod manager;
pub mod queue;
pub mod session;
pub mod task;
pub mod wire;
pub mod worker;

pub use config::{DispatchConfig, ManagerConfig, WireConfig};
pub use error::DispatchError;
pub use manager::{Manager, ManagerBuilder, ManagerPhase, RunReport};
pub use queue::TaskQueue;
pub use session::{ResultHook, SessionOutcome, SessionReport, WorkerSession};
pub use task::{Task, TaskResult, WorkerId};
pub use wire::{Frame, FrameCodec, FrameKind, Message};
pub use worker::{WorkerClient, WorkerSummary};
