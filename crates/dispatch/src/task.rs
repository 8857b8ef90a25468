//! Unit-of-work capability traits.
//!
//! A [`Task`] is an immutable, serializable description of work. The manager
//! ships it to a remote worker, which calls [`Task::execute`] and ships the
//! [`TaskResult`] back. Applications supply their own task type; the dispatch
//! layer only relies on this contract.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// An application-defined unit of work.
///
/// `execute` must be a pure function of the task's own fields. Workers may run
/// many tasks of the same type concurrently, so implementations must not keep
/// shared mutable state between invocations.
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The payload produced by executing this task.
    type Output: TaskResult;

    /// Diagnostic description of the task. Must not have side effects.
    fn describe(&self) -> String;

    /// Compute the result for this task.
    fn execute(&self) -> Self::Output;
}

/// The outcome of one [`Task`], shipped from worker to manager.
pub trait TaskResult: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> TaskResult for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Identifier assigned to a worker connection at accept time.
///
/// Ids start at zero and increase by one per accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
