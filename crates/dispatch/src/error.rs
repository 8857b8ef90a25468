use thiserror::Error;

use crate::wire::FrameKind;

/// Errors that can occur in the task-dispatch layer.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("unknown frame kind {0:#04x}")]
    UnknownFrameKind(u8),

    #[error("frame payload of {len} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { len: usize, limit: usize },

    #[error("unexpected {got} frame, expected {expected}")]
    UnexpectedFrame { expected: FrameKind, got: FrameKind },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("task execution failed: {0}")]
    Execution(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
