use thiserror::Error;

use taskfarm_dispatch::DispatchError;

/// Errors raised by the Mandelbrot application layer.
#[derive(Debug, Error)]
pub enum MandelbrotError {
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("row {row} out of range for a grid of {rows} rows")]
    RowOutOfRange { row: u32, rows: usize },

    #[error("row {row} has {got} columns, expected {expected}")]
    RowWidth {
        row: u32,
        got: usize,
        expected: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
