//! Mandelbrot escape-time rendering, distributed row by row over
//! `taskfarm-dispatch`.

pub mod config;
pub mod error;
pub mod grid;
pub mod kernel;
pub mod task;
pub mod writer;

pub use config::{MandelbrotConfig, OutputConfig};
pub use error::MandelbrotError;
pub use grid::Grid;
pub use task::{make_tasks, GridParams, MandelbrotTask, RowResult};
