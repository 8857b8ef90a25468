use serde::{Deserialize, Serialize};

use taskfarm_dispatch::Task;

use crate::error::MandelbrotError;
use crate::kernel::escape_time;

/// Sampling bounds for a grid over the complex plane.
///
/// The grid has `real_points + 1` rows and `imaginary_points + 1` columns so
/// both ends of each axis are sampled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridParams {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_real_points")]
    pub real_points: u32,
    #[serde(default = "default_imaginary_points")]
    pub imaginary_points: u32,
    #[serde(default = "default_real_min")]
    pub real_min: f64,
    #[serde(default = "default_real_max")]
    pub real_max: f64,
    #[serde(default = "default_imaginary_min")]
    pub imaginary_min: f64,
    #[serde(default = "default_imaginary_max")]
    pub imaginary_max: f64,
}

fn default_max_iterations() -> u32 {
    200
}

fn default_real_points() -> u32 {
    3000
}

fn default_imaginary_points() -> u32 {
    2000
}

fn default_real_min() -> f64 {
    -2.0
}

fn default_real_max() -> f64 {
    1.0
}

fn default_imaginary_min() -> f64 {
    -1.0
}

fn default_imaginary_max() -> f64 {
    1.0
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            real_points: default_real_points(),
            imaginary_points: default_imaginary_points(),
            real_min: default_real_min(),
            real_max: default_real_max(),
            imaginary_min: default_imaginary_min(),
            imaginary_max: default_imaginary_max(),
        }
    }
}

impl GridParams {
    pub fn rows(&self) -> usize {
        self.real_points as usize + 1
    }

    pub fn columns(&self) -> usize {
        self.imaginary_points as usize + 1
    }

    /// Real coordinate of row `i`.
    pub fn real_at(&self, i: u32) -> f64 {
        (i as f64 / self.real_points as f64) * (self.real_max - self.real_min) + self.real_min
    }

    /// Imaginary coordinate of column `j`.
    pub fn imaginary_at(&self, j: u32) -> f64 {
        (j as f64 / self.imaginary_points as f64) * (self.imaginary_max - self.imaginary_min)
            + self.imaginary_min
    }

    pub fn validate(&self) -> Result<(), MandelbrotError> {
        if self.max_iterations == 0 {
            return Err(MandelbrotError::Config("grid.max_iterations must be positive".into()));
        }
        if self.real_points == 0 || self.imaginary_points == 0 {
            return Err(MandelbrotError::Config(
                "grid.real_points and grid.imaginary_points must be positive".into(),
            ));
        }
        if !(self.real_min < self.real_max) {
            return Err(MandelbrotError::Config(format!(
                "grid.real_min ({}) must be below grid.real_max ({})",
                self.real_min, self.real_max
            )));
        }
        if !(self.imaginary_min < self.imaginary_max) {
            return Err(MandelbrotError::Config(format!(
                "grid.imaginary_min ({}) must be below grid.imaginary_max ({})",
                self.imaginary_min, self.imaginary_max
            )));
        }
        Ok(())
    }
}

/// Compute one row of the grid: every column at a fixed real coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MandelbrotTask {
    pub row: u32,
    pub params: GridParams,
}

/// Iteration counts for one row, indexed by column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowResult {
    pub row: u32,
    pub iterations: Vec<u32>,
}

impl Task for MandelbrotTask {
    type Output = RowResult;

    fn describe(&self) -> String {
        format!("task with row index = {}", self.row)
    }

    fn execute(&self) -> RowResult {
        let c_re = self.params.real_at(self.row);
        let iterations = (0..=self.params.imaginary_points)
            .map(|j| escape_time(c_re, self.params.imaginary_at(j), self.params.max_iterations))
            .collect();
        RowResult {
            row: self.row,
            iterations,
        }
    }
}

/// One task per grid row, in row order.
pub fn make_tasks(params: &GridParams) -> Vec<MandelbrotTask> {
    (0..=params.real_points)
        .map(|row| MandelbrotTask {
            row,
            params: *params,
        })
        .collect()
}
