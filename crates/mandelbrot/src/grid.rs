//! Assembly of row results into the full iteration-count grid.

use crate::error::MandelbrotError;
use crate::task::{GridParams, MandelbrotTask, RowResult};

use taskfarm_dispatch::Task;

/// Iteration counts for every sampled point, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    params: GridParams,
    counts: Vec<u32>,
    filled: Vec<bool>,
}

impl Grid {
    /// A zeroed grid with no rows filled in.
    pub fn new(params: GridParams) -> Self {
        Self {
            counts: vec![0; params.rows() * params.columns()],
            filled: vec![false; params.rows()],
            params,
        }
    }

    /// Compute every row locally, in order.
    pub fn render_serial(params: GridParams) -> Self {
        let mut grid = Self::new(params);
        for row in 0..=params.real_points {
            let result = MandelbrotTask { row, params }.execute();
            let start = grid.offset(row);
            grid.counts[start..start + result.iterations.len()].copy_from_slice(&result.iterations);
            grid.filled[row as usize] = true;
        }
        grid
    }

    pub fn params(&self) -> &GridParams {
        &self.params
    }

    /// Store one row. A duplicate row overwrites the earlier one.
    pub fn insert(&mut self, result: RowResult) -> Result<(), MandelbrotError> {
        let rows = self.params.rows();
        if result.row as usize >= rows {
            return Err(MandelbrotError::RowOutOfRange {
                row: result.row,
                rows,
            });
        }
        let expected = self.params.columns();
        if result.iterations.len() != expected {
            return Err(MandelbrotError::RowWidth {
                row: result.row,
                got: result.iterations.len(),
                expected,
            });
        }

        let start = self.offset(result.row);
        self.counts[start..start + expected].copy_from_slice(&result.iterations);
        self.filled[result.row as usize] = true;
        Ok(())
    }

    /// Rows that never received a result, in ascending order.
    pub fn missing_rows(&self) -> Vec<u32> {
        self.filled
            .iter()
            .enumerate()
            .filter(|(_, filled)| !**filled)
            .map(|(row, _)| row as u32)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.filled.iter().all(|f| *f)
    }

    /// Count at row `i`, column `j`.
    pub fn get(&self, i: u32, j: u32) -> Option<u32> {
        if i as usize >= self.params.rows() || j as usize >= self.params.columns() {
            return None;
        }
        Some(self.counts[self.offset(i) + j as usize])
    }

    /// One row of counts.
    pub fn row(&self, i: u32) -> Option<&[u32]> {
        if i as usize >= self.params.rows() {
            return None;
        }
        let start = self.offset(i);
        Some(&self.counts[start..start + self.params.columns()])
    }

    fn offset(&self, row: u32) -> usize {
        row as usize * self.params.columns()
    }
}
