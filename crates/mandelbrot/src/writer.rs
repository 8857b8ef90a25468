//! Plain-text `.dat` output: one `"<re> <im> <k>"` line per point, rows outer
//! and columns inner.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::error::MandelbrotError;
use crate::grid::Grid;

/// Write the grid to `path`, replacing any existing file.
pub fn write_dat(path: impl AsRef<Path>, grid: &Grid) -> Result<(), MandelbrotError> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    write_to(&mut out, grid)?;
    out.flush()?;
    info!(path = %path.display(), "grid written");
    Ok(())
}

/// Write the grid's lines to any writer.
pub fn write_to<W: Write>(out: &mut W, grid: &Grid) -> Result<(), MandelbrotError> {
    let params = grid.params();
    for i in 0..=params.real_points {
        let re = format_coordinate(params.real_at(i));
        let Some(row) = grid.row(i) else {
            continue;
        };
        for (j, count) in row.iter().enumerate() {
            let im = format_coordinate(params.imaginary_at(j as u32));
            writeln!(out, "{re} {im} {count}")?;
        }
    }
    Ok(())
}

/// Shortest round-tripping decimal with at least one fractional digit.
/// Magnitudes below 1e-3 or from 1e7 up switch to `<mantissa>E<exp>`, e.g.
/// `1.1102230246251565E-16` and `5.0E-4`.
fn format_coordinate(x: f64) -> String {
    let magnitude = x.abs();
    if x == 0.0 || !x.is_finite() || (1e-3..1e7).contains(&magnitude) {
        return format!("{x:?}");
    }
    let sci = format!("{x:e}");
    match sci.split_once('e') {
        Some((mantissa, exp)) if mantissa.contains('.') => format!("{mantissa}E{exp}"),
        Some((mantissa, exp)) => format!("{mantissa}.0E{exp}"),
        None => sci,
    }
}
