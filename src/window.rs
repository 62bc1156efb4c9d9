//! Alignment of vector bounding boxes onto the raster grid.

use anyhow::{ensure, Result};
use geo::{Coord, Rect};

use crate::raster::GeoTransform;

/// A rectangular read window in grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub row_off: usize,
    pub col_off: usize,
    pub rows: usize,
    pub cols: usize,
}

/// Compute the read window covering `bounds`, clamped to the raster extent.
///
/// The window fully contains the intersection of the bounding box with the
/// raster; a bounding box that misses the raster entirely is an error
/// rather than a garbage window.
pub fn window_for_bounds(
    transform: &GeoTransform,
    shape: (usize, usize),
    bounds: &Rect<f64>,
) -> Result<Window> {
    let (rows, cols) = shape;

    // Fractional grid positions of the corners. With a north-up transform
    // the max-y corner lands on the smallest row.
    let (col_min, row_min) = transform.index(bounds.min().x, bounds.max().y);
    let (col_max, row_max) = transform.index(bounds.max().x, bounds.min().y);

    ensure!(
        col_max > 0.0 && row_max > 0.0 && col_min < cols as f64 && row_min < rows as f64,
        "[window] bounding box ({:.6}, {:.6}) - ({:.6}, {:.6}) does not overlap raster coverage",
        bounds.min().x, bounds.min().y, bounds.max().x, bounds.max().y,
    );

    let row_off = row_min.floor().max(0.0) as usize;
    let col_off = col_min.floor().max(0.0) as usize;
    let row_end = (row_max.ceil() as usize).min(rows);
    let col_end = (col_max.ceil() as usize).min(cols);

    ensure!(
        row_end > row_off && col_end > col_off,
        "[window] bounding box produced an empty window"
    );

    Ok(Window {
        row_off,
        col_off,
        rows: row_end - row_off,
        cols: col_end - col_off,
    })
}

/// Smallest rectangle containing both bounds. Used to size one shared
/// read window for every layer aggregated in a run, so no layer's
/// polygons hang past the windowed raster.
pub fn union_bounds(a: &Rect<f64>, b: &Rect<f64>) -> Rect<f64> {
    Rect::new(
        Coord { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
        Coord { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
    )
}
