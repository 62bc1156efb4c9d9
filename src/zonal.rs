//! Zonal statistics: aggregate raster cell values over polygon footprints.
//!
//! Footprints are rasterized with an even-odd scanline at cell-center rows
//! and a half-open cell-center rule along x, so a cell contributes to a
//! polygon exactly when its center falls inside the footprint. NaN cells
//! and the no-data sentinel are excluded from every aggregate.

use anyhow::{ensure, Result};
use geo::{BoundingRect, MultiPolygon};
use ndarray::Array2;
use polars::frame::DataFrame;
use polars::prelude::Column;

use crate::raster::GeoTransform;

/// The summary statistic computed per polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZonalStat {
    Sum,
    Count,
    Mean,
    Min,
    Max,
}

/// Running aggregate over the valid cells covered by one polygon.
#[derive(Debug, Clone, Copy)]
struct Accumulator {
    sum: f64,
    count: u64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn new() -> Self {
        Self { sum: 0.0, count: 0, min: f64::INFINITY, max: f64::NEG_INFINITY }
    }

    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// A polygon covering zero valid cells reports null for value
    /// statistics and 0 for count.
    fn finish(&self, stat: ZonalStat) -> Option<f64> {
        match stat {
            ZonalStat::Count => Some(self.count as f64),
            _ if self.count == 0 => None,
            ZonalStat::Sum => Some(self.sum),
            ZonalStat::Mean => Some(self.sum / self.count as f64),
            ZonalStat::Min => Some(self.min),
            ZonalStat::Max => Some(self.max),
        }
    }
}

/// Compute one statistic per polygon over `values`, returning a frame with
/// one row per polygon in input order: `key_col` (polygon name) and
/// `out_col` (the statistic, null where the polygon covers no valid cell).
pub fn zonal_stats(
    names: &[String],
    geoms: &[MultiPolygon<f64>],
    values: &Array2<f64>,
    transform: &GeoTransform,
    nodata: Option<f64>,
    stat: ZonalStat,
    key_col: &str,
    out_col: &str,
) -> Result<DataFrame> {
    ensure!(
        names.len() == geoms.len(),
        "[zonal] {} names for {} geometries",
        names.len(),
        geoms.len(),
    );

    let stats = geoms.iter()
        .map(|geom| {
            let mut acc = Accumulator::new();
            for_covered_cells(geom, values, transform, |value| {
                let is_nodata = nodata.map_or(false, |nd| value == nd);
                if value.is_finite() && !is_nodata {
                    acc.push(value);
                }
            });
            acc.finish(stat)
        })
        .collect::<Vec<_>>();

    Ok(DataFrame::new(vec![
        Column::new(key_col.into(), names),
        Column::new(out_col.into(), stats),
    ])?)
}

/// Visit the value of every cell whose center lies inside `geom`.
fn for_covered_cells(
    geom: &MultiPolygon<f64>,
    values: &Array2<f64>,
    transform: &GeoTransform,
    mut visit: impl FnMut(f64),
) {
    let (rows, cols) = values.dim();
    let mut crossings: Vec<f64> = Vec::new();

    // Disjoint parts toggle independently, but their hole rings must stay
    // grouped with their own exterior, so scan per part.
    for polygon in &geom.0 {
        let Some(bounds) = polygon.bounding_rect() else { continue };

        // Rows whose centers can fall inside the part's y-range.
        let (_, row_top) = transform.index(bounds.min().x, bounds.max().y);
        let (_, row_bot) = transform.index(bounds.min().x, bounds.min().y);
        let row_start = row_top.floor().max(0.0) as usize;
        let row_end = (row_bot.ceil().max(0.0) as usize).min(rows);

        for row in row_start..row_end {
            let center_y = transform.origin_y + (row as f64 + 0.5) * transform.pixel_height;

            crossings.clear();
            ring_crossings(polygon.exterior(), center_y, &mut crossings);
            for interior in polygon.interiors() {
                ring_crossings(interior, center_y, &mut crossings);
            }
            crossings.sort_by(|a, b| a.total_cmp(b));

            // Even-odd rule: each sorted pair spans an interior run.
            for span in crossings.chunks_exact(2) {
                let (x0, x1) = (span[0], span[1]);

                // Columns whose centers satisfy x0 <= cx < x1.
                let col_start =
                    ((x0 - transform.origin_x) / transform.pixel_width - 0.5).ceil().max(0.0);
                let col_end =
                    ((x1 - transform.origin_x) / transform.pixel_width - 0.5).ceil().max(0.0);

                let col_start = col_start as usize;
                let col_end = (col_end as usize).min(cols);
                for col in col_start..col_end {
                    visit(values[[row, col]]);
                }
            }
        }
    }
}

/// Even-odd x-crossings of a ring with the horizontal line at `y`.
/// Horizontal edges never satisfy the half-open test and are skipped.
fn ring_crossings(ring: &geo::LineString<f64>, y: f64, out: &mut Vec<f64>) {
    for edge in ring.0.windows(2) {
        let (p, q) = (edge[0], edge[1]);
        if (p.y > y) != (q.y > y) {
            out.push(p.x + (y - p.y) * (q.x - p.x) / (q.y - p.y));
        }
    }
}
