//! Choropleth map output: polygons filled by a numeric table column, with
//! a colorbar legend, title, and source annotation. The renderer consumes
//! the assembled table and never mutates it.

mod color;
mod writer;

use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use geo::{BoundingRect, Coord, CoordsIter, LineString, MultiPolygon, Rect};
use polars::frame::DataFrame;
use polars::prelude::*;

use color::{sequential_color, NO_DATA_GRAY};
use writer::SvgWriter;

/// Projection function: map coords -> SVG coords (x, y)
type Projection = dyn Fn(&Coord<f64>) -> (f64, f64);

/// Display parameters for one map figure.
#[derive(Debug, Clone)]
pub struct MapStyle {
    pub width: i32,
    pub margin: i32,
    pub title: String,
    /// Source/assumptions note drawn under the map (embeds the per-capita
    /// constant used for the run).
    pub annotation: String,
}

impl MapStyle {
    pub fn new(title: impl Into<String>, annotation: impl Into<String>) -> Self {
        Self { width: 1000, margin: 12, title: title.into(), annotation: annotation.into() }
    }
}

/// Reserved vertical space under the map for legend + annotation.
const FOOTER_HEIGHT: f64 = 64.0;
const LEGEND_SWATCHES: usize = 48;
const LEGEND_WIDTH: f64 = 240.0;
const LEGEND_HEIGHT: f64 = 12.0;

/// Render a choropleth SVG of `geoms` filled by the numeric column
/// `series` of `data` (row-aligned with the geometry), normalized to the
/// column's min/max. Null rows draw gray.
pub fn render_choropleth(
    path: &Path,
    geoms: &[MultiPolygon<f64>],
    data: &DataFrame,
    series: &str,
    style: &MapStyle,
) -> Result<()> {
    let bounds = total_bounds(geoms)
        .ok_or_else(|| anyhow!("[render] no geometry to draw"))?;

    let colors = compute_fill_colors(data, series, geoms.len())?;

    let margin = style.margin as f64;
    let width = style.width as f64;
    let scale = (width - 2.0 * margin) / bounds.width();
    let map_height = bounds.height() * scale + 2.0 * margin;
    let height = map_height + FOOTER_HEIGHT;

    // Map coords -> SVG coords (preserve aspect, Y down), leaving headroom
    // for the title.
    let top = margin + 20.0;
    let project = move |coord: &Coord<f64>| -> (f64, f64) {
        let x = margin + (coord.x - bounds.min().x) * scale;
        let y = top + (bounds.max().y - coord.y) * scale;
        (x, y)
    };

    let mut writer = SvgWriter::new(path)?;
    writer.write_header(width, height + 20.0)?;
    writer.write_styles()?;

    writeln!(
        writer,
        r##"<text class="title" x="{margin}" y="{y}">{title}</text>"##,
        y = margin + 6.0,
        title = escape_text(&style.title),
    )?;

    draw_polygons_with_fill(&mut writer, geoms, &colors, &project)?;

    let (min_val, max_val) = series_range(data, series)?;
    draw_legend(&mut writer, margin, map_height + 24.0, min_val, max_val)?;

    writeln!(
        writer,
        r##"<text class="note" x="{margin}" y="{y}">{note}</text>"##,
        y = map_height + 24.0 + LEGEND_HEIGHT + 24.0,
        note = escape_text(&style.annotation),
    )?;

    writer.write_footer()?;
    writer.flush()?;

    Ok(())
}

/// Bounding box of every geometry.
fn total_bounds(geoms: &[MultiPolygon<f64>]) -> Option<Rect<f64>> {
    let mut rects = geoms.iter().filter_map(|geom| geom.bounding_rect());
    let first = rects.next()?;
    Some(rects.fold(first, |acc, rect| {
        Rect::new(
            Coord { x: acc.min().x.min(rect.min().x), y: acc.min().y.min(rect.min().y) },
            Coord { x: acc.max().x.max(rect.max().x), y: acc.max().y.max(rect.max().y) },
        )
    }))
}

/// Min/max of the series used to normalize fills and label the legend.
fn series_range(data: &DataFrame, series: &str) -> Result<(f64, f64)> {
    let column = data.column(series)
        .with_context(|| format!("[render] missing column {:?}", series))?;
    let column = if column.dtype() != &DataType::Float64 {
        column.cast(&DataType::Float64)?
    } else {
        column.clone()
    };
    let values = column.f64()
        .with_context(|| format!("[render] column {:?} is not numeric", series))?;

    let min_val = values.min()
        .ok_or_else(|| anyhow!("[render] no non-null values in series {:?}", series))?;
    let max_val = values.max()
        .ok_or_else(|| anyhow!("[render] no non-null values in series {:?}", series))?;

    Ok((min_val, max_val))
}

/// Compute a choropleth fill for each row of the series column.
/// Returns one hex color string per geometry; nulls get the no-data gray.
fn compute_fill_colors(data: &DataFrame, series: &str, expected: usize) -> Result<Vec<String>> {
    let (min_val, max_val) = series_range(data, series)?;
    let range = if max_val > min_val { max_val - min_val } else { 1.0 };

    let column = data.column(series)?.cast(&DataType::Float64)?;
    let values = column.f64()?;

    anyhow::ensure!(
        values.len() == expected,
        "[render] {} series values for {} geometries",
        values.len(),
        expected,
    );

    Ok(values.into_iter()
        .map(|v_opt| match v_opt {
            Some(v) => sequential_color(((v - min_val) / range).clamp(0.0, 1.0)).to_string(),
            None => NO_DATA_GRAY.to_string(),
        })
        .collect())
}

/// Draw polygons with specified fill colors.
fn draw_polygons_with_fill(
    writer: &mut impl Write,
    polygons: &[MultiPolygon<f64>],
    colors: &[String],
    project: &Projection,
) -> Result<()> {
    for (polygon, fill) in polygons.iter().zip(colors.iter()) {
        writeln!(
            writer,
            r##"<path class="blk" fill-rule="evenodd" d="{}" style="fill:{}"/>"##,
            multipolygon_to_path(polygon, project),
            fill,
        )?;
    }
    Ok(())
}

/// Colorbar legend: a strip of ramp swatches with min/max labels.
fn draw_legend(writer: &mut impl Write, x: f64, y: f64, min_val: f64, max_val: f64) -> Result<()> {
    let step = LEGEND_WIDTH / LEGEND_SWATCHES as f64;
    for i in 0..LEGEND_SWATCHES {
        let t = i as f64 / (LEGEND_SWATCHES - 1) as f64;
        writeln!(
            writer,
            r##"<rect x="{:.2}" y="{y:.2}" width="{:.2}" height="{LEGEND_HEIGHT}" style="fill:{}"/>"##,
            x + i as f64 * step,
            step + 0.5, // overlap a hair so no seams show
            sequential_color(t),
        )?;
    }
    writeln!(
        writer,
        r##"<text class="legend" x="{x:.2}" y="{:.2}">{:.1}</text>"##,
        y + LEGEND_HEIGHT + 12.0,
        min_val,
    )?;
    writeln!(
        writer,
        r##"<text class="legend" x="{:.2}" y="{:.2}" text-anchor="end">{:.1}</text>"##,
        x + LEGEND_WIDTH,
        y + LEGEND_HEIGHT + 12.0,
        max_val,
    )?;
    Ok(())
}

/// Build a compact SVG path string for a MultiPolygon (exteriors + holes).
fn multipolygon_to_path(shape: &MultiPolygon<f64>, project: &Projection) -> String {
    let mut out = String::new();

    for polygon in &shape.0 {
        out.push_str(&ring_to_path(polygon.exterior(), project));
        for interior in polygon.interiors() {
            out.push_str(&ring_to_path(interior, project));
        }
    }

    out
}

/// Build a compact SVG path string for a LineString (ring).
fn ring_to_path(ring: &LineString<f64>, project: &Projection) -> String {
    let mut out = String::new();

    let mut coords = ring.coords_iter().map(|coord| project(&coord));
    if let Some((x, y)) = coords.next() {
        out.push_str(&format!(" M{x:.3},{y:.3}"));
        for (x, y) in coords {
            out.push_str(&format!(" L{x:.3},{y:.3}"));
        }
        out.push('Z');
    }

    out
}

/// Minimal XML text escaping for titles and annotations.
fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
