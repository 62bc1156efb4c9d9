//! Polygon vector layers: shapefile geometry plus a dBASE attribute table.

use std::path::Path;

use anyhow::{bail, Context, Result};
use geo::{BoundingRect, MultiPolygon, Rect};
use polars::frame::DataFrame;
use polars::prelude::*;
use shapefile::dbase::{FieldValue, Record};
use shapefile::{Reader, Shape};

use crate::proj;

/// A polygon layer: geometries parallel to an attribute table.
///
/// Row order is stable between `geoms` and `data`, but downstream joins
/// are performed by name key, never by position.
#[derive(Debug, Clone)]
pub struct PolygonLayer {
    pub geoms: Vec<MultiPolygon<f64>>,
    pub data: DataFrame,
    pub epsg: u32,
}

impl PolygonLayer {
    /// Load a polygon shapefile, extracting the named text and numeric
    /// dBASE fields into the attribute table. `epsg` declares the CRS the
    /// shapefile's coordinates are in.
    pub fn from_shapefile(
        path: &Path,
        epsg: u32,
        text_fields: &[&str],
        numeric_fields: &[&str],
    ) -> Result<Self> {
        let mut reader = Reader::from_path(path)
            .with_context(|| format!("[vector] failed to open shapefile: {}", path.display()))?;

        let mut geoms = Vec::with_capacity(reader.shape_count()?);
        let mut records = Vec::with_capacity(geoms.capacity());
        for result in reader.iter_shapes_and_records() {
            let (shape, record) = result
                .with_context(|| format!("[vector] error reading {}", path.display()))?;
            geoms.push(shape_to_multipolygon(shape)
                .with_context(|| format!("[vector] in {}", path.display()))?);
            records.push(record);
        }

        let mut columns = Vec::with_capacity(text_fields.len() + numeric_fields.len());
        for &field in text_fields {
            columns.push(Column::new(
                field.into(),
                records.iter()
                    .map(|record| get_character_field(record, field))
                    .collect::<Result<Vec<_>>>()
                    .with_context(|| format!("[vector] in {}", path.display()))?,
            ));
        }
        for &field in numeric_fields {
            columns.push(Column::new(
                field.into(),
                records.iter()
                    .map(|record| get_numeric_field(record, field))
                    .collect::<Result<Vec<_>>>()
                    .with_context(|| format!("[vector] in {}", path.display()))?,
            ));
        }

        let data = DataFrame::new(columns)?
            .with_row_index("idx".into(), None)?;

        Ok(Self { geoms, data, epsg })
    }

    pub fn len(&self) -> usize {
        self.geoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geoms.is_empty()
    }

    /// Keep only the rows whose text `field` equals `value`, preserving
    /// relative order of geometry and table together.
    pub fn filter_eq(&self, field: &str, value: &str) -> Result<Self> {
        let mask = self.data.column(field)
            .with_context(|| format!("[vector] missing filter column {:?}", field))?
            .str()
            .with_context(|| format!("[vector] filter column {:?} is not text", field))?
            .equal(value);

        let geoms = self.geoms.iter()
            .zip(mask.into_iter())
            .filter_map(|(geom, keep)| (keep == Some(true)).then(|| geom.clone()))
            .collect::<Vec<_>>();

        let data = self.data.filter(&mask)?
            .drop("idx")?
            .with_row_index("idx".into(), None)?;

        Ok(Self { geoms, data, epsg: self.epsg })
    }

    /// Reproject the layer's geometry into another CRS.
    pub fn to_crs(&self, epsg: u32) -> Result<Self> {
        Ok(Self {
            geoms: proj::reproject(&self.geoms, self.epsg, epsg)?,
            data: self.data.clone(),
            epsg,
        })
    }

    /// Bounding box of every geometry in the layer.
    pub fn total_bounds(&self) -> Result<Rect<f64>> {
        let mut rects = self.geoms.iter().filter_map(|geom| geom.bounding_rect());
        let first = rects.next()
            .context("[vector] layer has no geometry to take bounds of")?;

        Ok(rects.fold(first, |acc, rect| {
            Rect::new(
                geo::Coord {
                    x: acc.min().x.min(rect.min().x),
                    y: acc.min().y.min(rect.min().y),
                },
                geo::Coord {
                    x: acc.max().x.max(rect.max().x),
                    y: acc.max().y.max(rect.max().y),
                },
            )
        }))
    }

    /// The values of a text column, in row order.
    pub fn names(&self, field: &str) -> Result<Vec<String>> {
        Ok(self.data.column(field)
            .with_context(|| format!("[vector] missing name column {:?}", field))?
            .str()
            .with_context(|| format!("[vector] name column {:?} is not text", field))?
            .into_iter()
            .map(|name| name.unwrap_or("").to_string())
            .collect())
    }

    /// Build a layer directly from parts (synthetic layers in tests).
    pub fn from_parts(geoms: Vec<MultiPolygon<f64>>, data: DataFrame, epsg: u32) -> Result<Self> {
        anyhow::ensure!(
            geoms.len() == data.height(),
            "[vector] {} geometries for a table of {} rows",
            geoms.len(),
            data.height(),
        );
        let data = if data.column("idx").is_ok() {
            data
        } else {
            data.with_row_index("idx".into(), None)?
        };
        Ok(Self { geoms, data, epsg })
    }
}

fn get_character_field(record: &Record, field: &str) -> Result<String> {
    match record.get(field) {
        Some(FieldValue::Character(Some(s))) => Ok(s.trim().to_string()),
        _ => bail!("missing or invalid character field: {}", field),
    }
}

fn get_numeric_field(record: &Record, field: &str) -> Result<f64> {
    match record.get(field) {
        Some(FieldValue::Numeric(Some(n))) => Ok(*n),
        Some(FieldValue::Float(Some(n))) => Ok(f64::from(*n)),
        _ => bail!("missing or invalid numeric field: {}", field),
    }
}

/// Convert a shapefile shape into geo::MultiPolygon. Shapefile rings are
/// CW for exteriors and CCW for holes, with each exterior followed by its
/// holes; group them accordingly.
fn shape_to_multipolygon(shape: Shape) -> Result<MultiPolygon<f64>> {
    let polygon = match shape {
        Shape::Polygon(p) => p,
        other => bail!("expected polygon geometry, found {}", other.shapetype()),
    };

    fn ensure_closed(coords: &mut Vec<geo::Coord<f64>>) {
        if !coords.is_empty() && coords[0] != coords[coords.len() - 1] {
            coords.push(coords[0])
        }
    }

    /// Signed area of a coordinate ring (negative for CW/exterior).
    fn signed_area(pts: &[geo::Coord<f64>]) -> f64 {
        let mut a = 0.0;
        for w in pts.windows(2) {
            a += w[0].x * w[1].y - w[1].x * w[0].y;
        }
        a / 2.0
    }

    let mut polys: Vec<geo::Polygon<f64>> = Vec::new();
    let mut current_exterior: Option<geo::LineString<f64>> = None;
    let mut current_holes: Vec<geo::LineString<f64>> = Vec::new();

    for ring in polygon.rings() {
        let mut coords: Vec<geo::Coord<f64>> = ring.points().iter()
            .map(|pt| geo::Coord { x: pt.x, y: pt.y })
            .collect();
        ensure_closed(&mut coords);
        let is_exterior = signed_area(&coords) < 0.0;
        let ls = geo::LineString(coords);

        if is_exterior {
            if let Some(ext) = current_exterior.take() {
                polys.push(geo::Polygon::new(ext, std::mem::take(&mut current_holes)));
            }
            current_exterior = Some(ls);
        } else {
            current_holes.push(ls);
        }
    }
    if let Some(ext) = current_exterior {
        polys.push(geo::Polygon::new(ext, current_holes));
    }

    Ok(MultiPolygon(polys))
}
