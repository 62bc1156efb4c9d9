//! Coordinate reference system handling for vector layers.

use anyhow::{anyhow, bail, Context, Result};
use geo::{Coord, MapCoords, MultiPolygon};
use proj4rs::{proj::Proj as Proj4, transform::transform};

/// Whether an EPSG code names a geographic (lon/lat degree) CRS.
pub fn is_geographic(epsg: u32) -> bool {
    matches!(epsg, 4326 | 4269 | 4937)
}

/// PROJ.4 definition for the EPSG codes this pipeline encounters:
/// geographic WGS84/NAD83, web mercator, and the UTM grid.
pub fn proj4_for_epsg(epsg: u32) -> Result<String> {
    Ok(match epsg {
        4326 => "+proj=longlat +datum=WGS84 +no_defs +type=crs".to_string(),
        4269 | 4937 => "+proj=longlat +datum=NAD83 +no_defs +type=crs".to_string(),
        3857 => "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 \
                 +k=1 +units=m +no_defs +type=crs"
            .to_string(),
        32601..=32660 => format!(
            "+proj=utm +zone={} +datum=WGS84 +units=m +no_defs +type=crs",
            epsg - 32600
        ),
        32701..=32760 => format!(
            "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs +type=crs",
            epsg - 32700
        ),
        other => bail!("[proj] unsupported EPSG code {}", other),
    })
}

/// Reproject multipolygons between coordinate reference systems. Degrees
/// are converted to radians on the way in and back on the way out when the
/// respective end of the transform is geographic.
pub fn reproject(
    shapes: &[MultiPolygon<f64>],
    from_epsg: u32,
    to_epsg: u32,
) -> Result<Vec<MultiPolygon<f64>>> {
    if from_epsg == to_epsg {
        return Ok(shapes.to_vec());
    }

    let from = {
        let proj_string = proj4_for_epsg(from_epsg)?;
        Proj4::from_proj_string(&proj_string)
            .with_context(|| anyhow!("[proj] failed to build source PROJ.4: {proj_string}"))?
    };
    let to = {
        let proj_string = proj4_for_epsg(to_epsg)?;
        Proj4::from_proj_string(&proj_string)
            .with_context(|| anyhow!("[proj] failed to build target PROJ.4: {proj_string}"))?
    };

    let deg_in = is_geographic(from_epsg);
    let deg_out = is_geographic(to_epsg);

    shapes.iter()
        .map(|shape| {
            shape.try_map_coords(|coord: Coord<f64>| {
                let mut point = if deg_in {
                    (coord.x.to_radians(), coord.y.to_radians(), 0.0)
                } else {
                    (coord.x, coord.y, 0.0)
                };
                transform(&from, &to, &mut point)
                    .map_err(|e| anyhow!("[proj] transform failed: {e}"))?;
                Ok(if deg_out {
                    Coord { x: point.0.to_degrees(), y: point.1.to_degrees() }
                } else {
                    Coord { x: point.0, y: point.1 }
                })
            })
        })
        .collect()
}
