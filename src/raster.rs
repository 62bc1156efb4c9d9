//! Gridded population raster input (single-band GeoTIFF).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use geo::Coord;
use ndarray::{s, Array2};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

use crate::window::Window;

/// Affine mapping between grid indices and spatial coordinates.
///
/// North-up rasters have a negative `pixel_height`: row indices grow
/// southward while y coordinates grow northward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Fractional (col, row) grid position of a spatial coordinate.
    pub fn index(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// Spatial coordinate of the center of cell (row, col).
    pub fn cell_center(&self, row: usize, col: usize) -> Coord<f64> {
        Coord {
            x: self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            y: self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        }
    }

    /// Transform valid for a read window, with the origin shifted by whole
    /// cells. Must be recomputed per window, never reused across windows.
    pub fn for_window(&self, window: &Window) -> GeoTransform {
        GeoTransform {
            origin_x: self.origin_x + window.col_off as f64 * self.pixel_width,
            origin_y: self.origin_y + window.row_off as f64 * self.pixel_height,
            ..*self
        }
    }
}

/// A decoded single-band raster: cell values, no-data sentinel, affine
/// transform, and coordinate reference system.
///
/// The file handle lives only inside [`RasterSurface::open`]: tags and the
/// band are decoded before it drops, so every downstream read is backed by
/// memory rather than a live file.
#[derive(Debug)]
pub struct RasterSurface {
    band: Array2<f64>,
    transform: GeoTransform,
    nodata: Option<f64>,
    epsg: u32,
}

impl RasterSurface {
    /// Open a single-band GeoTIFF and decode its band and georeferencing.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("[raster] failed to open {}", path.display()))?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .with_context(|| format!("[raster] not a readable TIFF: {}", path.display()))?;

        let (width, height) = decoder.dimensions()
            .context("[raster] missing image dimensions")?;

        let transform = read_geotransform(&mut decoder)
            .with_context(|| format!("[raster] {} is not georeferenced", path.display()))?;
        let epsg = read_epsg(&mut decoder);
        let nodata = decoder
            .get_tag_ascii_string(Tag::GdalNodata)
            .ok()
            .and_then(|s| s.trim().trim_end_matches('\0').parse::<f64>().ok());

        let band = decode_band(&mut decoder, height as usize, width as usize)
            .with_context(|| format!("[raster] failed to decode band 1 of {}", path.display()))?;

        Ok(Self { band, transform, nodata, epsg })
    }

    /// (rows, cols) of the full raster.
    pub fn shape(&self) -> (usize, usize) {
        self.band.dim()
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    /// Read a window of the band, returning the cell values together with
    /// the affine transform recomputed for the window origin.
    pub fn read_window(&self, window: &Window) -> Result<(Array2<f64>, GeoTransform)> {
        let (rows, cols) = self.band.dim();
        if window.row_off + window.rows > rows || window.col_off + window.cols > cols {
            bail!(
                "[raster] window {:?} exceeds raster shape ({} x {})",
                window, rows, cols
            );
        }

        let view = self.band.slice(s![
            window.row_off..window.row_off + window.rows,
            window.col_off..window.col_off + window.cols
        ]);

        Ok((view.to_owned(), self.transform.for_window(window)))
    }

    /// Build a surface directly from parts (synthetic rasters in tests).
    pub fn from_parts(
        band: Array2<f64>,
        transform: GeoTransform,
        nodata: Option<f64>,
        epsg: u32,
    ) -> Self {
        Self { band, transform, nodata, epsg }
    }
}

/// Assemble the affine transform from the ModelPixelScale + ModelTiepoint
/// tag pair. Rasters carrying only a ModelTransformation matrix are not
/// supported.
fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .context("missing ModelPixelScale tag")?;
    let tie = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .context("missing ModelTiepoint tag")?;

    if scale.len() < 2 || tie.len() < 5 {
        bail!("malformed georeferencing tags");
    }

    // Tiepoint maps raster point (i, j) to model point (x, y); shift the
    // origin back to raster (0, 0).
    Ok(GeoTransform {
        origin_x: tie[3] - tie[0] * scale[0],
        origin_y: tie[4] + tie[1] * scale[1],
        pixel_width: scale[0],
        pixel_height: -scale[1],
    })
}

/// Pull the EPSG code out of the GeoKey directory. Ungeokeyed rasters fall
/// back to WGS84 lon/lat.
fn read_epsg<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> u32 {
    decoder
        .get_tag_u32_vec(Tag::GeoKeyDirectoryTag)
        .ok()
        .and_then(|dir| epsg_from_geokeys(&dir))
        .unwrap_or(4326)
}

/// Scan GeoKey entries for the CS code: projected key first, then
/// geographic. Entries of four shorts follow a four-short header:
/// (key id, tag location, count, value); location 0 means the value is
/// stored inline. A directory too short to hold its header has no entries.
fn epsg_from_geokeys(dir: &[u32]) -> Option<u32> {
    const PROJECTED_CS_KEY: u32 = 3072;
    const GEOGRAPHIC_CS_KEY: u32 = 2048;

    let entries = dir.get(4..).unwrap_or(&[]);
    let lookup = |key: u32| -> Option<u32> {
        entries
            .chunks_exact(4)
            .find(|entry| entry[0] == key && entry[1] == 0)
            .map(|entry| entry[3])
    };

    lookup(PROJECTED_CS_KEY).or_else(|| lookup(GEOGRAPHIC_CS_KEY))
}

/// Decode the first band into f64 regardless of on-disk sample type.
fn decode_band<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    rows: usize,
    cols: usize,
) -> Result<Array2<f64>> {
    let data: Vec<f64> = match decoder.read_image()? {
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U64(buf) => buf.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I64(buf) => buf.into_iter().map(|v| v as f64).collect(),
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        _ => bail!("unsupported sample format"),
    };

    Array2::from_shape_vec((rows, cols), data)
        .context("band size does not match image dimensions")
}
