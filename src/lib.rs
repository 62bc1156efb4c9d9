#![doc = "Wasteshed public API"]
pub mod assemble;
pub mod cli;
pub mod commands;
pub mod proj;
pub mod raster;
pub mod render;
pub mod transform;
pub mod vector;
pub mod window;
pub mod zonal;

#[doc(inline)]
pub use raster::{GeoTransform, RasterSurface};

#[doc(inline)]
pub use vector::PolygonLayer;

#[doc(inline)]
pub use window::{union_bounds, window_for_bounds, Window};

#[doc(inline)]
pub use transform::{tonnes_per_week, WasteParams};

#[doc(inline)]
pub use zonal::{zonal_stats, ZonalStat};
