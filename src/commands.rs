//! The `estimate` command: the full raster-to-rankings pipeline.

use std::fs;

use anyhow::{Context, Result};

use crate::assemble;
use crate::cli::{Cli, EstimateArgs};
use crate::raster::RasterSurface;
use crate::render::{render_choropleth, MapStyle};
use crate::transform::{tonnes_per_week, WasteParams};
use crate::vector::PolygonLayer;
use crate::window::{union_bounds, window_for_bounds};
use crate::zonal::{zonal_stats, ZonalStat};

const GENERATED_COL: &str = "generated_tpw";
const UNCOLLECTED_COL: &str = "uncollected_tpw";

pub fn estimate(cli: &Cli, args: &EstimateArgs) -> Result<()> {
    let verbose = cli.verbose;
    let params = WasteParams { kg_per_capita_day: args.per_capita };

    // 1. Population raster.
    if verbose > 0 { eprintln!("[raster] {}", args.raster.display()); }
    let raster = RasterSurface::open(&args.raster)?;
    if verbose > 1 {
        let (rows, cols) = raster.shape();
        eprintln!("[raster] {} x {} cells, EPSG:{}, nodata {:?}",
            rows, cols, raster.epsg(), raster.nodata());
    }

    // 2. Administrative boundaries, reprojected to the raster CRS and
    // reduced to the requested tier-1 region.
    if verbose > 0 { eprintln!("[vector] {}", args.admin.display()); }
    let admin = PolygonLayer::from_shapefile(
        &args.admin,
        args.vector_epsg,
        &[&args.region_field, &args.name_field],
        &[],
    )?
    .to_crs(raster.epsg())?
    .filter_eq(&args.region_field, &args.state)?;

    anyhow::ensure!(
        !admin.is_empty(),
        "[estimate] no admin polygons where {} = {:?}",
        args.region_field,
        args.state,
    );
    if verbose > 0 {
        eprintln!("[vector] {} jurisdictions in {}", admin.len(), args.state);
    }

    // 3. Service areas, in the same CRS as the raster.
    if verbose > 0 { eprintln!("[vector] {}", args.service.display()); }
    let service = PolygonLayer::from_shapefile(
        &args.service,
        args.vector_epsg,
        &[&args.provider_field],
        &[&args.collected_field],
    )?
    .to_crs(raster.epsg())?;

    // 4. One raster window for the run, sized to both layers together. A
    // window covering only the admin bounds would truncate service areas
    // that extend past them.
    let bounds = union_bounds(&admin.total_bounds()?, &service.total_bounds()?);
    let window = window_for_bounds(raster.transform(), raster.shape(), &bounds)?;
    let (population, win_transform) = raster.read_window(&window)?;
    if verbose > 1 {
        eprintln!("[window] rows {}..{}, cols {}..{}",
            window.row_off, window.row_off + window.rows,
            window.col_off, window.col_off + window.cols);
    }

    // 5. Per-cell waste rate, invalid cells masked before any arithmetic.
    let waste_tpw = tonnes_per_week(population, raster.nodata(), &params);

    // 6. Generated waste per jurisdiction.
    let admin_zonal = zonal_stats(
        &admin.names(&args.name_field)?,
        &admin.geoms,
        &waste_tpw,
        &win_transform,
        None,
        ZonalStat::Sum,
        &args.name_field,
        GENERATED_COL,
    )?;
    let mut admin_table = assemble::attach_zonal(&admin.data, &admin_zonal, &args.name_field)?;
    warn_filled(assemble::fill_null_with_zero(&mut admin_table, GENERATED_COL)?, "jurisdictions");

    let generated = assemble::ranking(&admin_table, &args.name_field, GENERATED_COL)?;
    assemble::print_ranking(
        &format!("Generated waste by jurisdiction, {} (tonnes/week)", args.state),
        &generated,
    );

    // 7. Uncollected backlog per service provider.
    let service_zonal = zonal_stats(
        &service.names(&args.provider_field)?,
        &service.geoms,
        &waste_tpw,
        &win_transform,
        None,
        ZonalStat::Sum,
        &args.provider_field,
        GENERATED_COL,
    )?;
    let mut service_table =
        assemble::attach_zonal(&service.data, &service_zonal, &args.provider_field)?;
    warn_filled(assemble::fill_null_with_zero(&mut service_table, GENERATED_COL)?, "service areas");
    assemble::uncollected_column(
        &mut service_table,
        GENERATED_COL,
        &args.collected_field,
        UNCOLLECTED_COL,
    )?;

    let uncollected = assemble::ranking(&service_table, &args.provider_field, UNCOLLECTED_COL)?;
    println!();
    assemble::print_ranking("Uncollected waste by provider (tonnes/week)", &uncollected);

    // 8. Choropleth maps.
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("[estimate] create dir {}", args.out_dir.display()))?;
    let annotation = format!(
        "Model: {} kg/person/day x 7 days, HRSL population grid. Negative backlogs \
         mean reported collection exceeds the model.",
        args.per_capita,
    );

    let generated_map = args.out_dir.join("generated_waste.svg");
    render_choropleth(
        &generated_map,
        &admin.geoms,
        &admin_table,
        GENERATED_COL,
        &MapStyle::new(
            format!("Generated waste, {} (tonnes/week)", args.state),
            annotation.clone(),
        ),
    )?;
    if verbose > 0 { eprintln!("[render] {}", generated_map.display()); }

    let uncollected_map = args.out_dir.join("uncollected_waste.svg");
    render_choropleth(
        &uncollected_map,
        &service.geoms,
        &service_table,
        UNCOLLECTED_COL,
        &MapStyle::new("Uncollected waste by provider (tonnes/week)", annotation),
    )?;
    if verbose > 0 { eprintln!("[render] {}", uncollected_map.display()); }

    Ok(())
}

fn warn_filled(filled: usize, what: &str) {
    if filled > 0 {
        eprintln!("[estimate] {} {} cover no valid cells; treating as 0 generated", filled, what);
    }
}
