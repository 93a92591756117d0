//! Warp orchestration: resolves the output, then warps every source into it in order.
//!
//! ```no_run
//! use geowarp::{DriverRegistry, mem::{MemRegistry, NearestNeighbourEngine}, warp::{WarpContext, WarpRequest, warp}};
//! # fn main() -> geowarp::Result<()> {
//! let registry = MemRegistry::new();
//! let ctx = WarpContext::new(&registry, &NearestNeighbourEngine);
//! let src = registry.open_raster("input.json")?;
//! let request = WarpRequest::builder().target_srs("EPSG:3857".parse()?).build();
//! let _dst = warp(&ctx, "output.tif", &[src.as_ref()], &request, &mut |_| true)?;
//! # Ok(())
//! # }
//! ```

mod config;
pub mod cutline;
pub mod mosaic;
pub mod nodata;
mod options;
pub mod output;
mod pipeline;
pub mod transform;
pub mod vshift;
mod warpoptions;

#[doc(inline)]
pub use {
    config::{DEFAULT_SKIP_NOSOURCE_FORMATS, DensifyCutline, RuntimeConfig},
    mosaic::can_use_mosaic,
    options::{
        AlphaPolicy, CutlineSource, NodataSpec, ResampleAlg, VerticalShiftPolicy, WarpRequest, check_resolution_consistency,
    },
    output::ResolvedPlan,
    warpoptions::{ProgressFn, ScaledProgress, WarpDescription, WarpEngine, WarpOptions},
};

use crate::{
    Driver, DriverRegistry, Error, NameValueList, RasterDataset, Result, dataset::dataset_name, format::output_driver,
};
use cutline::{Cutline, load_cutline};
use output::{create_output, resolve_output};
use pipeline::{Destination, warp_sources};

/// Collaborators and run wide settings of a warp
pub struct WarpContext<'a> {
    pub registry: &'a dyn DriverRegistry,
    pub engine: &'a dyn WarpEngine,
    pub config: RuntimeConfig,
}

impl<'a> WarpContext<'a> {
    pub fn new(registry: &'a dyn DriverRegistry, engine: &'a dyn WarpEngine) -> Self {
        WarpContext {
            registry,
            engine,
            config: RuntimeConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }
}

fn check_sources(sources: &[&dyn RasterDataset], request: &WarpRequest) -> Result {
    if sources.is_empty() {
        return Err(Error::Usage("No source dataset specified".into()));
    }

    for src in sources {
        if src.band_count() == 0 {
            return Err(Error::Configuration(format!("Input file {} has no raster bands", dataset_name(*src))));
        }

        if let Some(band) = request.src_bands.iter().find(|band| **band > src.band_count()) {
            return Err(Error::Configuration(format!(
                "Band {band} requested, but {} only has {} band(s)",
                dataset_name(*src),
                src.band_count()
            )));
        }
    }

    Ok(())
}

fn load_request_cutline(ctx: &WarpContext, request: &WarpRequest) -> Result<Option<Cutline>> {
    request
        .cutline
        .as_ref()
        .map(|source| load_cutline(ctx.registry, source, request.cutline_srs.as_ref()))
        .transpose()
}

/// Warps the sources into `dst_path`.
///
/// An existing destination is updated unless `overwrite` is set, otherwise the destination is created with the grid
/// derived from the request and the sources. Formats that only support copies are written through an in-memory dataset.
/// On failure a newly created destination is released, pixels already written are not rolled back.
pub fn warp(
    ctx: &WarpContext,
    dst_path: &str,
    sources: &[&dyn RasterDataset],
    request: &WarpRequest,
    progress: &mut ProgressFn,
) -> Result<Box<dyn RasterDataset>> {
    request.validate()?;
    check_sources(sources, request)?;
    let cutline = load_request_cutline(ctx, request)?;

    if !request.overwrite {
        if let Some(mut dst) = ctx.registry.open_update(dst_path)? {
            log::info!("Warping into existing dataset {dst_path}");
            warp_existing(ctx, dst.as_mut(), sources, request, cutline.as_ref(), progress)?;
            dst.flush()?;
            return Ok(dst);
        }
    }

    let driver = output_driver(ctx.registry, request.format.as_deref(), dst_path)?;
    if request.overwrite {
        driver.delete(dst_path)?;
    }

    if driver.name().eq_ignore_ascii_case("VRT") && sources.len() > 1 {
        return Err(Error::Configuration(
            "VRT output supports a single source dataset only, build a mosaic of the sources first".into(),
        ));
    }

    let mut dst = if driver.can_create() {
        let plan = resolve_output(sources, request, cutline.as_ref(), driver, &ctx.config)?;
        let mut dst = create_output(driver, dst_path, &plan, sources, request)?;
        let mut destination = Destination {
            dataset: dst.as_mut(),
            plan: &plan,
            created: true,
        };
        warp_sources(ctx, &mut destination, sources, request, cutline.as_ref(), progress)?;
        dst
    } else {
        warp_indirect(ctx, driver, dst_path, sources, request, cutline.as_ref(), progress)?
    };

    dst.flush()?;
    Ok(dst)
}

/// Warps the sources into an opened destination, its grid, bands and nodata values are kept
pub fn warp_into(
    ctx: &WarpContext,
    dst: &mut dyn RasterDataset,
    sources: &[&dyn RasterDataset],
    request: &WarpRequest,
    progress: &mut ProgressFn,
) -> Result {
    request.validate()?;
    check_sources(sources, request)?;
    let cutline = load_request_cutline(ctx, request)?;
    warp_existing(ctx, dst, sources, request, cutline.as_ref(), progress)
}

fn warp_existing(
    ctx: &WarpContext,
    dst: &mut dyn RasterDataset,
    sources: &[&dyn RasterDataset],
    request: &WarpRequest,
    cutline: Option<&Cutline>,
    progress: &mut ProgressFn,
) -> Result {
    if request.has_creation_flags() {
        return Err(Error::Configuration(format!(
            "Output dataset {} exists, but some options were provided indicating a new dataset should be created. \
             Delete it first or use overwrite",
            dataset_name(dst)
        )));
    }

    let plan = ResolvedPlan::from_existing(dst, request)?;
    let mut destination = Destination {
        dataset: dst,
        plan: &plan,
        created: false,
    };
    warp_sources(ctx, &mut destination, sources, request, cutline, progress)
}

/// Output through a driver that can only copy complete datasets: the sources are warped into an in-memory dataset
/// which is copied afterwards. Sources that only need stacking are combined in a virtual mosaic first.
fn warp_indirect(
    ctx: &WarpContext,
    driver: &dyn Driver,
    dst_path: &str,
    sources: &[&dyn RasterDataset],
    request: &WarpRequest,
    cutline: Option<&Cutline>,
    progress: &mut ProgressFn,
) -> Result<Box<dyn RasterDataset>> {
    let mem_driver = ctx
        .registry
        .driver_by_name("MEM")
        .filter(|mem| mem.can_create())
        .ok_or_else(|| {
            Error::Configuration(format!(
                "Output driver {} only supports CreateCopy() and no MEM driver is available",
                driver.name()
            ))
        })?;

    let mosaic = if sources.len() > 1 && can_use_mosaic(sources) {
        log::info!("Stacking {} sources in a virtual mosaic", sources.len());
        Some(ctx.registry.build_mosaic(&format!("{dst_path}.mosaic.vrt"), sources)?)
    } else {
        None
    };

    let mosaic_source;
    let sources: &[&dyn RasterDataset] = match &mosaic {
        Some(mosaic) => {
            mosaic_source = [mosaic.as_ref()];
            &mosaic_source
        }
        None => sources,
    };

    let plan = resolve_output(sources, request, cutline, driver, &ctx.config)?;
    let mem_plan = ResolvedPlan {
        creation_options: NameValueList::new(),
        ..plan.clone()
    };

    let mut intermediate = create_output(mem_driver, "", &mem_plan, sources, request)?;
    let mut destination = Destination {
        dataset: intermediate.as_mut(),
        plan: &mem_plan,
        created: true,
    };
    warp_sources(ctx, &mut destination, sources, request, cutline, progress)?;

    log::info!("Copying the warped dataset to {dst_path} ({})", driver.name());
    driver.create_copy(dst_path, intermediate.as_ref(), &plan.creation_options)
}
