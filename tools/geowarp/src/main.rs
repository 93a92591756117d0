use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use env_logger::{Env, TimestampPrecision};
use geowarp::{
    DriverRegistry, RasterDataset,
    gdal::{GdalRegistry, GdalWarpEngine},
    warp::{WarpContext, warp},
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;

use crate::request::{runtime_config, warp_request};

pub type Result<T> = anyhow::Result<T>;

mod request;

#[derive(Parser, Debug)]
#[clap(name = "geowarp", about = "Reproject and mosaic rasters")]
pub struct Opt {
    /// Source rasters followed by the destination
    #[arg(required = true, num_args = 2..)]
    pub files: Vec<String>,

    #[arg(long = "te", num_args = 4, value_names = ["XMIN", "YMIN", "XMAX", "YMAX"], allow_negative_numbers = true)]
    pub target_extent: Option<Vec<f64>>,

    #[arg(long = "te_srs", value_name = "SRS")]
    pub target_extent_srs: Option<String>,

    #[arg(long = "tr", num_args = 2, value_names = ["XRES", "YRES"])]
    pub target_resolution: Option<Vec<f64>>,

    #[arg(long = "tap")]
    pub target_aligned_pixels: bool,

    #[arg(long = "ts", num_args = 2, value_names = ["WIDTH", "HEIGHT"])]
    pub target_size: Option<Vec<usize>>,

    #[arg(long = "s_srs", value_name = "SRS")]
    pub source_srs: Option<String>,

    #[arg(long = "t_srs", value_name = "SRS")]
    pub target_srs: Option<String>,

    /// Coordinate operation from the source to the target SRS
    #[arg(long = "ct", value_name = "PROJ")]
    pub coordinate_operation: Option<String>,

    #[arg(short = 'r', value_name = "near|bilinear|cubic|...")]
    pub resample: Option<String>,

    #[arg(long = "srcnodata", value_name = "VALUES", allow_hyphen_values = true)]
    pub src_nodata: Option<String>,

    #[arg(long = "dstnodata", value_name = "VALUES", allow_hyphen_values = true)]
    pub dst_nodata: Option<String>,

    #[arg(long = "srcalpha", conflicts_with = "no_src_alpha")]
    pub src_alpha: bool,

    #[arg(long = "nosrcalpha")]
    pub no_src_alpha: bool,

    #[arg(long = "dstalpha")]
    pub dst_alpha: bool,

    /// WKT polygon or vector datasource
    #[arg(long = "cutline")]
    pub cutline: Option<String>,

    #[arg(long = "cl", value_name = "LAYER")]
    pub cutline_layer: Option<String>,

    #[arg(long = "cwhere", value_name = "EXPRESSION")]
    pub cutline_where: Option<String>,

    #[arg(long = "csql", value_name = "QUERY")]
    pub cutline_sql: Option<String>,

    #[arg(long = "cutline_srs", value_name = "SRS")]
    pub cutline_srs: Option<String>,

    #[arg(long = "cblend", value_name = "DISTANCE")]
    pub cutline_blend: Option<f64>,

    #[arg(long = "crop_to_cutline")]
    pub crop_to_cutline: bool,

    /// Transformer option
    #[arg(long = "to", value_name = "NAME=VALUE")]
    pub transformer_options: Vec<String>,

    /// Warp option
    #[arg(long = "wo", value_name = "NAME=VALUE")]
    pub warp_options: Vec<String>,

    #[arg(long = "ovr", value_name = "AUTO|AUTO-n|NONE|level")]
    pub overview: Option<String>,

    #[arg(long = "vshift", conflicts_with = "no_vshift")]
    pub vshift: bool,

    #[arg(long = "novshift")]
    pub no_vshift: bool,

    #[arg(long = "multi")]
    pub multi: bool,

    #[arg(short = 'b', long = "srcband", value_name = "BAND")]
    pub src_bands: Vec<usize>,

    #[arg(long = "dstband", value_name = "BAND")]
    pub dst_bands: Vec<usize>,

    #[arg(long = "of", value_name = "FORMAT")]
    pub format: Option<String>,

    #[arg(long = "ot", value_name = "TYPE")]
    pub output_type: Option<String>,

    /// Creation option
    #[arg(long = "co", value_name = "NAME=VALUE")]
    pub creation_options: Vec<String>,

    #[arg(long = "overwrite")]
    pub overwrite: bool,

    /// Do not copy the source metadata
    #[arg(long = "nomd")]
    pub no_metadata: bool,

    /// Value of metadata items that differ between the sources
    #[arg(long = "cvmd", value_name = "VALUE")]
    pub metadata_conflict_value: Option<String>,

    /// Error threshold of the approximated transformer in pixels, 0 for the exact transformer
    #[arg(long = "et", value_name = "PIXELS")]
    pub error_threshold: Option<f64>,

    /// Warp memory, in MB below 10000, otherwise in bytes
    #[arg(long = "wm", value_name = "MEMORY")]
    pub warp_memory: Option<f64>,

    #[arg(long = "densify-cutline", value_name = "YES|NO|ONLY_IF_INVALID")]
    pub densify_cutline: Option<String>,

    /// Continue with an invalid cutline (debugging only)
    #[arg(long = "ignore-bad-cutline")]
    pub ignore_bad_cutline: bool,

    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

fn run(opt: &Opt, multi: &MultiProgress) -> Result<()> {
    let request = warp_request(opt)?;
    let config = runtime_config(opt)?;
    let Some((dst_path, src_paths)) = opt.files.split_last() else {
        return Err(geowarp::Error::Usage("No destination specified".into()).into());
    };

    let registry = GdalRegistry::new();
    let ctx = WarpContext::new(&registry, &GdalWarpEngine).with_config(config);

    let sources = src_paths
        .iter()
        .map(|path| registry.open_raster(path))
        .collect::<geowarp::Result<Vec<_>>>()?;
    let sources: Vec<&dyn RasterDataset> = sources.iter().map(|src| src.as_ref()).collect();

    let progress = if opt.quiet { ProgressBar::hidden() } else { multi.add(ProgressBar::new(100)) };
    progress.set_style(ProgressStyle::with_template("{bar:40} {percent}% {msg}")?);

    let dst = warp(&ctx, dst_path, &sources, &request, &mut |complete: f64| {
        progress.set_position((complete * 100.0).round() as u64);
        true
    })?;
    progress.finish_with_message("done");

    if let Some(description) = dst.warp_description() {
        println!("{description}");
    }

    Ok(())
}

fn main() -> ExitCode {
    let opt = Opt::parse();

    let logger = env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp(Some(TimestampPrecision::Millis))
        .build();

    let multi = MultiProgress::new();
    let level = logger.filter();
    if let Err(e) = LogWrapper::new(multi.clone(), logger).try_init() {
        eprintln!("Failed to initialize logging: {e}");
    }
    log::set_max_level(level);
    geowarp::gdal::setup_logging(level >= log::LevelFilter::Debug);

    match run(&opt, &multi) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<geowarp::Error>() {
                Some(usage @ geowarp::Error::Usage(_)) => {
                    eprintln!("{usage}");
                    eprintln!("{}", Opt::command().render_usage());
                }
                _ => eprintln!("ERROR: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
