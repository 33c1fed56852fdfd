/// Export tool: writes one GeoTIFF per selected year, clipped to the
/// boundary and resampled to the export scale and CRS, as
/// `<out-dir>/image_<year>.tif`.
///
/// Years are exported in the order given; the first failure aborts the run.
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use landcover_core::archive::open_archive;
use landcover_core::boundary::RegionBoundary;
use landcover_core::collection::YearSelection;
use landcover_core::session::Session;
use landcover_core::settings::{Settings, DEFAULT_ASSET};

#[derive(Parser, Debug)]
#[command(name = "export", about = "Export clipped yearly land-cover images as GeoTIFF")]
struct Args {
    /// Archive: a directory with catalog.json, or a .tar/.tar.gz bundle.
    archive: PathBuf,

    /// GeoJSON feature collection delimiting the region of interest.
    #[arg(short, long)]
    boundary: Option<PathBuf>,

    /// Years to export, comma-separated (default: most recent year).
    #[arg(short, long, value_delimiter = ',')]
    years: Vec<String>,

    #[arg(long, default_value = DEFAULT_ASSET)]
    asset: String,

    /// Output directory (default: ~/Downloads).
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Output pixel edge in metres.
    #[arg(long, default_value = "30")]
    scale: f64,

    /// Output coordinate reference system.
    #[arg(long, default_value = "EPSG:4674")]
    crs: String,

    /// Print a JSON summary of the written files.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let defaults = Settings::default();
    let settings = Settings {
        asset: args.asset.clone(),
        scale_m: args.scale,
        crs: args.crs.clone(),
        out_dir: args.out_dir.clone().unwrap_or(defaults.out_dir.clone()),
        ..defaults
    };

    let archive = open_archive(&args.archive, &settings.asset)
        .with_context(|| format!("Cannot open archive {}", args.archive.display()))?;
    let out_dir = settings.out_dir.clone();
    let session = Session::open(archive, settings)?;

    let region = match &args.boundary {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("Cannot read {}", path.display()))?;
            let region = RegionBoundary::from_reader(BufReader::new(file))
                .with_context(|| format!("Invalid boundary {}", path.display()))?;
            Some(Arc::new(region))
        }
        None => None,
    };

    let selection = YearSelection::new(args.years.iter().map(|y| y.trim()));
    let written = session
        .export_selection(&selection, region.as_ref(), &out_dir)
        .context("Export failed")?;

    for summary in &written {
        log::info!("{}  {}x{}", summary.path.display(), summary.width, summary.height);
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&written)?);
    }
    log::info!("exported {} year(s) to {}", written.len(), out_dir.display());
    Ok(())
}
