//! Diagnostic visualizer: renders one year of the archive through the legend
//! palette as a PNG, optionally clipped to a boundary.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use image::RgbaImage;
use landcover_core::archive::open_archive;
use landcover_core::boundary::RegionBoundary;
use landcover_core::session::Session;
use landcover_core::settings::{Settings, DEFAULT_ASSET};

#[derive(Parser, Debug)]
#[command(name = "visualize", about = "Render a yearly land-cover layer as PNG")]
struct Args {
    /// Archive: a directory with catalog.json, or a .tar/.tar.gz bundle.
    archive: PathBuf,

    /// Year to render (default: most recent).
    #[arg(short, long)]
    year: Option<String>,

    /// Clip to this GeoJSON boundary.
    #[arg(short, long)]
    boundary: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_ASSET)]
    asset: String,

    /// Output PNG (default: data/debug/landcover_<year>.png).
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let settings = Settings { asset: args.asset.clone(), ..Settings::default() };
    let archive = open_archive(&args.archive, &settings.asset)
        .with_context(|| format!("Cannot open archive {}", args.archive.display()))?;
    let session = Session::open(archive, settings)?;

    let year = match &args.year {
        Some(y) => y.clone(),
        None => session
            .index()
            .latest_year()
            .map(str::to_string)
            .context("archive holds no years")?,
    };

    let region = match &args.boundary {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("Cannot read {}", path.display()))?;
            Some(Arc::new(RegionBoundary::from_reader(BufReader::new(file))?))
        }
        None => None,
    };

    let look = session.quicklook(&year, region.as_ref())?;
    let (w, h) = (look.width as u32, look.height as u32);
    let img = RgbaImage::from_raw(w, h, look.rgba)
        .context("quicklook buffer does not match its dimensions")?;

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("data/debug/landcover_{year}.png")));
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }
    img.save(&output)
        .with_context(|| format!("Cannot write {}", output.display()))?;
    log::info!(
        "wrote {} ({w}x{h}, lon {:.4}..{:.4}, lat {:.4}..{:.4})",
        output.display(),
        look.min_lon,
        look.max_lon,
        look.min_lat,
        look.max_lat
    );
    Ok(())
}
