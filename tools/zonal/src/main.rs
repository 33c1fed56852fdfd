/// Zonal statistics tool: area per land-cover class per selected year inside
/// an uploaded GeoJSON boundary, written as CSV/JSON together with the chart
/// series the dashboard draws.
///
/// With no --years the most recent year of the archive is used.
use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use landcover_core::archive::open_archive;
use landcover_core::boundary::RegionBoundary;
use landcover_core::chart::{latest_year_pie, stacked_area, AreaSeries, PieChart};
use landcover_core::collection::YearSelection;
use landcover_core::session::Session;
use landcover_core::settings::{Settings, DEFAULT_ASSET};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "zonal", about = "Area per land-cover class per year inside a boundary")]
struct Args {
    /// Archive: a directory with catalog.json, or a .tar/.tar.gz bundle.
    archive: PathBuf,

    /// GeoJSON feature collection delimiting the region of interest.
    #[arg(short, long)]
    boundary: PathBuf,

    /// Years to aggregate, comma-separated, in the order to report them.
    #[arg(short, long, value_delimiter = ',')]
    years: Vec<String>,

    #[arg(long, default_value = DEFAULT_ASSET)]
    asset: String,

    /// CSV output (ano,classe,nome_classe,Area_ha); stdout when absent.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// JSON output of the area table.
    #[arg(long)]
    json: Option<PathBuf>,

    /// JSON output of the stacked-area series and latest-year pie.
    #[arg(long)]
    charts: Option<PathBuf>,

    /// Pixel ceiling per aggregation.
    #[arg(long)]
    max_pixels: Option<u64>,

    /// Fail instead of sampling when the ceiling is exceeded.
    #[arg(long)]
    exact: bool,
}

#[derive(Serialize)]
struct Charts {
    stacked: Vec<AreaSeries>,
    pie: Option<PieChart>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut settings = Settings { asset: args.asset.clone(), ..Settings::default() };
    if let Some(max) = args.max_pixels {
        settings.max_pixels = max;
    }
    settings.best_effort = !args.exact;

    let archive = open_archive(&args.archive, &settings.asset)
        .with_context(|| format!("Cannot open archive {}", args.archive.display()))?;
    let session = Session::open(archive, settings)?;

    let file = File::open(&args.boundary)
        .with_context(|| format!("Cannot read {}", args.boundary.display()))?;
    let region = RegionBoundary::from_reader(BufReader::new(file))
        .with_context(|| format!("Invalid boundary {}", args.boundary.display()))?;
    let region = Arc::new(region);

    let selection = YearSelection::new(args.years.iter().map(|y| y.trim()));
    let effective = session.effective_years(&selection);
    let years: Vec<&str> = effective.iter().collect();
    log::info!("aggregating {} year(s): {}", years.len(), years.join(", "));

    let table = session
        .area_table(&selection, Some(&region))?
        .context("no area table without a boundary")?;

    match &args.csv {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
            table.write_csv(file)?;
            log::info!("wrote {} rows to {}", table.len(), path.display());
        }
        None => table.write_csv(io::stdout().lock())?,
    }

    if let Some(path) = &args.json {
        fs::write(path, serde_json::to_string_pretty(&table)?)
            .with_context(|| format!("Cannot write {}", path.display()))?;
    }

    if let Some(path) = &args.charts {
        let charts = Charts {
            stacked: stacked_area(&table, session.legend()),
            pie: latest_year_pie(&table, session.legend()),
        };
        let mut out = File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
        serde_json::to_writer_pretty(&mut out, &charts)?;
        writeln!(out)?;
    }
    Ok(())
}
