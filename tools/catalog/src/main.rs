/// Catalog tool: lists the yearly classification bands of an archive as the
/// (year, band) index, and packs a catalog directory into a single
/// `.tar` / `.tar.gz` bundle for the browser dashboard.
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use flate2::write::GzEncoder;
use flate2::Compression;
use landcover_core::archive::{append_bundle_entry, open_archive, Archive};
use landcover_core::collection::Collection;
use landcover_core::settings::DEFAULT_ASSET;

#[derive(Parser, Debug)]
#[command(name = "catalog", about = "List or bundle the yearly bands of a land-cover archive")]
struct Args {
    /// Archive: a directory with catalog.json, or a .tar/.tar.gz bundle.
    archive: PathBuf,

    /// Asset whose bands are listed.
    #[arg(long, default_value = DEFAULT_ASSET)]
    asset: String,

    /// Print the index as JSON instead of a table.
    #[arg(long)]
    json: bool,

    /// Write every band into a bundle (gzipped when the name ends in .gz).
    #[arg(long)]
    pack: Option<PathBuf>,
}

fn write_bundle<W: Write>(archive: &dyn Archive, asset: &str, bands: &[String], writer: W) -> Result<W> {
    let mut builder = tar::Builder::new(writer);
    for band in bands {
        let raster = archive
            .read_band(asset, band)
            .with_context(|| format!("Cannot read band {band}"))?;
        append_bundle_entry(&mut builder, band, &raster)?;
        log::info!("packed {band} ({}x{})", raster.width, raster.height);
    }
    Ok(builder.into_inner()?)
}

fn pack(archive: &dyn Archive, asset: &str, bands: &[String], out: &Path) -> Result<()> {
    let file = File::create(out).with_context(|| format!("Cannot create {}", out.display()))?;
    let writer = BufWriter::new(file);
    let mut writer = if out.extension().is_some_and(|e| e == "gz") {
        let gz = GzEncoder::new(writer, Compression::default());
        write_bundle(archive, asset, bands, gz)?.finish()?
    } else {
        write_bundle(archive, asset, bands, writer)?
    };
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let archive = open_archive(&args.archive, &args.asset)
        .with_context(|| format!("Cannot open archive {}", args.archive.display()))?;
    let collection = Collection::load(&archive, &args.asset)?;
    let index = collection.index();

    if let Some(out) = &args.pack {
        let bands: Vec<String> = index.rows().iter().map(|r| r.band.clone()).collect();
        pack(&archive, &args.asset, &bands, out)?;
        log::info!("wrote {} bands to {}", bands.len(), out.display());
        return Ok(());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &index)?;
        writeln!(out)?;
    } else {
        writeln!(out, "year  band")?;
        for row in index.rows() {
            writeln!(out, "{}  {}", row.year, row.band)?;
        }
    }
    Ok(())
}
