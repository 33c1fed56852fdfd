//! The classification archive: one composite asset whose bands are the
//! yearly classification layers.
//!
//! Local layouts:
//!   directory with `catalog.json`   bands listed explicitly, rasters read per call
//!   `.tar` / `.tar.gz` bundle       every `*.tif` entry is a band named by its stem
use std::fs;
use std::io::{self, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::export::GeoTiffOptions;
use crate::raster::ClassRaster;

/// Gzip magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Bundle entries are stored in WGS84 geographic coordinates.
const BUNDLE_TIFF: GeoTiffOptions<'static> = GeoTiffOptions { epsg: 4326, nodata: 0, description: None };

/// Backend answering band-name queries and pixel fetches. Every failure is a
/// `RemoteService` error; callers do not retry.
pub trait Archive {
    /// Band names of `asset`, in archive order.
    fn band_names(&self, asset: &str) -> Result<Vec<String>>;

    /// Pixels of one band of `asset`.
    fn read_band(&self, asset: &str, band: &str) -> Result<Arc<ClassRaster>>;
}

impl<A: Archive + ?Sized> Archive for Box<A> {
    fn band_names(&self, asset: &str) -> Result<Vec<String>> {
        (**self).band_names(asset)
    }

    fn read_band(&self, asset: &str, band: &str) -> Result<Arc<ClassRaster>> {
        (**self).read_band(asset, band)
    }
}

impl<A: Archive + ?Sized> Archive for &A {
    fn band_names(&self, asset: &str) -> Result<Vec<String>> {
        (**self).band_names(asset)
    }

    fn read_band(&self, asset: &str, band: &str) -> Result<Arc<ClassRaster>> {
        (**self).read_band(asset, band)
    }
}

// ── catalog.json ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub asset: String,
    pub bands: Vec<CatalogBand>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogBand {
    pub name: String,
    /// GeoTIFF path, relative to the catalog directory.
    pub path: PathBuf,
}

/// Archive directory described by `catalog.json`. Rasters are decoded on
/// every fetch, like a round-trip to a remote service.
#[derive(Debug, Clone)]
pub struct DirectoryArchive {
    root: PathBuf,
    catalog: Catalog,
}

impl DirectoryArchive {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let catalog_path = root.join("catalog.json");
        let text = fs::read_to_string(&catalog_path).map_err(|e| {
            Error::remote(format!("cannot read {}: {e}", catalog_path.display()))
        })?;
        let catalog: Catalog = serde_json::from_str(&text).map_err(|e| {
            Error::remote(format!("cannot parse {}: {e}", catalog_path.display()))
        })?;
        log::debug!("catalog {} lists {} bands", catalog.asset, catalog.bands.len());
        Ok(Self { root, catalog })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn check_asset(&self, asset: &str) -> Result<()> {
        if asset != self.catalog.asset {
            return Err(Error::remote(format!(
                "asset {asset} not found (archive holds {})",
                self.catalog.asset
            )));
        }
        Ok(())
    }
}

impl Archive for DirectoryArchive {
    fn band_names(&self, asset: &str) -> Result<Vec<String>> {
        self.check_asset(asset)?;
        Ok(self.catalog.bands.iter().map(|b| b.name.clone()).collect())
    }

    fn read_band(&self, asset: &str, band: &str) -> Result<Arc<ClassRaster>> {
        self.check_asset(asset)?;
        let entry = self
            .catalog
            .bands
            .iter()
            .find(|b| b.name == band)
            .ok_or_else(|| Error::remote(format!("band {band} not found in {asset}")))?;
        let path = self.root.join(&entry.path);
        let file = fs::File::open(&path)
            .map_err(|e| Error::remote(format!("cannot open {}: {e}", path.display())))?;
        let (raster, _) = ClassRaster::read_tiff(BufReader::new(file))?;
        log::debug!("read band {band}: {}x{}", raster.width, raster.height);
        Ok(Arc::new(raster))
    }
}

// ── In-memory archive ────────────────────────────────────────────────────────

/// Archive held entirely in memory: used for bundles and by the browser
/// binding, where there is no filesystem.
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    asset: String,
    bands: Vec<(String, Arc<ClassRaster>)>,
}

impl MemoryArchive {
    pub fn new(asset: impl Into<String>) -> Self {
        Self { asset: asset.into(), bands: Vec::new() }
    }

    /// Append a band; a band of the same name is replaced in place.
    pub fn insert(&mut self, name: impl Into<String>, raster: ClassRaster) {
        let name = name.into();
        let raster = Arc::new(raster);
        match self.bands.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = raster,
            None => self.bands.push((name, raster)),
        }
    }

    pub fn with_band(mut self, name: impl Into<String>, raster: ClassRaster) -> Self {
        self.insert(name, raster);
        self
    }

    /// Load a `.tar` or `.tar.gz` bundle (detected by magic bytes). Every
    /// `*.tif` entry becomes a band named after its file stem; bands are
    /// ordered by name.
    pub fn from_bundle_bytes(asset: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        if bytes.starts_with(&GZIP_MAGIC) {
            Self::from_tar(asset, GzDecoder::new(bytes))
        } else {
            Self::from_tar(asset, bytes)
        }
    }

    pub fn from_tar<R: Read>(asset: impl Into<String>, reader: R) -> Result<Self> {
        let mut archive = MemoryArchive::new(asset);
        let mut tar = tar::Archive::new(reader);

        for entry in tar.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.into_owned();
            let Some(fname) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(stem) = fname.strip_suffix(".tif").or_else(|| fname.strip_suffix(".tiff")) else {
                continue;
            };
            // macOS resource forks share the .tif suffix.
            if stem.starts_with("._") {
                continue;
            }
            let stem = stem.to_string();

            // tar entries don't implement Seek; the TIFF decoder needs it.
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            let (raster, _) = ClassRaster::read_tiff(Cursor::new(buf))
                .map_err(|e| Error::remote(format!("bundle entry {fname}: {e}")))?;
            log::debug!("bundle band {stem}: {}x{}", raster.width, raster.height);
            archive.insert(stem, raster);
        }

        if archive.bands.is_empty() {
            return Err(Error::remote("bundle contains no .tif bands"));
        }
        archive.bands.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(archive)
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }
}

impl Archive for MemoryArchive {
    fn band_names(&self, asset: &str) -> Result<Vec<String>> {
        if asset != self.asset {
            return Err(Error::remote(format!("asset {asset} not found")));
        }
        Ok(self.bands.iter().map(|(n, _)| n.clone()).collect())
    }

    fn read_band(&self, asset: &str, band: &str) -> Result<Arc<ClassRaster>> {
        if asset != self.asset {
            return Err(Error::remote(format!("asset {asset} not found")));
        }
        self.bands
            .iter()
            .find(|(n, _)| n == band)
            .map(|(_, r)| Arc::clone(r))
            .ok_or_else(|| Error::remote(format!("band {band} not found in {asset}")))
    }
}

/// Open a local archive: a catalog directory, or a tar bundle whose bands
/// are exposed under `asset`.
pub fn open_archive(path: &Path, asset: &str) -> Result<Box<dyn Archive>> {
    if path.is_dir() {
        log::info!("opening archive directory {}", path.display());
        return Ok(Box::new(DirectoryArchive::open(path)?));
    }
    log::info!("loading archive bundle {}", path.display());
    let bytes = fs::read(path)
        .map_err(|e| Error::remote(format!("cannot read {}: {e}", path.display())))?;
    Ok(Box::new(MemoryArchive::from_bundle_bytes(asset, &bytes)?))
}

/// Write `raster` as an entry of a tar bundle under `name.tif`.
pub fn append_bundle_entry<W: io::Write>(
    builder: &mut tar::Builder<W>,
    name: &str,
    raster: &ClassRaster,
) -> Result<()> {
    let mut buf = Cursor::new(Vec::new());
    crate::export::write_geotiff(&mut buf, raster, BUNDLE_TIFF)?;
    let bytes = buf.into_inner();
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, format!("{name}.tif"), bytes.as_slice())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn raster(fill: u16) -> ClassRaster {
        ClassRaster::new(3, 2, -50.0, -49.0, -10.0, -9.0, fill)
    }

    fn bundle(names: &[&str]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (i, name) in names.iter().enumerate() {
            append_bundle_entry(&mut builder, name, &raster(i as u16 + 1)).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn memory_archive_lists_bands_in_insertion_order() {
        let a = MemoryArchive::new("asset")
            .with_band("classification_1990", raster(1))
            .with_band("classification_1985", raster(2));
        assert_eq!(a.band_names("asset").unwrap(), ["classification_1990", "classification_1985"]);
        assert_eq!(a.read_band("asset", "classification_1985").unwrap().get(0, 0), 2);
    }

    #[test]
    fn unknown_asset_or_band_is_a_remote_error() {
        let a = MemoryArchive::new("asset").with_band("b_2000", raster(1));
        assert!(matches!(a.band_names("other"), Err(Error::RemoteService(_))));
        assert!(matches!(a.read_band("asset", "b_2001"), Err(Error::RemoteService(_))));
    }

    #[test]
    fn tar_bundle_bands_are_sorted_by_name() {
        let bytes = bundle(&["classification_2022", "classification_1985"]);
        let a = MemoryArchive::from_bundle_bytes("asset", &bytes).unwrap();
        assert_eq!(a.band_names("asset").unwrap(), ["classification_1985", "classification_2022"]);
        // 2022 was written first with fill 1.
        assert_eq!(a.read_band("asset", "classification_2022").unwrap().get(1, 2), 1);
    }

    #[test]
    fn gzipped_bundle_is_detected() {
        let tar_bytes = bundle(&["classification_2000"]);
        let mut gz = GzEncoder::new(Vec::new(), Compression::fast());
        io::Write::write_all(&mut gz, &tar_bytes).unwrap();
        let bytes = gz.finish().unwrap();

        let a = MemoryArchive::from_bundle_bytes("asset", &bytes).unwrap();
        let r = a.read_band("asset", "classification_2000").unwrap();
        assert_eq!((r.width, r.height), (3, 2));
        assert!((r.min_lon + 50.0).abs() < 1e-9);
    }

    #[test]
    fn empty_bundle_is_rejected() {
        let bytes = tar::Builder::new(Vec::new()).into_inner().unwrap();
        assert!(MemoryArchive::from_bundle_bytes("asset", &bytes).is_err());
    }

    #[test]
    fn directory_archive_reads_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = fs::File::create(dir.path().join("y1990.tif")).unwrap();
        crate::export::write_geotiff(&mut file, &raster(9), BUNDLE_TIFF).unwrap();
        let catalog = Catalog {
            asset: "asset".into(),
            bands: vec![CatalogBand { name: "classification_1990".into(), path: "y1990.tif".into() }],
        };
        fs::write(dir.path().join("catalog.json"), serde_json::to_string(&catalog).unwrap()).unwrap();

        let a = open_archive(dir.path(), "asset").unwrap();
        assert_eq!(a.band_names("asset").unwrap(), ["classification_1990"]);
        assert_eq!(a.read_band("asset", "classification_1990").unwrap().get(1, 1), 9);
        assert!(a.band_names("elsewhere").is_err());
    }

    #[test]
    fn missing_catalog_is_a_remote_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(DirectoryArchive::open(dir.path()), Err(Error::RemoteService(_))));
    }
}
