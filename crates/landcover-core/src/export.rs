//! GeoTIFF export of classification images.
//!
//! Exports are resampled (nearest neighbour) onto a grid of `scale_m` metres
//! expressed in degrees of the target geographic CRS. Archive rasters are
//! assumed to share the CRS datum closely enough that no datum shift is
//! applied.

use std::fs;
use std::io::{BufReader, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tiff::encoder::{colortype, TiffEncoder, TiffValue};
use tiff::tags::Tag;

use crate::archive::Archive;
use crate::error::{Error, Result};
use crate::image::{ImageHandle, ImageTag};
use crate::raster::ClassRaster;
use crate::settings::Settings;

/// GDAL's private nodata tag.
const GDAL_NODATA_TAG: u16 = 42113;

// GeoKey ids and values (GeoTIFF 1.0).
const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const GEOG_ANGULAR_UNITS: u16 = 2054;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const ANGULAR_DEGREE: u16 = 9102;

/// `image_<year>.tif`
pub fn export_file_name(year: &str) -> String {
    format!("image_{year}.tif")
}

/// Outcome of one export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub year: Option<String>,
    pub width: usize,
    pub height: usize,
}

/// Materialises archive images as GeoTIFF files.
pub struct Exporter<'a> {
    archive: &'a dyn Archive,
    settings: &'a Settings,
}

impl<'a> Exporter<'a> {
    pub fn new(archive: &'a dyn Archive, settings: &'a Settings) -> Self {
        Self { archive, settings }
    }

    /// Write `image` to `path` at the configured scale and CRS.
    pub fn export(&self, image: &ImageHandle, path: &Path) -> Result<ExportSummary> {
        let epsg = self.settings.epsg_code().ok_or_else(|| {
            Error::precondition(format!("export CRS {} is not an EPSG code", self.settings.crs))
        })?;
        let source = self.archive.read_band(&self.settings.asset, image.band_id())?;
        let target = resample(&source, image, self.settings.scale_deg(), self.settings.nodata)?;

        let description = image.tag().map(serde_json::to_string).transpose().map_err(|e| {
            Error::remote(format!("cannot encode metadata: {e}"))
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(path)
            .map_err(|e| Error::remote(format!("cannot create {}: {e}", path.display())))?;
        let mut writer = BufWriter::new(file);
        let options = GeoTiffOptions {
            epsg,
            nodata: self.settings.nodata,
            description: description.as_deref(),
        };
        write_geotiff(&mut writer, &target, options)?;
        writer.flush()?;

        log::info!(
            "exported {} ({}x{}) to {}",
            image.band_id(),
            target.width,
            target.height,
            path.display()
        );
        Ok(ExportSummary {
            path: path.to_path_buf(),
            year: image.year().map(str::to_string),
            width: target.width,
            height: target.height,
        })
    }
}

/// Nearest-neighbour resample of `source` onto a `scale_deg` grid covering
/// the image's clip (or the whole raster). Pixels outside the clip become
/// `nodata`.
pub fn resample(source: &ClassRaster, image: &ImageHandle, scale_deg: f64, nodata: u16) -> Result<ClassRaster> {
    if !(scale_deg > 0.0) {
        return Err(Error::precondition(format!("export scale {scale_deg} is not positive")));
    }
    let bounds = source.bounds();
    let (min_lon, min_lat, max_lon, max_lat) = match image.clip_rect() {
        Some(clip) => (
            clip.min().x.max(bounds.min().x),
            clip.min().y.max(bounds.min().y),
            clip.max().x.min(bounds.max().x),
            clip.max().y.min(bounds.max().y),
        ),
        None => (bounds.min().x, bounds.min().y, bounds.max().x, bounds.max().y),
    };
    if min_lon >= max_lon || min_lat >= max_lat {
        return Err(Error::remote(format!(
            "{} does not intersect the export region",
            image.band_id()
        )));
    }

    // Snap to whole pixels, tolerating float noise in the extent.
    let width = (((max_lon - min_lon) / scale_deg) - 1e-9).ceil().max(1.0) as usize;
    let height = (((max_lat - min_lat) / scale_deg) - 1e-9).ceil().max(1.0) as usize;
    let mut out = ClassRaster::new(
        width,
        height,
        min_lon,
        min_lon + width as f64 * scale_deg,
        max_lat - height as f64 * scale_deg,
        max_lat,
        nodata,
    );

    for row in 0..height {
        for col in 0..width {
            let (lon, lat) = out.pixel_center(row, col);
            if !image.covers(lon, lat) {
                continue;
            }
            if let Some((r, c)) = source.cell_of(lon, lat) {
                out.set(row, col, source.get(r, c));
            }
        }
    }
    Ok(out)
}

/// GeoTIFF encoding parameters besides the pixels.
#[derive(Debug, Clone, Copy)]
pub struct GeoTiffOptions<'a> {
    pub epsg: u16,
    pub nodata: u16,
    /// Stored in the ImageDescription tag.
    pub description: Option<&'a str>,
}

/// Encode `raster` as a single-band GeoTIFF in a geographic CRS.
/// Class codes that fit a byte are written as U8, otherwise U16.
pub fn write_geotiff<W: Write + Seek>(writer: W, raster: &ClassRaster, options: GeoTiffOptions) -> Result<()> {
    let mut encoder = TiffEncoder::new(writer)?;
    if raster.max_class() <= u16::from(u8::MAX) {
        let data: Vec<u8> = raster.data.iter().map(|&v| v as u8).collect();
        write_image::<_, colortype::Gray8>(&mut encoder, raster, &data, options)
    } else {
        write_image::<_, colortype::Gray16>(&mut encoder, raster, &raster.data, options)
    }
}

fn write_image<W, C>(
    encoder: &mut TiffEncoder<W>,
    raster: &ClassRaster,
    data: &[C::Inner],
    options: GeoTiffOptions,
) -> Result<()>
where
    W: Write + Seek,
    C: colortype::ColorType,
    [C::Inner]: TiffValue,
{
    let (dx, dy) = raster.pixel_size();
    let mut image = encoder.new_image::<C>(raster.width as u32, raster.height as u32)?;
    {
        let dir = image.encoder();
        dir.write_tag(Tag::ModelPixelScaleTag, &[dx, dy, 0.0][..])?;
        dir.write_tag(Tag::ModelTiepointTag, &[0.0, 0.0, 0.0, raster.min_lon, raster.max_lat, 0.0][..])?;
        let geokeys: [u16; 20] = [
            1, 1, 0, 4,
            GT_MODEL_TYPE, 0, 1, MODEL_TYPE_GEOGRAPHIC,
            GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
            GEOGRAPHIC_TYPE, 0, 1, options.epsg,
            GEOG_ANGULAR_UNITS, 0, 1, ANGULAR_DEGREE,
        ];
        dir.write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])?;
        dir.write_tag(Tag::Unknown(GDAL_NODATA_TAG), options.nodata.to_string().as_str())?;
        if let Some(text) = options.description {
            dir.write_tag(Tag::ImageDescription, text)?;
        }
    }
    image.write_data(data)?;
    Ok(())
}

/// A re-read export: pixels plus the year/band metadata embedded at write time.
#[derive(Debug, Clone)]
pub struct ExportedImage {
    pub raster: ClassRaster,
    pub tag: Option<ImageTag>,
}

pub fn read_export(path: &Path) -> Result<ExportedImage> {
    let file = fs::File::open(path)
        .map_err(|e| Error::remote(format!("cannot open {}: {e}", path.display())))?;
    let (raster, description) = ClassRaster::read_tiff(BufReader::new(file))?;
    let tag = description.and_then(|d| serde_json::from_str(&d).ok());
    Ok(ExportedImage { raster, tag })
}
