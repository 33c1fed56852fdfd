//! Zonal statistics: hectares per class inside a region.
//!
//! Areas are measured on a sampling grid of `scale_m` metres (expressed in
//! degrees, like exports) laid over the zone, independent of the archive
//! raster's native resolution. Each sample takes the class of the raster
//! pixel under its centre and counts only when that centre lies inside the
//! boundary and every clip applied to the image. A sample stands for
//! `scale_m² / 1e4 · cos(lat)` hectares: the true ground area of a
//! `scale_deg × scale_deg` cell at its latitude.
//!
//! Sample ceiling: when the grid holds more than `max_pixels` samples,
//! best-effort mode keeps every k-th row and column with
//! k = ⌈√(n / max_pixels)⌉ and weights each kept sample by k². With best
//! effort off the call fails instead.

use std::collections::BTreeMap;

use geo::Rect;

use crate::archive::Archive;
use crate::boundary::RegionBoundary;
use crate::error::{Error, Result};
use crate::image::ImageHandle;
use crate::legend::Legend;
use crate::raster::ClassRaster;
use crate::settings::Settings;
use crate::table::{round2, AreaRecord};

/// Hectares per class code.
pub type ClassAreas = BTreeMap<u16, f64>;

/// Samples per class code along one grid row.
type RowCounts = BTreeMap<u16, u64>;

/// Regular lon/lat grid anchored at the north-west corner of a zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleGrid {
    pub min_lon: f64,
    pub max_lat: f64,
    /// Cell edge in degrees.
    pub step: f64,
    pub rows: usize,
    pub cols: usize,
}

impl SampleGrid {
    /// Smallest grid of `step`-degree cells covering `rect`.
    pub fn covering(rect: &Rect<f64>, step: f64) -> Self {
        // Tolerate float noise in the extent before rounding up.
        let cols = ((rect.width() / step) - 1e-9).ceil().max(1.0) as usize;
        let rows = ((rect.height() / step) - 1e-9).ceil().max(1.0) as usize;
        Self { min_lon: rect.min().x, max_lat: rect.max().y, step, rows, cols }
    }

    pub fn sample_count(&self) -> u64 {
        self.rows as u64 * self.cols as u64
    }

    /// Centre (lon, lat) of a cell.
    pub fn center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.min_lon + (col as f64 + 0.5) * self.step,
            self.max_lat - (row as f64 + 0.5) * self.step,
        )
    }
}

pub struct ZonalAggregator<'a> {
    archive: &'a dyn Archive,
    legend: &'a Legend,
    settings: &'a Settings,
}

impl<'a> ZonalAggregator<'a> {
    pub fn new(archive: &'a dyn Archive, legend: &'a Legend, settings: &'a Settings) -> Self {
        Self { archive, legend, settings }
    }

    /// One row per class present inside `boundary` for the image's year,
    /// ordered by class code.
    pub fn areas(&self, image: &ImageHandle, boundary: &RegionBoundary) -> Result<Vec<AreaRecord>> {
        let year = image.year_number()?;
        let step = self.settings.scale_deg();
        if !(step.is_finite() && step > 0.0) {
            return Err(Error::precondition(format!(
                "aggregation scale {} m is not positive",
                self.settings.scale_m
            )));
        }
        let raster = self.archive.read_band(&self.settings.asset, image.band_id())?;
        check_georeferencing(&raster, image)?;

        let areas = match zone_rect(&raster, image, boundary) {
            Some(rect) => {
                let grid = SampleGrid::covering(&rect, step);
                let stride = sampling_stride(grid.sample_count(), self.settings.max_pixels, self.settings.best_effort)?;
                if stride > 1 {
                    log::info!(
                        "{}: {} samples exceed the ceiling of {}; keeping every {stride}th row and column",
                        image.band_id(),
                        grid.sample_count(),
                        self.settings.max_pixels
                    );
                }
                sum_class_areas(
                    &raster,
                    &grid,
                    stride,
                    self.settings.nodata,
                    self.settings.pixel_area_ha(),
                    |lon, lat| boundary.contains(lon, lat) && image.covers(lon, lat),
                )
            }
            None => ClassAreas::new(),
        };

        let records: Vec<AreaRecord> = areas
            .into_iter()
            .map(|(classe, area)| AreaRecord {
                ano: year,
                classe,
                nome_classe: self.legend.label(classe).map(str::to_string),
                area_ha: round2(area),
            })
            .collect();
        log::debug!("{}: {} classes inside the region", image.band_id(), records.len());
        Ok(records)
    }
}

/// A raster whose pixels have no positive extent cannot be sampled.
fn check_georeferencing(raster: &ClassRaster, image: &ImageHandle) -> Result<()> {
    let (dx, dy) = raster.pixel_size();
    if raster.width == 0 || raster.height == 0 || !(dx.is_finite() && dx > 0.0 && dy.is_finite() && dy > 0.0) {
        return Err(Error::remote(format!(
            "{} has no usable georeferencing ({}x{} pixels of {dx}x{dy} degrees)",
            image.band_id(),
            raster.width,
            raster.height
        )));
    }
    Ok(())
}

/// Extent shared by the raster, the boundary and the image's clips.
fn zone_rect(raster: &ClassRaster, image: &ImageHandle, boundary: &RegionBoundary) -> Option<Rect<f64>> {
    let mut rects = vec![raster.bounds(), boundary.bounding_rect()];
    rects.extend(image.clip_rect());
    let min_x = rects.iter().map(|r| r.min().x).fold(f64::NEG_INFINITY, f64::max);
    let min_y = rects.iter().map(|r| r.min().y).fold(f64::NEG_INFINITY, f64::max);
    let max_x = rects.iter().map(|r| r.max().x).fold(f64::INFINITY, f64::min);
    let max_y = rects.iter().map(|r| r.max().y).fold(f64::INFINITY, f64::min);
    (min_x < max_x && min_y < max_y).then(|| Rect::new((min_x, min_y), (max_x, max_y)))
}

/// Sampling step honouring the sample ceiling.
pub fn sampling_stride(samples: u64, max_samples: u64, best_effort: bool) -> Result<u64> {
    if samples <= max_samples {
        return Ok(1);
    }
    if !best_effort || max_samples == 0 {
        return Err(Error::remote(format!(
            "region covers {samples} samples, more than the maximum of {max_samples}"
        )));
    }
    let ratio = samples as f64 / max_samples as f64;
    let mut k = ratio.sqrt().ceil() as u64;
    // Float rounding can leave the sample count above the ceiling.
    while samples.div_ceil(k * k) > max_samples {
        k += 1;
    }
    Ok(k.max(1))
}

/// Hectares per class over every `stride`-th row and column of `grid`.
/// Samples whose centre fails `inside`, falls off the raster or hits
/// `nodata` are skipped. `cell_ha` is the area of an equatorial cell.
pub fn sum_class_areas<F>(
    raster: &ClassRaster,
    grid: &SampleGrid,
    stride: u64,
    nodata: u16,
    cell_ha: f64,
    inside: F,
) -> ClassAreas
where
    F: Fn(f64, f64) -> bool + Sync,
{
    let step = stride.max(1) as usize;
    let weight = cell_ha * (step * step) as f64;
    let rows: Vec<usize> = (0..grid.rows).step_by(step).collect();

    let row_areas = |row: usize| {
        let mut counts = RowCounts::new();
        for col in (0..grid.cols).step_by(step) {
            let (lon, lat) = grid.center(row, col);
            if !inside(lon, lat) {
                continue;
            }
            let Some((r, c)) = raster.cell_of(lon, lat) else {
                continue;
            };
            let code = raster.get(r, c);
            if code != nodata {
                *counts.entry(code).or_insert(0) += 1;
            }
        }
        let (_, lat) = grid.center(row, 0);
        let sample_ha = weight * lat.to_radians().cos();
        counts
            .into_iter()
            .map(|(code, n)| (code, n as f64 * sample_ha))
            .collect::<ClassAreas>()
    };

    #[cfg(feature = "threading")]
    {
        use rayon::prelude::*;
        rows.par_iter()
            .map(|&row| row_areas(row))
            .reduce(ClassAreas::new, merge_areas)
    }
    #[cfg(not(feature = "threading"))]
    {
        rows.iter().map(|&row| row_areas(row)).fold(ClassAreas::new(), merge_areas)
    }
}

fn merge_areas(mut a: ClassAreas, b: ClassAreas) -> ClassAreas {
    for (code, ha) in b {
        *a.entry(code).or_insert(0.0) += ha;
    }
    a
}
