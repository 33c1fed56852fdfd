use serde::Serialize;

use crate::legend::{Legend, PALETTE_MAX};
use crate::raster::ClassRaster;
use crate::image::ImageHandle;

/// A classification layer rendered through the legend palette.
#[derive(Debug, Clone, Serialize)]
pub struct Quicklook {
    pub width: usize,
    pub height: usize,
    /// Row-major RGBA8, row 0 north.
    #[serde(skip)]
    pub rgba: Vec<u8>,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

/// Render `raster` as seen through `image`: a clipped image renders only the
/// window under its clip regions, with pixels outside them transparent.
/// Codes map onto the palette stretched over 0..=62; `nodata` is transparent.
/// None when the clip misses the raster.
pub fn render_quicklook(raster: &ClassRaster, image: &ImageHandle, legend: &Legend, nodata: u16) -> Option<Quicklook> {
    let window = match image.clip_rect() {
        Some(rect) => raster.window(&rect)?,
        None => raster.full_window(),
    };
    let palette = legend.palette();
    let (dx, dy) = raster.pixel_size();

    let mut rgba = Vec::with_capacity(window.rows() * window.cols() * 4);
    for row in window.row0..window.row1 {
        for col in window.col0..window.col1 {
            let code = raster.get(row, col);
            let (lon, lat) = raster.pixel_center(row, col);
            if code == nodata || !image.covers(lon, lat) {
                rgba.extend_from_slice(&[0, 0, 0, 0]);
                continue;
            }
            let [r, g, b] = palette[code.min(PALETTE_MAX) as usize];
            rgba.extend_from_slice(&[r, g, b, 255]);
        }
    }

    Some(Quicklook {
        width: window.cols(),
        height: window.rows(),
        rgba,
        min_lon: raster.min_lon + window.col0 as f64 * dx,
        max_lon: raster.min_lon + window.col1 as f64 * dx,
        min_lat: raster.max_lat - window.row1 as f64 * dy,
        max_lat: raster.max_lat - window.row0 as f64 * dy,
    })
}
