use std::io::{Read, Seek};

use geo::Rect;
use serde::{Deserialize, Serialize};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tiff::ColorType;

use crate::error::{Error, Result};

/// A single-band classification raster in geographic coordinates.
/// Row 0 is the northern edge, matching TIFF storage order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRaster {
    /// Row-major class codes.
    pub data: Vec<u16>,
    pub width: usize,
    pub height: usize,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

/// Half-open pixel window `[row0, row1) × [col0, col1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub row0: usize,
    pub row1: usize,
    pub col0: usize,
    pub col1: usize,
}

impl Window {
    pub fn rows(&self) -> usize {
        self.row1 - self.row0
    }

    pub fn cols(&self) -> usize {
        self.col1 - self.col0
    }
}

impl ClassRaster {
    /// Create a raster filled with the given class.
    pub fn new(width: usize, height: usize, min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64, fill: u16) -> Self {
        Self {
            data: vec![fill; width * height],
            width,
            height,
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u16 {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: u16) {
        self.data[row * self.width + col] = val;
    }

    /// Pixel edge lengths (degrees of longitude, degrees of latitude).
    pub fn pixel_size(&self) -> (f64, f64) {
        (
            (self.max_lon - self.min_lon) / self.width as f64,
            (self.max_lat - self.min_lat) / self.height as f64,
        )
    }

    /// Geographic centre (lon, lat) of a pixel.
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let (dx, dy) = self.pixel_size();
        (
            self.min_lon + (col as f64 + 0.5) * dx,
            self.max_lat - (row as f64 + 0.5) * dy,
        )
    }

    /// Pixel containing (lon, lat), or None outside the raster.
    pub fn cell_of(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        if lon < self.min_lon || lon >= self.max_lon || lat <= self.min_lat || lat > self.max_lat {
            return None;
        }
        let (dx, dy) = self.pixel_size();
        let col = ((lon - self.min_lon) / dx).floor() as usize;
        let row = ((self.max_lat - lat) / dy).floor() as usize;
        Some((row.min(self.height - 1), col.min(self.width - 1)))
    }

    pub fn bounds(&self) -> Rect<f64> {
        Rect::new((self.min_lon, self.min_lat), (self.max_lon, self.max_lat))
    }

    /// Smallest window covering every pixel whose centre may fall inside `rect`.
    /// None when the rectangle misses the raster.
    pub fn window(&self, rect: &Rect<f64>) -> Option<Window> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let (dx, dy) = self.pixel_size();
        let min = rect.min();
        let max = rect.max();
        if max.x < self.min_lon || min.x > self.max_lon || max.y < self.min_lat || min.y > self.max_lat {
            return None;
        }

        let col0 = ((min.x - self.min_lon) / dx - 0.5).ceil().max(0.0) as usize;
        let col1 = (((max.x - self.min_lon) / dx - 0.5).floor() + 1.0).max(0.0) as usize;
        let row0 = ((self.max_lat - max.y) / dy - 0.5).ceil().max(0.0) as usize;
        let row1 = (((self.max_lat - min.y) / dy - 0.5).floor() + 1.0).max(0.0) as usize;

        let window = Window {
            row0: row0.min(self.height),
            row1: row1.min(self.height),
            col0: col0.min(self.width),
            col1: col1.min(self.width),
        };
        (window.row0 < window.row1 && window.col0 < window.col1).then_some(window)
    }

    pub fn full_window(&self) -> Window {
        Window { row0: 0, row1: self.height, col0: 0, col1: self.width }
    }

    pub fn max_class(&self) -> u16 {
        self.data.iter().copied().max().unwrap_or(0)
    }

    /// Decode a single-band U8/U16 GeoTIFF. Georeferencing comes from the
    /// ModelPixelScale and ModelTiepoint tags; the ImageDescription tag, when
    /// present, is returned alongside.
    pub fn read_tiff<R: Read + Seek>(reader: R) -> Result<(Self, Option<String>)> {
        let mut decoder = Decoder::new(reader)?;
        match decoder.colortype()? {
            ColorType::Gray(8) | ColorType::Gray(16) => {}
            other => return Err(Error::remote(format!("expected a single-band raster, found {other:?}"))),
        }
        let (width, height) = decoder.dimensions()?;
        let (width, height) = (width as usize, height as usize);

        let scale = decoder
            .find_tag(Tag::ModelPixelScaleTag)?
            .map(|v| v.into_f64_vec())
            .transpose()?
            .filter(|s| s.len() >= 2)
            .ok_or_else(|| Error::remote("raster has no ModelPixelScale tag"))?;
        let tie = decoder
            .find_tag(Tag::ModelTiepointTag)?
            .map(|v| v.into_f64_vec())
            .transpose()?
            .filter(|t| t.len() >= 6)
            .ok_or_else(|| Error::remote("raster has no ModelTiepoint tag"))?;
        let description = decoder
            .find_tag(Tag::ImageDescription)?
            .map(|v| v.into_string())
            .transpose()?;

        // Tie point maps raster (i, j) to model (x, y).
        let min_lon = tie[3] - tie[0] * scale[0];
        let max_lat = tie[4] + tie[1] * scale[1];

        let data = match decoder.read_image()? {
            DecodingResult::U8(v) => v.into_iter().map(u16::from).collect(),
            DecodingResult::U16(v) => v,
            _ => return Err(Error::remote("unsupported pixel type (expected U8 or U16)")),
        };
        if data.len() != width * height {
            return Err(Error::remote(format!(
                "raster holds {} samples, expected {}x{}",
                data.len(),
                width,
                height
            )));
        }

        let raster = Self {
            data,
            width,
            height,
            min_lon,
            max_lon: min_lon + width as f64 * scale[0],
            min_lat: max_lat - height as f64 * scale[1],
            max_lat,
        };
        Ok((raster, description))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid() -> ClassRaster {
        // 4x4 pixels of 1 degree covering lon 0..4, lat 0..4.
        ClassRaster::new(4, 4, 0.0, 4.0, 0.0, 4.0, 0)
    }

    #[test]
    fn pixel_center_counts_rows_from_the_north() {
        let r = grid();
        let (lon, lat) = r.pixel_center(0, 0);
        assert_relative_eq!(lon, 0.5);
        assert_relative_eq!(lat, 3.5);
        let (lon, lat) = r.pixel_center(3, 2);
        assert_relative_eq!(lon, 2.5);
        assert_relative_eq!(lat, 0.5);
    }

    #[test]
    fn empty_raster_has_no_cells() {
        let r = ClassRaster::new(0, 0, 0.0, 1.0, 0.0, 1.0, 3);
        assert_eq!(r.cell_of(0.5, 0.5), None);
        let r = ClassRaster::new(3, 0, 0.0, 1.0, 0.0, 1.0, 3);
        assert_eq!(r.cell_of(0.5, 0.5), None);
    }

    #[test]
    fn cell_of_inverts_pixel_center() {
        let r = grid();
        for row in 0..4 {
            for col in 0..4 {
                let (lon, lat) = r.pixel_center(row, col);
                assert_eq!(r.cell_of(lon, lat), Some((row, col)));
            }
        }
        assert_eq!(r.cell_of(-0.1, 1.0), None);
        assert_eq!(r.cell_of(1.0, 4.5), None);
    }

    #[test]
    fn window_keeps_only_pixels_with_centres_inside() {
        let r = grid();
        let w = r.window(&Rect::new((0.6, 0.6), (2.4, 2.4))).unwrap();
        // Only centre 1.5 lies in 0.6..2.4 on either axis.
        assert_eq!((w.col0, w.col1), (1, 2));
        assert_eq!((w.row0, w.row1), (2, 3));

        let w = r.window(&Rect::new((-10.0, -10.0), (10.0, 10.0))).unwrap();
        assert_eq!(w, r.full_window());
        assert_eq!((w.rows(), w.cols()), (4, 4));
    }

    #[test]
    fn window_outside_raster_is_none() {
        let r = grid();
        assert!(r.window(&Rect::new((10.0, 10.0), (11.0, 11.0))).is_none());
        // Rectangle between two pixel centres selects nothing.
        assert!(r.window(&Rect::new((0.6, 0.6), (0.9, 0.9))).is_none());
    }
}
