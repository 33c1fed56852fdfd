use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Composite classification image queried when no other asset is named.
pub const DEFAULT_ASSET: &str =
    "projects/mapbiomas-workspace/public/collection8/mapbiomas_collection80_integration_v1";

/// Metres per degree along the equator (WGS84 / GRS80 semi-major axis).
pub const METERS_PER_DEGREE: f64 = 111_319.490_793_273_57;

/// Fixed deployment parameters. There is no configuration file: the
/// defaults below are the deployment, and tools override single fields
/// from their command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Archive asset holding one band per classification year.
    pub asset: String,
    /// Native pixel edge in metres; pixel area is `scale_m² / 1e4` hectares.
    pub scale_m: f64,
    /// Coordinate reference system of exported rasters (`EPSG:<code>`).
    pub crs: String,
    /// Upper bound on the grid samples a single aggregation may visit.
    pub max_pixels: u64,
    /// When the ceiling is exceeded, sample on a coarser grid instead of failing.
    pub best_effort: bool,
    /// Class code treated as masked (not counted, not rendered).
    pub nodata: u16,
    /// Directory receiving `image_<year>.tif` exports.
    pub out_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            asset: DEFAULT_ASSET.to_string(),
            scale_m: 30.0,
            crs: "EPSG:4674".to_string(),
            max_pixels: 10_000_000_000_000,
            best_effort: true,
            nodata: 0,
            out_dir: default_out_dir(),
        }
    }
}

impl Settings {
    /// Area of one pixel in hectares.
    pub fn pixel_area_ha(&self) -> f64 {
        self.scale_m * self.scale_m / 1e4
    }

    /// Export pixel edge in degrees of the geographic CRS.
    pub fn scale_deg(&self) -> f64 {
        self.scale_m / METERS_PER_DEGREE
    }

    /// Numeric EPSG code parsed from `crs`.
    pub fn epsg_code(&self) -> Option<u16> {
        let (authority, code) = self.crs.split_once(':')?;
        if !authority.eq_ignore_ascii_case("EPSG") {
            return None;
        }
        code.trim().parse().ok()
    }
}

fn default_out_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join("Downloads")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn thirty_metre_pixels_cover_nine_hundredths_of_a_hectare() {
        assert_relative_eq!(Settings::default().pixel_area_ha(), 0.09);
    }

    #[test]
    fn epsg_code_parses_authority_prefix() {
        let mut s = Settings::default();
        assert_eq!(s.epsg_code(), Some(4674));
        s.crs = "epsg:4326".into();
        assert_eq!(s.epsg_code(), Some(4326));
        s.crs = "+proj=longlat".into();
        assert_eq!(s.epsg_code(), None);
    }

    #[test]
    fn default_outputs_land_in_downloads() {
        assert!(Settings::default().out_dir.ends_with("Downloads"));
    }
}
