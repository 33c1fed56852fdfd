//! Land-cover region explorer: yearly classification layers of a composite
//! archive asset, clipped to an uploaded boundary and summarised as area per
//! class per year.
//!
//! Pipeline:
//!   archive → collection (tagged by year) → year filter → clip
//!           → zonal areas → area table → charts
//!           → export (GeoTIFF per year)

pub mod archive;
pub mod boundary;
pub mod chart;
pub mod collection;
pub mod error;
pub mod export;
pub mod image;
pub mod legend;
pub mod raster;
pub mod render;
pub mod session;
pub mod settings;
pub mod table;
pub mod zonal;

pub use error::{Error, Result};
