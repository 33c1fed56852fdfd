use std::sync::Arc;

use geo::Rect;
use serde::{Deserialize, Serialize};

use crate::boundary::RegionBoundary;
use crate::error::{Error, Result};

/// Metadata derived from a band identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTag {
    /// Last four characters of the band identifier, e.g. `"2022"`.
    pub year: String,
    /// The band identifier itself.
    pub band: String,
}

/// Reference to one single-band classification layer of the archive.
/// Pixels are fetched from the archive on demand; the handle only carries
/// identity, metadata and the clip regions applied so far.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    band_id: String,
    tag: Option<ImageTag>,
    regions: Vec<Arc<RegionBoundary>>,
}

impl ImageHandle {
    pub fn new(band_id: impl Into<String>) -> Self {
        Self { band_id: band_id.into(), tag: None, regions: Vec::new() }
    }

    pub fn band_id(&self) -> &str {
        &self.band_id
    }

    pub fn tag(&self) -> Option<&ImageTag> {
        self.tag.as_ref()
    }

    pub fn year(&self) -> Option<&str> {
        self.tag.as_ref().map(|t| t.year.as_str())
    }

    /// Year as an integer, for area records.
    pub fn year_number(&self) -> Result<i32> {
        let year = self
            .year()
            .ok_or_else(|| Error::precondition(format!("image {} carries no year", self.band_id)))?;
        year.parse()
            .map_err(|_| Error::precondition(format!("year {year:?} of {} is not numeric", self.band_id)))
    }

    pub fn regions(&self) -> &[Arc<RegionBoundary>] {
        &self.regions
    }

    pub fn is_clipped(&self) -> bool {
        !self.regions.is_empty()
    }

    /// Restrict the image to `region`. Metadata is copied onto the result;
    /// `self` is left untouched. Clipping twice keeps the intersection.
    pub fn clip(&self, region: Arc<RegionBoundary>) -> Self {
        let mut regions = self.regions.clone();
        regions.push(region);
        Self { regions, ..self.clone() }
    }

    /// Whether a pixel centred at (lon, lat) survives every clip.
    pub fn covers(&self, lon: f64, lat: f64) -> bool {
        self.regions.iter().all(|r| r.contains(lon, lat))
    }

    /// Intersection of the clip regions' bounding rectangles.
    /// `None` means unclipped; an empty intersection yields a degenerate rect
    /// that selects no pixels.
    pub fn clip_rect(&self) -> Option<Rect<f64>> {
        let mut it = self.regions.iter().map(|r| r.bounding_rect());
        let first = it.next()?;
        Some(it.fold(first, |acc, r| {
            let min_x = acc.min().x.max(r.min().x);
            let min_y = acc.min().y.max(r.min().y);
            let max_x = acc.max().x.min(r.max().x).max(min_x);
            let max_y = acc.max().y.min(r.max().y).max(min_y);
            Rect::new((min_x, min_y), (max_x, max_y))
        }))
    }
}

impl PartialEq for ImageHandle {
    fn eq(&self, other: &Self) -> bool {
        self.band_id == other.band_id
            && self.tag == other.tag
            && self.regions.len() == other.regions.len()
            && self.regions.iter().zip(&other.regions).all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

/// Attach `year` (last four characters of the band id) and `band` to a handle.
/// Band ids shorter than four characters violate the archive's naming.
pub fn tag_year(handle: ImageHandle) -> Result<ImageHandle> {
    let id = handle.band_id();
    let Some((start, _)) = id.char_indices().rev().nth(3) else {
        return Err(Error::precondition(format!(
            "band identifier {id:?} is shorter than four characters"
        )));
    };
    let tag = ImageTag { year: id[start..].to_string(), band: id.to_string() };
    Ok(ImageHandle { tag: Some(tag), ..handle })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Arc<RegionBoundary> {
        let doc = format!(
            r#"{{"features":[{{"type":"Feature","properties":{{}},"geometry":{{"type":"Polygon",
            "coordinates":[[[{x0},{y0}],[{x1},{y0}],[{x1},{y1}],[{x0},{y1}],[{x0},{y0}]]]}}}}]}}"#
        );
        Arc::new(RegionBoundary::from_geojson_str(&doc).unwrap())
    }

    #[test]
    fn tag_takes_last_four_characters() {
        let h = tag_year(ImageHandle::new("classification_1985")).unwrap();
        assert_eq!(h.year(), Some("1985"));
        assert_eq!(h.tag().unwrap().band, "classification_1985");
        assert_eq!(h.year_number().unwrap(), 1985);
    }

    #[test]
    fn tagging_is_idempotent() {
        for id in ["classification_2022", "b2001", "2010", "níveis_1999"] {
            let once = tag_year(ImageHandle::new(id)).unwrap();
            let twice = tag_year(once.clone()).unwrap();
            assert_eq!(once, twice);
            assert_eq!(once.year().unwrap(), &id[id.len() - 4..]);
        }
    }

    #[test]
    fn short_band_id_is_a_precondition_violation() {
        let err = tag_year(ImageHandle::new("abc")).unwrap_err();
        assert!(matches!(err, Error::PreconditionViolation(_)));
    }

    #[test]
    fn non_numeric_year_has_no_number() {
        let h = tag_year(ImageHandle::new("band_name")).unwrap();
        assert_eq!(h.year(), Some("name"));
        assert!(h.year_number().is_err());
    }

    #[test]
    fn clip_preserves_metadata_and_leaves_input_alone() {
        let source = tag_year(ImageHandle::new("classification_1990")).unwrap();
        let snapshot = source.clone();
        let clipped = source.clip(square(0.0, 0.0, 1.0, 1.0));

        assert_eq!(source, snapshot);
        assert!(!source.is_clipped());
        assert!(clipped.is_clipped());
        assert_eq!(clipped.tag(), source.tag());
        assert_eq!(clipped.band_id(), source.band_id());
    }

    #[test]
    fn repeated_clips_intersect() {
        let h = ImageHandle::new("classification_2000")
            .clip(square(0.0, 0.0, 2.0, 2.0))
            .clip(square(1.0, 1.0, 3.0, 3.0));
        assert!(h.covers(1.5, 1.5));
        assert!(!h.covers(0.5, 0.5));
        assert!(!h.covers(2.5, 2.5));
        let r = h.clip_rect().unwrap();
        assert_eq!((r.min().x, r.min().y, r.max().x, r.max().y), (1.0, 1.0, 2.0, 2.0));
    }

    #[test]
    fn unclipped_image_covers_everything() {
        let h = ImageHandle::new("classification_2000");
        assert!(h.covers(-170.0, 80.0));
        assert!(h.clip_rect().is_none());
    }
}
