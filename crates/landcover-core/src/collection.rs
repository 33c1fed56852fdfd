//! Tagged yearly image collection, its index, and year selection.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::archive::Archive;
use crate::boundary::RegionBoundary;
use crate::error::{Error, Result};
use crate::image::{tag_year, ImageHandle};

/// Years chosen by the user, in the order they were chosen. Duplicates are
/// dropped on insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct YearSelection(Vec<String>);

impl YearSelection {
    pub fn new<I, S>(years: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut sel = Self::default();
        for y in years {
            sel.push(y);
        }
        sel
    }

    pub fn push(&mut self, year: impl Into<String>) {
        let year = year.into();
        if !self.0.contains(&year) {
            self.0.push(year);
        }
    }

    pub fn contains(&self, year: &str) -> bool {
        self.0.iter().any(|y| y == year)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for YearSelection {
    fn from(v: Vec<String>) -> Self {
        Self::new(v)
    }
}

impl From<YearSelection> for Vec<String> {
    fn from(s: YearSelection) -> Self {
        s.0
    }
}

/// One row of the year picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRow {
    pub year: String,
    pub band: String,
}

/// (year, band) rows in collection order, unsorted and unfiltered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionIndex {
    rows: Vec<IndexRow>,
}

impl CollectionIndex {
    pub fn rows(&self) -> &[IndexRow] {
        &self.rows
    }

    pub fn years(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.year.as_str()).collect()
    }

    /// Most recent year available. Years are fixed-width digits, so string
    /// order is chronological.
    pub fn latest_year(&self) -> Option<&str> {
        self.rows.iter().map(|r| r.year.as_str()).max()
    }
}

/// Ordered tagged images, one per year.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    images: Vec<ImageHandle>,
}

impl Collection {
    /// Query the archive for the bands of `asset` and tag one handle per band.
    pub fn load(archive: &dyn Archive, asset: &str) -> Result<Self> {
        let bands = archive.band_names(asset)?;
        log::info!("{asset}: {} bands", bands.len());
        let images = bands
            .into_iter()
            .map(|band| tag_year(ImageHandle::new(band)))
            .collect::<Result<Vec<_>>>()?;
        Self::from_images(images)
    }

    /// Build from tagged handles; untagged handles, years that are not four
    /// digits and repeated years are rejected.
    pub fn from_images(images: Vec<ImageHandle>) -> Result<Self> {
        let mut seen = HashSet::new();
        for image in &images {
            let year = image.year().ok_or_else(|| {
                Error::precondition(format!("image {} is not tagged with a year", image.band_id()))
            })?;
            if !(year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit())) {
                return Err(Error::precondition(format!(
                    "band {} does not end in a four-digit year",
                    image.band_id()
                )));
            }
            if !seen.insert(year) {
                return Err(Error::precondition(format!("year {year} appears more than once")));
            }
        }
        Ok(Self { images })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageHandle> {
        self.images.iter()
    }

    pub fn images(&self) -> &[ImageHandle] {
        &self.images
    }

    pub fn index(&self) -> CollectionIndex {
        let rows = self
            .images
            .iter()
            .filter_map(|img| img.tag())
            .map(|tag| IndexRow { year: tag.year.clone(), band: tag.band.clone() })
            .collect();
        CollectionIndex { rows }
    }

    /// Images whose year is in `selection`, in collection order. Years the
    /// collection lacks are ignored.
    pub fn filter_years(&self, selection: &YearSelection) -> Collection {
        let images = self
            .images
            .iter()
            .filter(|img| img.year().is_some_and(|y| selection.contains(y)))
            .cloned()
            .collect();
        Collection { images }
    }

    pub fn by_year(&self, year: &str) -> Option<&ImageHandle> {
        self.images.iter().find(|img| img.year() == Some(year))
    }

    /// Clip every image to `region`.
    pub fn clip(&self, region: &Arc<RegionBoundary>) -> Collection {
        let images = self.images.iter().map(|img| img.clip(Arc::clone(region))).collect();
        Collection { images }
    }
}
