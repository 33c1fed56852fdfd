//! Session orchestrator: the collection and its index are built once at
//! session start; every interaction re-derives selections, clips and tables
//! from them.
//!
//! Per-interaction order:
//!   1. Resolve years (empty selection → most recent year)
//!   2. Year filter
//!   3. Clip to the boundary, when one was uploaded
//!   4. Zonal areas per year, in selection order (boundary only)
//!   5. Chart data from the area table

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::archive::Archive;
use crate::boundary::RegionBoundary;
use crate::chart::{latest_year_pie, stacked_area, AreaSeries, PieChart};
use crate::collection::{Collection, CollectionIndex, YearSelection};
use crate::error::{Error, Result};
use crate::export::{export_file_name, ExportSummary, Exporter};
use crate::image::ImageHandle;
use crate::legend::Legend;
use crate::render::{render_quicklook, Quicklook};
use crate::settings::Settings;
use crate::table::AreaTable;
use crate::zonal::ZonalAggregator;

/// One map layer the dashboard should draw.
#[derive(Debug, Clone, Serialize)]
pub struct MapLayer {
    pub year: String,
    pub band: String,
    pub name: String,
    pub clipped: bool,
}

/// Everything the presentation layer needs for one render cycle.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub years: Vec<String>,
    pub layers: Vec<MapLayer>,
    /// Map centre (lon, lat) when a boundary is present.
    pub center: Option<(f64, f64)>,
    pub table: Option<AreaTable>,
    pub stacked: Vec<AreaSeries>,
    pub pie: Option<PieChart>,
}

pub struct Session<A: Archive> {
    archive: A,
    settings: Settings,
    legend: Legend,
    collection: Collection,
    index: CollectionIndex,
}

impl<A: Archive> Session<A> {
    /// Load and tag the collection. Archive failures surface unchanged.
    pub fn open(archive: A, settings: Settings) -> Result<Self> {
        Self::with_legend(archive, settings, Legend::default())
    }

    pub fn with_legend(archive: A, settings: Settings, legend: Legend) -> Result<Self> {
        let collection = Collection::load(&archive, &settings.asset)?;
        let index = collection.index();
        log::info!(
            "session ready: {} years, latest {}",
            collection.len(),
            index.latest_year().unwrap_or("-")
        );
        Ok(Self { archive, settings, legend, collection, index })
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn legend(&self) -> &Legend {
        &self.legend
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn index(&self) -> &CollectionIndex {
        &self.index
    }

    /// The selection itself, or the most recent year when it is empty.
    pub fn effective_years(&self, selection: &YearSelection) -> YearSelection {
        if !selection.is_empty() {
            return selection.clone();
        }
        self.index.latest_year().map(|y| YearSelection::new([y])).unwrap_or_default()
    }

    /// Selected images (effective years), clipped when a boundary is given.
    /// Ordered as the user selected them; unknown years are dropped.
    pub fn select(&self, selection: &YearSelection, boundary: Option<&Arc<RegionBoundary>>) -> Vec<ImageHandle> {
        let years = self.effective_years(selection);
        let mut filtered = self.collection.filter_years(&years);
        if let Some(region) = boundary {
            filtered = filtered.clip(region);
        }
        years
            .iter()
            .filter_map(|y| filtered.by_year(y).cloned())
            .collect()
    }

    /// Area per class per selected year. `None` without a boundary; fails on
    /// the first year whose aggregation fails.
    pub fn area_table(
        &self,
        selection: &YearSelection,
        boundary: Option<&Arc<RegionBoundary>>,
    ) -> Result<Option<AreaTable>> {
        let Some(region) = boundary else {
            log::debug!("no boundary uploaded; skipping zonal statistics");
            return Ok(None);
        };
        let aggregator = ZonalAggregator::new(&self.archive, &self.legend, &self.settings);
        let mut table = AreaTable::new();
        for image in self.select(selection, Some(region)) {
            let records = aggregator.areas(&image, region)?;
            log::info!("{}: {} classes", image.band_id(), records.len());
            table.extend(records);
        }
        Ok(Some(table))
    }

    /// Layers, table and chart data for one render cycle.
    pub fn dashboard(
        &self,
        selection: &YearSelection,
        boundary: Option<&Arc<RegionBoundary>>,
    ) -> Result<DashboardView> {
        let images = self.select(selection, boundary);
        let layers = images
            .iter()
            .filter_map(|img| {
                let tag = img.tag()?;
                Some(MapLayer {
                    year: tag.year.clone(),
                    band: tag.band.clone(),
                    name: format!("Mapas de uso {}", tag.year),
                    clipped: img.is_clipped(),
                })
            })
            .collect();

        let table = self.area_table(selection, boundary)?;
        let (stacked, pie) = match &table {
            Some(t) => (stacked_area(t, &self.legend), latest_year_pie(t, &self.legend)),
            None => (Vec::new(), None),
        };

        Ok(DashboardView {
            years: self.index.years().into_iter().map(str::to_string).collect(),
            layers,
            center: boundary.map(|b| b.center()),
            table,
            stacked,
            pie,
        })
    }

    /// Palette rendering of one year's image, clipped when a boundary is given.
    pub fn quicklook(&self, year: &str, boundary: Option<&Arc<RegionBoundary>>) -> Result<Quicklook> {
        let image = self
            .select(&YearSelection::new([year]), boundary)
            .into_iter()
            .next()
            .ok_or_else(|| Error::malformed(format!("year {year} is not in the collection")))?;
        let raster = self.archive.read_band(&self.settings.asset, image.band_id())?;
        render_quicklook(&raster, &image, &self.legend, self.settings.nodata)
            .ok_or_else(|| Error::malformed(format!("the boundary does not overlap the {year} image")))
    }

    /// Export every selected year to `out_dir/image_<year>.tif`. A boundary
    /// is required; years are exported in selection order and the first
    /// failure stops the loop.
    pub fn export_selection(
        &self,
        selection: &YearSelection,
        boundary: Option<&Arc<RegionBoundary>>,
        out_dir: &Path,
    ) -> Result<Vec<ExportSummary>> {
        let Some(region) = boundary else {
            return Err(Error::malformed(
                "upload a boundary to define the region of interest before exporting",
            ));
        };
        let exporter = Exporter::new(&self.archive, &self.settings);
        let mut written = Vec::new();
        for image in self.select(selection, Some(region)) {
            let year = image.year().unwrap_or(image.band_id());
            let path: PathBuf = out_dir.join(export_file_name(year));
            written.push(exporter.export(&image, &path)?);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchive;
    use crate::export::read_export;
    use crate::raster::ClassRaster;
    use crate::settings::METERS_PER_DEGREE;
    use approx::assert_relative_eq;

    /// 4x4 one-degree rasters over lon 0..4, lat 0..4; the west half holds
    /// `west`, the east half `east`.
    fn raster(west: u16, east: u16) -> ClassRaster {
        let mut r = ClassRaster::new(4, 4, 0.0, 4.0, 0.0, 4.0, west);
        for row in 0..4 {
            r.set(row, 2, east);
            r.set(row, 3, east);
        }
        r
    }

    /// Half-degree sampling and export cells keep the grids small.
    fn session() -> Session<MemoryArchive> {
        let settings = Settings {
            asset: "asset".into(),
            scale_m: 0.5 * METERS_PER_DEGREE,
            ..Settings::default()
        };
        let archive = MemoryArchive::new("asset")
            .with_band("classification_1985", raster(3, 3))
            .with_band("classification_1990", raster(3, 15))
            .with_band("classification_2000", raster(15, 15))
            .with_band("classification_2022", raster(24, 33));
        Session::open(archive, settings).unwrap()
    }

    /// The western two columns.
    fn west_half() -> Arc<RegionBoundary> {
        Arc::new(
            RegionBoundary::from_geojson_str(
                r#"{"features":[{"type":"Feature","properties":{},"geometry":{"type":"Polygon",
                "coordinates":[[[0,0],[2,0],[2,4],[0,4],[0,0]]]}}]}"#,
            )
            .unwrap(),
        )
    }

    #[test]
    fn open_builds_index_once() {
        let s = session();
        assert_eq!(s.index().years(), ["1985", "1990", "2000", "2022"]);
        assert_eq!(s.collection().len(), 4);
    }

    #[test]
    fn open_surfaces_archive_failures() {
        let settings = Settings { asset: "elsewhere".into(), ..Settings::default() };
        let err = Session::open(MemoryArchive::new("asset"), settings).err().unwrap();
        assert!(matches!(err, Error::RemoteService(_)));
    }

    #[test]
    fn no_boundary_no_years_defaults_to_latest_without_statistics() {
        let s = session();
        let none = YearSelection::default();
        assert_eq!(s.effective_years(&none).iter().collect::<Vec<_>>(), ["2022"]);
        assert!(s.area_table(&none, None).unwrap().is_none());

        let view = s.dashboard(&none, None).unwrap();
        assert_eq!(view.layers.len(), 1);
        assert_eq!(view.layers[0].name, "Mapas de uso 2022");
        assert!(!view.layers[0].clipped);
        assert!(view.table.is_none() && view.pie.is_none() && view.center.is_none());
    }

    #[test]
    fn boundary_and_two_years_yield_rows_for_those_years_only() {
        let s = session();
        let region = west_half();
        let sel = YearSelection::new(["1990", "2022"]);
        let table = s.area_table(&sel, Some(&region)).unwrap().unwrap();

        assert_eq!(table.years(), [1990, 2022]);
        // West half only: 1990 is all class 3, 2022 all class 24.
        let classes: Vec<(i32, u16)> = table.records().iter().map(|r| (r.ano, r.classe)).collect();
        assert_eq!(classes, [(1990, 3), (2022, 24)]);
        // Ground area of lon 0..2, lat 0..4 on the sphere of the degree metric.
        let r2_ha = METERS_PER_DEGREE.powi(2) * 180.0 / std::f64::consts::PI / 1e4;
        let ground_ha = r2_ha * 2.0 * 4.0_f64.to_radians().sin();
        for rec in table.records() {
            assert_relative_eq!(rec.area_ha, ground_ha, max_relative = 1e-3);
        }
    }

    #[test]
    fn selection_order_drives_the_loop_and_unknown_years_are_ignored() {
        let s = session();
        let sel = YearSelection::new(["2022", "1777", "1985"]);
        let years: Vec<String> = s
            .select(&sel, None)
            .iter()
            .map(|i| i.year().unwrap().to_string())
            .collect();
        assert_eq!(years, ["2022", "1985"]);
    }

    #[test]
    fn dashboard_with_boundary_fills_charts() {
        let s = session();
        let region = west_half();
        let view = s.dashboard(&YearSelection::new(["1985", "2000"]), Some(&region)).unwrap();
        assert!(view.layers.iter().all(|l| l.clipped));
        let pie = view.pie.unwrap();
        assert_eq!(pie.ano, 2000);
        assert_eq!(pie.slices[0].nome_classe, "Pastagem");
        assert_eq!(pie.slices[0].percent, 100.0);
        assert_eq!(view.stacked.len(), 2);
        let (lon, lat) = view.center.unwrap();
        assert!((lon - 1.0).abs() < 1e-9 && (lat - 2.0).abs() < 1e-9);
    }

    #[test]
    fn export_requires_a_boundary() {
        let s = session();
        let dir = tempfile::tempdir().unwrap();
        let err = s.export_selection(&YearSelection::new(["1990"]), None, dir.path()).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }

    #[test]
    fn export_writes_one_file_per_selected_year() {
        let s = session();
        let dir = tempfile::tempdir().unwrap();
        let region = west_half();
        let sel = YearSelection::new(["2022", "1990"]);
        let written = s.export_selection(&sel, Some(&region), dir.path()).unwrap();

        assert_eq!(written.len(), 2);
        assert_eq!(written[0].path, dir.path().join("image_2022.tif"));
        let back = read_export(&dir.path().join("image_1990.tif")).unwrap();
        assert_eq!(back.tag.unwrap().year, "1990");
        assert!(back.raster.data.iter().all(|&c| c == 3 || c == 0));
    }

    #[test]
    fn quicklook_of_missing_year_fails() {
        let s = session();
        assert!(s.quicklook("1999", None).is_err());
        let q = s.quicklook("2000", Some(&west_half())).unwrap();
        assert_eq!((q.width, q.height), (2, 4));
    }
}
