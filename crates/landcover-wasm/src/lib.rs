use std::sync::Arc;

use landcover_core::archive::MemoryArchive;
use landcover_core::boundary::RegionBoundary;
use landcover_core::collection::YearSelection;
use landcover_core::render::Quicklook;
use landcover_core::session::Session;
use landcover_core::settings::Settings;
use wasm_bindgen::prelude::*;

#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(js_err)
}

/// `undefined`, `null` or an array of year strings.
fn years_from_js(years: JsValue) -> Result<YearSelection, JsValue> {
    if years.is_undefined() || years.is_null() {
        return Ok(YearSelection::default());
    }
    let years: Vec<String> = serde_wasm_bindgen::from_value(years)
        .map_err(|e| JsValue::from_str(&format!("Invalid year list: {e}")))?;
    Ok(YearSelection::new(years))
}

/// Browser-side dashboard state: the session over an in-memory archive and
/// the currently uploaded boundary.
#[wasm_bindgen]
pub struct Dashboard {
    session: Session<MemoryArchive>,
    boundary: Option<Arc<RegionBoundary>>,
}

#[wasm_bindgen]
impl Dashboard {
    /// Open a session over a `.tar` / `.tar.gz` bundle of yearly GeoTIFF bands.
    #[wasm_bindgen(constructor)]
    pub fn new(bundle: &[u8]) -> Result<Dashboard, JsValue> {
        let settings = Settings::default();
        let archive = MemoryArchive::from_bundle_bytes(settings.asset.clone(), bundle).map_err(js_err)?;
        let session = Session::open(archive, settings).map_err(js_err)?;
        Ok(Dashboard { session, boundary: None })
    }

    /// Year picker rows: `{ rows: [{ year, band }] }`.
    pub fn index(&self) -> Result<JsValue, JsValue> {
        to_js(self.session.index())
    }

    /// Replace the boundary with an uploaded GeoJSON document. Returns the
    /// map centre as `[lon, lat]`.
    #[wasm_bindgen(js_name = uploadBoundary)]
    pub fn upload_boundary(&mut self, geojson: &str) -> Result<JsValue, JsValue> {
        let region = RegionBoundary::from_geojson_str(geojson).map_err(js_err)?;
        let center = region.center();
        log::info!("boundary uploaded: {} features", region.features().len());
        self.boundary = Some(Arc::new(region));
        to_js(&center)
    }

    #[wasm_bindgen(js_name = clearBoundary)]
    pub fn clear_boundary(&mut self) {
        self.boundary = None;
    }

    #[wasm_bindgen(js_name = hasBoundary)]
    pub fn has_boundary(&self) -> bool {
        self.boundary.is_some()
    }

    /// Layers, area table and chart data for the selected years.
    pub fn view(&self, years: JsValue) -> Result<JsValue, JsValue> {
        let selection = years_from_js(years)?;
        let view = self.session.dashboard(&selection, self.boundary.as_ref()).map_err(js_err)?;
        to_js(&view)
    }

    /// The area table as CSV, for download. Empty without a boundary.
    #[wasm_bindgen(js_name = areaCsv)]
    pub fn area_csv(&self, years: JsValue) -> Result<String, JsValue> {
        let selection = years_from_js(years)?;
        let Some(table) = self.session.area_table(&selection, self.boundary.as_ref()).map_err(js_err)? else {
            return Ok(String::new());
        };
        let mut buf = Vec::new();
        table.write_csv(&mut buf).map_err(js_err)?;
        String::from_utf8(buf).map_err(js_err)
    }

    /// Palette rendering of one year, clipped to the boundary when present.
    pub fn quicklook(&self, year: &str) -> Result<MapImage, JsValue> {
        let inner = self.session.quicklook(year, self.boundary.as_ref()).map_err(js_err)?;
        Ok(MapImage { inner })
    }
}

/// RGBA pixels of a rendered layer plus its geographic extent.
#[wasm_bindgen]
pub struct MapImage {
    inner: Quicklook,
}

#[wasm_bindgen]
impl MapImage {
    #[wasm_bindgen(getter)]
    pub fn width(&self) -> usize {
        self.inner.width
    }

    #[wasm_bindgen(getter)]
    pub fn height(&self) -> usize {
        self.inner.height
    }

    /// Row-major RGBA8, suitable for `ImageData`.
    pub fn rgba(&self) -> Vec<u8> {
        self.inner.rgba.clone()
    }

    /// `[min_lon, min_lat, max_lon, max_lat]`
    pub fn bounds(&self) -> Vec<f64> {
        vec![self.inner.min_lon, self.inner.min_lat, self.inner.max_lon, self.inner.max_lat]
    }
}
