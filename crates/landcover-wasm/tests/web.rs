#![cfg(target_arch = "wasm32")]

use landcover_core::archive::append_bundle_entry;
use landcover_core::raster::ClassRaster;
use landcover_wasm::Dashboard;
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

const SQUARE: &str = r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{},
"geometry":{"type":"Polygon","coordinates":[[[0,0],[0.02,0],[0.02,0.02],[0,0.02],[0,0]]]}}]}"#;

fn bundle() -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (band, class) in [("classification_1985", 3), ("classification_2022", 15)] {
        let raster = ClassRaster::new(2, 2, 0.0, 0.02, 0.0, 0.02, class);
        append_bundle_entry(&mut builder, band, &raster).unwrap();
    }
    builder.into_inner().unwrap()
}

#[wasm_bindgen_test]
fn csv_is_empty_until_a_boundary_is_uploaded() {
    let mut dash = Dashboard::new(&bundle()).unwrap();
    assert!(dash.area_csv(JsValue::UNDEFINED).unwrap().is_empty());

    dash.upload_boundary(SQUARE).unwrap();
    assert!(dash.has_boundary());
    let csv = dash.area_csv(JsValue::UNDEFINED).unwrap();
    assert!(csv.starts_with("ano,classe,nome_classe,Area_ha"));
    // 0.02° square at the equator, about 496 ha.
    let row = csv.lines().find(|l| l.starts_with("2022,15,Pastagem,")).unwrap();
    let area: f64 = row.rsplit(',').next().unwrap().parse().unwrap();
    assert!((area - 495.7).abs() < 5.0, "area {area}");

    dash.clear_boundary();
    assert!(!dash.has_boundary());
}

#[wasm_bindgen_test]
fn quicklook_covers_the_whole_raster_without_boundary() {
    let dash = Dashboard::new(&bundle()).unwrap();
    let img = dash.quicklook("1985").unwrap();
    assert_eq!((img.width(), img.height()), (2, 2));
    assert_eq!(img.rgba().len(), 16);
    let bounds = img.bounds();
    assert!((bounds[2] - 0.02).abs() < 1e-9 && (bounds[3] - 0.02).abs() < 1e-9);
}

#[wasm_bindgen_test]
fn malformed_boundary_is_rejected() {
    let mut dash = Dashboard::new(&bundle()).unwrap();
    assert!(dash.upload_boundary(r#"{"type":"FeatureCollection"}"#).is_err());
    assert!(!dash.has_boundary());
}
