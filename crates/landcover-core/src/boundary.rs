//! Region-of-interest boundaries uploaded as GeoJSON feature collections.

use std::io::Read;

use geo::{BoundingRect, Centroid, Contains, MultiPolygon, Point, Polygon, Rect};
use geojson::{Feature, JsonObject, Value as GeoValue};
use serde_json::Value;

use crate::error::{Error, Result};

/// One uploaded feature, reduced to its areal geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryFeature {
    pub geometry: MultiPolygon<f64>,
    pub properties: JsonObject,
}

/// The union of all uploaded features. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionBoundary {
    features: Vec<BoundaryFeature>,
    shape: MultiPolygon<f64>,
    bbox: Rect<f64>,
}

impl RegionBoundary {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let doc: Value = serde_json::from_reader(reader)?;
        Self::from_json(doc)
    }

    pub fn from_geojson_str(text: &str) -> Result<Self> {
        let doc: Value = serde_json::from_str(text)?;
        Self::from_json(doc)
    }

    /// Only the `features` array is read; the top-level `type` is not checked.
    pub fn from_json(doc: Value) -> Result<Self> {
        let Value::Object(mut root) = doc else {
            return Err(Error::malformed("boundary document is not a JSON object"));
        };
        let Some(features) = root.remove("features") else {
            return Err(Error::malformed("boundary document has no \"features\" key"));
        };
        let Value::Array(features) = features else {
            return Err(Error::malformed("\"features\" is not an array"));
        };
        if features.is_empty() {
            return Err(Error::malformed("boundary document has no features"));
        }

        let features = features
            .into_iter()
            .enumerate()
            .map(|(i, v)| parse_feature(i, v))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_features(features))
    }

    pub fn from_features(features: Vec<BoundaryFeature>) -> Self {
        let shape = MultiPolygon::new(
            features
                .iter()
                .flat_map(|f| f.geometry.0.iter().cloned())
                .collect(),
        );
        // Every polygon has at least four exterior points, so the rect exists.
        let bbox = shape
            .bounding_rect()
            .unwrap_or_else(|| Rect::new((0.0, 0.0), (0.0, 0.0)));
        Self { features, shape, bbox }
    }

    pub fn features(&self) -> &[BoundaryFeature] {
        &self.features
    }

    pub fn shape(&self) -> &MultiPolygon<f64> {
        &self.shape
    }

    pub fn bounding_rect(&self) -> Rect<f64> {
        self.bbox
    }

    /// Whether (lon, lat) lies strictly inside any feature.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let min = self.bbox.min();
        let max = self.bbox.max();
        if lon < min.x || lon > max.x || lat < min.y || lat > max.y {
            return false;
        }
        self.shape.contains(&Point::new(lon, lat))
    }

    /// Centroid (lon, lat) used to centre map views on the region.
    pub fn center(&self) -> (f64, f64) {
        match self.shape.centroid() {
            Some(p) => (p.x(), p.y()),
            None => {
                let c = self.bbox.center();
                (c.x, c.y)
            }
        }
    }
}

fn parse_feature(index: usize, value: Value) -> Result<BoundaryFeature> {
    let feature = Feature::from_json_value(value)
        .map_err(|e| Error::malformed(format!("feature {index}: {e}")))?;
    let Some(geometry) = feature.geometry else {
        return Err(Error::malformed(format!("feature {index} has no geometry")));
    };

    let polygons: Vec<Polygon<f64>> = match geometry.value {
        v @ GeoValue::Polygon(_) => vec![Polygon::try_from(v)?],
        v @ GeoValue::MultiPolygon(_) => MultiPolygon::try_from(v)?.0,
        other => {
            return Err(Error::malformed(format!(
                "feature {index} has a {} geometry; only Polygon and MultiPolygon bound a region",
                geometry_kind(&other)
            )))
        }
    };
    if polygons.is_empty() {
        return Err(Error::malformed(format!("feature {index} has an empty geometry")));
    }
    for poly in &polygons {
        if poly.exterior().0.len() < 4 {
            return Err(Error::malformed(format!(
                "feature {index} has a polygon ring with fewer than three vertices"
            )));
        }
        let finite = poly.exterior().coords().all(|c| c.x.is_finite() && c.y.is_finite());
        if !finite {
            return Err(Error::malformed(format!("feature {index} has non-finite coordinates")));
        }
    }

    Ok(BoundaryFeature {
        geometry: MultiPolygon::new(polygons),
        properties: feature.properties.unwrap_or_default(),
    })
}

fn geometry_kind(value: &GeoValue) -> &'static str {
    match value {
        GeoValue::Point(_) => "Point",
        GeoValue::MultiPoint(_) => "MultiPoint",
        GeoValue::LineString(_) => "LineString",
        GeoValue::MultiLineString(_) => "MultiLineString",
        GeoValue::Polygon(_) => "Polygon",
        GeoValue::MultiPolygon(_) => "MultiPolygon",
        GeoValue::GeometryCollection(_) => "GeometryCollection",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"name": "a"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
            {"type": "Feature", "properties": {"name": "b", "code": 7},
             "geometry": {"type": "MultiPolygon", "coordinates": [[[[3,3],[4,3],[4,4],[3,4],[3,3]]]]}}
        ]
    }"#;

    #[test]
    fn parses_polygons_and_multipolygons() {
        let b = RegionBoundary::from_geojson_str(SQUARES).unwrap();
        assert_eq!(b.features().len(), 2);
        assert_eq!(b.shape().0.len(), 2);
        assert_eq!(b.features()[1].properties["code"], 7);
        let r = b.bounding_rect();
        assert_eq!((r.min().x, r.min().y, r.max().x, r.max().y), (0.0, 0.0, 4.0, 4.0));
    }

    #[test]
    fn contains_tests_every_part() {
        let b = RegionBoundary::from_geojson_str(SQUARES).unwrap();
        assert!(b.contains(0.5, 0.5));
        assert!(b.contains(3.5, 3.5));
        assert!(!b.contains(2.0, 2.0));
        assert!(!b.contains(10.0, 0.5));
    }

    #[test]
    fn missing_features_key_is_malformed() {
        let err = RegionBoundary::from_geojson_str(r#"{"type":"FeatureCollection"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
        assert!(err.to_string().contains("features"));
    }

    #[test]
    fn point_geometry_is_malformed() {
        let doc = r#"{"features":[{"type":"Feature","properties":{},
            "geometry":{"type":"Point","coordinates":[1,2]}}]}"#;
        let err = RegionBoundary::from_geojson_str(doc).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }

    #[test]
    fn feature_without_geometry_is_malformed() {
        let doc = r#"{"features":[{"type":"Feature","properties":{},"geometry":null}]}"#;
        assert!(matches!(
            RegionBoundary::from_geojson_str(doc),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn empty_feature_list_is_malformed() {
        assert!(matches!(
            RegionBoundary::from_geojson_str(r#"{"features":[]}"#),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn center_of_single_square() {
        let doc = r#"{"features":[{"type":"Feature","properties":null,
            "geometry":{"type":"Polygon","coordinates":[[[0,0],[2,0],[2,2],[0,2],[0,0]]]}}]}"#;
        let b = RegionBoundary::from_geojson_str(doc).unwrap();
        let (lon, lat) = b.center();
        assert!((lon - 1.0).abs() < 1e-9 && (lat - 1.0).abs() < 1e-9);
    }
}
