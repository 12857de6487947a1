//! Minimal GeoJSON feature model.
//!
//! Only the parts the pipeline reads are modelled: polygonal geometries
//! and a free-form property map. Other geometry types deserialize to
//! [`GeoJsonGeometry::Other`] and are skipped.

use geo::{Coord, LineString, Polygon};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Feature {
    pub geometry: Option<GeoJsonGeometry>,
    #[serde(default)]
    pub properties: Option<serde_json::Map<String, serde_json::Value>>,
}

type Ring = Vec<Vec<f64>>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub(crate) enum GeoJsonGeometry {
    Polygon { coordinates: Vec<Ring> },
    MultiPolygon { coordinates: Vec<Vec<Ring>> },
    #[serde(other)]
    Other,
}

impl Feature {
    /// String value of property `key`, if present.
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.as_ref()?.get(key)?.as_str()
    }

    /// Every polygon of the feature geometry.
    pub fn polygons(&self) -> Vec<Polygon<f64>> {
        match &self.geometry {
            Some(GeoJsonGeometry::Polygon { coordinates }) => {
                to_polygon(coordinates).into_iter().collect()
            }
            Some(GeoJsonGeometry::MultiPolygon { coordinates }) => {
                coordinates.iter().filter_map(|p| to_polygon(p)).collect()
            }
            Some(GeoJsonGeometry::Other) | None => Vec::new(),
        }
    }
}

fn to_ring(ring: &Ring) -> LineString<f64> {
    ring.iter()
        .filter(|c| c.len() >= 2)
        .map(|c| Coord { x: c[0], y: c[1] })
        .collect::<Vec<_>>()
        .into()
}

fn to_polygon(rings: &[Ring]) -> Option<Polygon<f64>> {
    let (exterior, interiors) = rings.split_first()?;
    let exterior = to_ring(exterior);
    if exterior.0.len() < 3 {
        return None;
    }
    Some(Polygon::new(
        exterior,
        interiors.iter().map(to_ring).collect(),
    ))
}
