use crate::dataset::Dataset;
use crate::model::Way;
use geo_types::{LineString, Point};
use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde_json::map::Map;
use std::fs::write;
use std::path::Path;

impl Dataset {
    /// The way as a GeoJSON feature. Single-node ways become points.
    pub fn to_feature(&self, way: &Way) -> Feature {
        let coords: Vec<(f64, f64)> = self
            .way_nodes(way)
            .map(|node| (node.lon_degrees(), node.lat_degrees()))
            .collect();
        let value = match coords.as_slice() {
            [single] => Value::from(&Point::from(*single)),
            _ => Value::from(&LineString::from(coords)),
        };

        let properties: Map<String, serde_json::Value> = self
            .tag_pairs(&way.tags)
            .map(|(key, value)| (key.to_string(), value.into()))
            .collect();

        Feature {
            bbox: None,
            geometry: Some(Geometry::new(value)),
            id: Some(Id::Number(way.id.into())),
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

pub fn to_feature_collection(dataset: &Dataset, ways: &[&Way]) -> FeatureCollection {
    let features = ways.iter().map(|way| dataset.to_feature(way)).collect();
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn write_geojson(
    path: impl AsRef<Path>,
    dataset: &Dataset,
    ways: &[&Way],
) -> Result<(), std::io::Error> {
    write(path, to_feature_collection(dataset, ways).to_string())
}
