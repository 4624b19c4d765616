use crate::gpxxml::extract_track_segments;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use gpxgauge::{MAX_PLAUSIBLE_SPEED_KMH, summarize};
use std::error::Error;
use std::io::{self, Read};

pub fn route_command() -> Result<(), Box<dyn Error>> {
    let stdin = io::stdin();
    let mut input = Vec::new();
    stdin.lock().read_to_end(&mut input)?;

    let segments = extract_track_segments(&input)?;
    let summary = summarize(&segments, MAX_PLAUSIBLE_SPEED_KMH);

    let mut features = Vec::new();

    // A LineString needs at least two positions to be valid GeoJSON.
    if summary.route.len() >= 2 {
        let mut feature = Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::LineString(
                summary.route.iter().map(|c| c.to_vec()).collect(),
            ))),
            id: None,
            properties: None,
            foreign_members: None,
        };
        feature.set_property("distance_km", summary.distance_km);
        feature.set_property("max_elevation_m", summary.max_elevation_m);
        feature.set_property("max_speed_kmh", summary.max_speed_kmh);
        features.push(feature);
    }

    if let Some(center) = summary.center {
        let mut feature = Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::Point(center.to_vec()))),
            id: None,
            properties: None,
            foreign_members: None,
        };
        feature.set_property("role", "center");
        features.push(feature);
    }

    let gj = GeoJson::FeatureCollection(FeatureCollection {
        features,
        bbox: None,
        foreign_members: None,
    });
    println!("{}", serde_json::to_string_pretty(&gj)?);
    Ok(())
}
