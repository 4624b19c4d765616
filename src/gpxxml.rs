use gpxgauge::{TrackPoint, TrackSegment};
use log::{debug, warn};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;
use time::OffsetDateTime;

/// The document is not well-formed track markup. Fatal to the whole
/// call; a missing or empty track list is not an error.
#[derive(Debug, Error)]
#[error("malformed GPX at byte {position}: {message}")]
pub struct ParseError {
    pub position: u64,
    pub message: String,
}

/// Extracts all `<trkpt>` elements into per-`<trkseg>` groups, in
/// document order. Points missing `lat` or `lon` are dropped with a
/// warning; an unparseable `<ele>` or `<time>` leaves that field unset
/// on an otherwise kept point.
pub fn extract_track_segments(input: &[u8]) -> Result<Vec<TrackSegment>, ParseError> {
    let mut reader = Reader::from_reader(input);
    let mut buf = Vec::new();

    let mut segments: Vec<TrackSegment> = Vec::new();
    let mut points: Vec<TrackPoint> = Vec::new();

    let mut in_trkpt = false;
    let mut current_lat: Option<f64> = None;
    let mut current_lon: Option<f64> = None;
    let mut current_ele: Option<f64> = None;
    let mut current_time: Option<OffsetDateTime> = None;
    let mut in_ele_element = false;
    let mut in_time_element = false;
    let mut ele_text = String::new();
    let mut time_text = String::new();

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Err(e) => {
                return Err(ParseError {
                    position: reader.buffer_position(),
                    message: format!("{e:?}"),
                });
            }
            Ok(Event::Eof) => break,
            Ok(event) => event.into_owned(),
        };

        match event {
            Event::Start(ref e) => {
                if e.name().as_ref() == b"trkpt" {
                    in_trkpt = true;
                    (current_lat, current_lon) = read_coordinates(e);
                    current_ele = None;
                    current_time = None;
                } else if in_trkpt && e.name().as_ref() == b"ele" {
                    in_ele_element = true;
                    ele_text.clear();
                } else if in_trkpt && e.name().as_ref() == b"time" {
                    in_time_element = true;
                    time_text.clear();
                }
            }

            // A self-closing trkpt is a valid point with no children.
            Event::Empty(ref e) => {
                if e.name().as_ref() == b"trkpt" {
                    let (lat, lon) = read_coordinates(e);
                    push_point(&mut points, lat, lon, None, None, reader.buffer_position());
                }
            }

            Event::End(ref e) => {
                if e.name().as_ref() == b"trkpt" {
                    push_point(
                        &mut points,
                        current_lat,
                        current_lon,
                        current_ele,
                        current_time,
                        reader.buffer_position(),
                    );
                    in_trkpt = false;
                } else if e.name().as_ref() == b"ele" && in_trkpt {
                    in_ele_element = false;
                    current_ele = ele_text.trim().parse().ok();
                } else if e.name().as_ref() == b"time" && in_trkpt {
                    in_time_element = false;
                    current_time = OffsetDateTime::parse(
                        time_text.trim(),
                        &time::format_description::well_known::Iso8601::DEFAULT,
                    )
                    .ok();
                } else if e.name().as_ref() == b"trkseg" {
                    segments.push(TrackSegment {
                        points: std::mem::take(&mut points),
                    });
                }
            }

            Event::Text(ref e) => {
                if in_trkpt
                    && (in_ele_element || in_time_element)
                    && let Ok(text) = std::str::from_utf8(e)
                {
                    if in_ele_element {
                        ele_text.push_str(text);
                    } else {
                        time_text.push_str(text);
                    }
                }
            }

            _ => {}
        }

        buf.clear();
    }

    // Some writers omit trkseg and nest trkpt directly under trk; keep
    // those points as a trailing segment.
    if !points.is_empty() {
        segments.push(TrackSegment { points });
    }

    debug!(
        "extracted {} points across {} segments",
        segments.iter().map(|s| s.points.len()).sum::<usize>(),
        segments.len()
    );

    Ok(segments)
}

fn read_coordinates(e: &BytesStart) -> (Option<f64>, Option<f64>) {
    let mut lat = None;
    let mut lon = None;

    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"lat" => {
                if let Ok(lat_str) = std::str::from_utf8(&attr.value) {
                    lat = lat_str.parse().ok();
                }
            }
            b"lon" => {
                if let Ok(lon_str) = std::str::from_utf8(&attr.value) {
                    lon = lon_str.parse().ok();
                }
            }
            _ => {}
        }
    }

    (lat, lon)
}

fn push_point(
    points: &mut Vec<TrackPoint>,
    lat: Option<f64>,
    lon: Option<f64>,
    ele: Option<f64>,
    time: Option<OffsetDateTime>,
    position: u64,
) {
    match (lat, lon) {
        (Some(lat), Some(lon)) => points.push(TrackPoint { lat, lon, ele, time }),
        _ => warn!("dropping trkpt without lat/lon near byte {position}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test">
  <trk>
    <name>Morning Ride</name>
    <trkseg>
      <trkpt lat="37.7749" lon="-122.4194">
        <ele>12.0</ele>
        <time>2024-05-01T08:00:00Z</time>
      </trkpt>
      <trkpt lat="37.7759" lon="-122.4194">
        <ele>15.5</ele>
        <time>2024-05-01T08:00:10Z</time>
      </trkpt>
      <trkpt lat="37.7769" lon="-122.4194">
        <ele>18.0</ele>
        <time>2024-05-01T08:00:20Z</time>
      </trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="37.7800" lon="-122.4200">
        <ele>22.5</ele>
        <time>2024-05-01T08:05:00Z</time>
      </trkpt>
      <trkpt lat="37.7810" lon="-122.4200">
        <ele>21.0</ele>
        <time>2024-05-01T08:05:10Z</time>
      </trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn test_extract_groups_points_by_segment() {
        let segments = extract_track_segments(SAMPLE_GPX.as_bytes()).unwrap();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].points.len(), 3);
        assert_eq!(segments[1].points.len(), 2);

        let first = &segments[0].points[0];
        assert_eq!(first.lat, 37.7749);
        assert_eq!(first.lon, -122.4194);
        assert_eq!(first.ele, Some(12.0));
        assert!(first.time.is_some());
    }

    #[test]
    fn test_extract_empty_input() {
        let segments = extract_track_segments(b"").unwrap();
        assert!(segments.is_empty());
    }

    #[test]
    fn test_extract_document_without_tracks() {
        let gpx = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test"></gpx>"#;

        let segments = extract_track_segments(gpx.as_bytes()).unwrap();
        assert!(segments.is_empty());
    }

    #[test]
    fn test_extract_skips_point_without_coordinates() {
        let gpx = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test">
  <trk>
    <trkseg>
      <trkpt lat="37.7749">
        <time>2024-05-01T08:00:00Z</time>
      </trkpt>
      <trkpt lat="37.7750" lon="-122.4195">
        <time>2024-05-01T08:00:05Z</time>
      </trkpt>
    </trkseg>
  </trk>
</gpx>"#;

        let segments = extract_track_segments(gpx.as_bytes()).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].points.len(), 1);
        assert_eq!(segments[0].points[0].lat, 37.7750);
    }

    #[test]
    fn test_extract_keeps_point_with_bad_time() {
        let gpx = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test">
  <trk>
    <trkseg>
      <trkpt lat="37.7749" lon="-122.4194">
        <time>not-a-timestamp</time>
      </trkpt>
    </trkseg>
  </trk>
</gpx>"#;

        let segments = extract_track_segments(gpx.as_bytes()).unwrap();
        assert_eq!(segments[0].points.len(), 1);
        assert_eq!(segments[0].points[0].time, None);
    }

    #[test]
    fn test_extract_point_without_elevation() {
        let gpx = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test">
  <trk>
    <trkseg>
      <trkpt lat="37.7749" lon="-122.4194">
        <time>2024-05-01T08:00:00Z</time>
      </trkpt>
    </trkseg>
  </trk>
</gpx>"#;

        let segments = extract_track_segments(gpx.as_bytes()).unwrap();
        assert_eq!(segments[0].points[0].ele, None);
    }

    #[test]
    fn test_extract_self_closing_points() {
        let gpx = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test">
  <trk>
    <trkseg>
      <trkpt lat="37.7749" lon="-122.4194"/>
      <trkpt lat="37.7750" lon="-122.4195"/>
    </trkseg>
  </trk>
</gpx>"#;

        let segments = extract_track_segments(gpx.as_bytes()).unwrap();
        assert_eq!(segments[0].points.len(), 2);
        assert_eq!(segments[0].points[0].ele, None);
        assert_eq!(segments[0].points[0].time, None);
    }

    #[test]
    fn test_extract_flushes_points_outside_segments() {
        // Some writers skip trkseg entirely.
        let gpx = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test">
  <trk>
    <trkpt lat="37.7749" lon="-122.4194"/>
    <trkpt lat="37.7750" lon="-122.4195"/>
  </trk>
</gpx>"#;

        let segments = extract_track_segments(gpx.as_bytes()).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].points.len(), 2);
    }

    #[test]
    fn test_extract_rejects_mismatched_markup() {
        let result = extract_track_segments(b"<gpx><trk><trkseg></trk></gpx>");

        let err = result.unwrap_err();
        assert!(err.to_string().contains("malformed GPX"));
    }

    /// The hand-rolled extractor must agree with the reference GPX
    /// parser on point counts and coordinates.
    #[test]
    fn test_extract_matches_reference_parser() {
        let segments = extract_track_segments(SAMPLE_GPX.as_bytes()).unwrap();
        let reference: gpx::Gpx = gpx::read(SAMPLE_GPX.as_bytes()).unwrap();

        let ours: usize = segments.iter().map(|s| s.points.len()).sum();
        let theirs: usize = reference.tracks[0]
            .segments
            .iter()
            .map(|s| s.points.len())
            .sum();
        assert_eq!(ours, theirs);

        let first_ref = reference.tracks[0].segments[0].points[0].point();
        assert_eq!(segments[0].points[0].lon, first_ref.x());
        assert_eq!(segments[0].points[0].lat, first_ref.y());
    }
}
