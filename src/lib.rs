use log::debug;
use serde::Serialize;
use time::OffsetDateTime;

/// Pair speeds at or above this many km/h are treated as GPS jitter and
/// discarded from the maximum-speed scan.
pub const MAX_PLAUSIBLE_SPEED_KMH: f64 = 300.0;

#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub ele: Option<f64>,
    pub time: Option<OffsetDateTime>,
}

/// One `<trkseg>` worth of points, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackSegment {
    pub points: Vec<TrackPoint>,
}

/// Why a consecutive point pair contributed nothing to the speed scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpeedSkip {
    /// One or both points carry no timestamp.
    MissingTimestamp,
    /// Elapsed time is zero or runs backwards; speed is undefined.
    NonPositiveElapsed,
    /// The computed speed (km/h) reached the plausibility limit.
    Implausible(f64),
}

/// Aggregate metrics for one analyzed track document.
///
/// `route` and `center` use `[longitude, latitude]` ordering to match
/// mapping-library convention. `center` is the point at the middle index
/// of the flattened sequence, not a centroid; it is `None` for an empty
/// document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSummary {
    pub distance_km: f64,
    pub max_elevation_m: f64,
    pub max_speed_kmh: f64,
    pub route: Vec<[f64; 2]>,
    pub center: Option<[f64; 2]>,
}

/// Great-circle distance in meters between two coordinates, using the
/// haversine formula on a mean-radius sphere. Accurate enough for the
/// short consecutive-point hops of a recorded track.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;

    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Instantaneous speed in km/h between two consecutive points, or the
/// reason the pair is excluded from the scan. A skip never aborts the
/// surrounding computation.
pub fn pair_speed_kmh(
    from: &TrackPoint,
    to: &TrackPoint,
    limit_kmh: f64,
) -> Result<f64, SpeedSkip> {
    let (Some(start), Some(end)) = (from.time, to.time) else {
        return Err(SpeedSkip::MissingTimestamp);
    };

    let elapsed = (end - start).as_seconds_f64();
    if elapsed <= 0.0 {
        return Err(SpeedSkip::NonPositiveElapsed);
    }

    let meters = haversine_distance(from.lat, from.lon, to.lat, to.lon);
    let speed = meters / elapsed * 3.6;
    if speed >= limit_kmh {
        return Err(SpeedSkip::Implausible(speed));
    }

    Ok(speed)
}

/// Total traversed distance in kilometers, rounded to 2 decimal places.
/// Consecutive-point distances are summed within each segment only, so
/// the gap between two segments is not counted as travel.
pub fn total_distance_km(segments: &[TrackSegment]) -> f64 {
    let mut meters = 0.0;
    for segment in segments {
        for pair in segment.points.windows(2) {
            meters += haversine_distance(pair[0].lat, pair[0].lon, pair[1].lat, pair[1].lon);
        }
    }
    round_dp(meters / 1000.0, 2)
}

/// Highest elevation in meters across all points, rounded to 1 decimal
/// place. A point without elevation counts as 0, so a document with no
/// elevation data at all reports 0.0.
pub fn max_elevation_m(segments: &[TrackSegment]) -> f64 {
    let mut max = 0.0f64;
    for point in segments.iter().flat_map(|s| &s.points) {
        let ele = point.ele.unwrap_or(0.0);
        if ele > max {
            max = ele;
        }
    }
    round_dp(max, 1)
}

/// Highest plausible pair speed in km/h across the flattened point
/// sequence, rounded to 1 decimal place. Starts at 0.0 and only grows;
/// skipped pairs contribute nothing. The pair window runs across segment
/// boundaries, where the plausibility limit weeds out large jumps.
pub fn max_speed_kmh(segments: &[TrackSegment], limit_kmh: f64) -> f64 {
    let mut max = 0.0f64;
    let mut prev: Option<&TrackPoint> = None;
    for point in segments.iter().flat_map(|s| &s.points) {
        if let Some(last) = prev {
            match pair_speed_kmh(last, point, limit_kmh) {
                Ok(speed) if speed > max => max = speed,
                Ok(_) => {}
                Err(skip) => debug!("speed pair skipped: {skip:?}"),
            }
        }
        prev = Some(point);
    }
    round_dp(max, 1)
}

/// Runs all analysis passes over the parsed segments and packages the
/// result. The route lists every point in document order.
pub fn summarize(segments: &[TrackSegment], limit_kmh: f64) -> TrackSummary {
    let route: Vec<[f64; 2]> = segments
        .iter()
        .flat_map(|s| &s.points)
        .map(|p| [p.lon, p.lat])
        .collect();
    let center = route.get(route.len() / 2).copied();

    TrackSummary {
        distance_km: total_distance_km(segments),
        max_elevation_m: max_elevation_m(segments),
        max_speed_kmh: max_speed_kmh(segments, limit_kmh),
        route,
        center,
    }
}

fn round_dp(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
