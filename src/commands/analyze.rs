use crate::gpxxml::extract_track_segments;
use gpxgauge::summarize;
use std::error::Error;
use std::io::{self, Read};

pub fn analyze_command(speed_limit_kmh: f64) -> Result<(), Box<dyn Error>> {
    let stdin = io::stdin();
    let mut input = Vec::new();
    stdin.lock().read_to_end(&mut input)?;

    let segments = extract_track_segments(&input)?;
    let summary = summarize(&segments, speed_limit_kmh);

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
