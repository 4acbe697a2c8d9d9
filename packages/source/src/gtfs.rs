//! Bus stops and stop-to-stop segments from a GTFS feed.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use geo::{Coord, LineString, Point};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::SourceError;
use crate::encoding::decode_with_fallback;

#[derive(Debug, Deserialize)]
struct StopRow {
    stop_id: String,
    #[serde(default)]
    stop_name: String,
    stop_lat: Option<f64>,
    stop_lon: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StopTimeRow {
    trip_id: String,
    stop_id: String,
    stop_sequence: u32,
}

#[derive(Debug, Deserialize)]
struct TripRow {
    route_id: String,
    trip_id: String,
}

#[derive(Debug, Deserialize)]
struct RouteRow {
    route_id: String,
    #[serde(default)]
    agency_id: Option<String>,
}

/// A stop from `stops.txt` with its visit count from `stop_times.txt`.
#[derive(Debug, Clone, PartialEq)]
pub struct BusStop {
    /// `stop_id`.
    pub stop_id: String,
    /// `stop_name`.
    pub stop_name: String,
    /// Location (lon, lat).
    pub location: Point<f64>,
    /// Number of `stop_times` rows referencing this stop.
    pub stop_times_count: u64,
}

/// A directed segment between consecutive stops of a trip.
#[derive(Debug, Clone, PartialEq)]
pub struct BusSegment {
    /// Agency of the route, empty when unknown.
    pub agency_id: String,
    /// `route_id`.
    pub route_id: String,
    /// Departure stop.
    pub from_stop_id: String,
    /// Arrival stop.
    pub to_stop_id: String,
    /// Straight line between the two stops.
    pub line: LineString<f64>,
}

/// Stops and segments of one feed.
#[derive(Debug, Clone, Default)]
pub struct GtfsFeed {
    /// Stops with valid coordinates.
    pub stops: Vec<BusStop>,
    /// Unique segments, in first-seen order.
    pub segments: Vec<BusSegment>,
}

/// Reads a GTFS folder.
///
/// `stops.txt` is required. Segments are built only when `trips.txt` and
/// `stop_times.txt` are present; `routes.txt` supplies agency ids.
///
/// # Errors
///
/// * [`SourceError::NotFound`] if `stops.txt` is missing
/// * [`SourceError::Encoding`] / [`SourceError::Csv`] for unreadable files
pub fn read_gtfs(dir: &Path) -> Result<GtfsFeed, SourceError> {
    let stops_path = dir.join("stops.txt");
    if !stops_path.is_file() {
        return Err(SourceError::NotFound {
            what: stops_path.display().to_string(),
        });
    }

    let stop_rows: Vec<StopRow> = read_rows(&stops_path)?;
    let stop_times: Vec<StopTimeRow> = read_optional(&dir.join("stop_times.txt"))?;
    let trips: Vec<TripRow> = read_optional(&dir.join("trips.txt"))?;
    let routes: Vec<RouteRow> = read_optional(&dir.join("routes.txt"))?;

    let mut visits: BTreeMap<&str, u64> = BTreeMap::new();
    for st in &stop_times {
        *visits.entry(st.stop_id.as_str()).or_default() += 1;
    }

    let mut coords: BTreeMap<&str, Coord<f64>> = BTreeMap::new();
    let mut stops = Vec::with_capacity(stop_rows.len());
    for row in &stop_rows {
        let (Some(lat), Some(lon)) = (row.stop_lat, row.stop_lon) else {
            log::warn!("Stop {} in {} has no coordinates", row.stop_id, dir.display());
            continue;
        };
        coords.insert(row.stop_id.as_str(), Coord { x: lon, y: lat });
        stops.push(BusStop {
            stop_id: row.stop_id.clone(),
            stop_name: row.stop_name.clone(),
            location: Point::new(lon, lat),
            stop_times_count: visits.get(row.stop_id.as_str()).copied().unwrap_or(0),
        });
    }

    let agency_by_route: BTreeMap<&str, &str> = routes
        .iter()
        .filter_map(|r| r.agency_id.as_deref().map(|a| (r.route_id.as_str(), a)))
        .collect();

    let mut by_trip: BTreeMap<&str, Vec<&StopTimeRow>> = BTreeMap::new();
    for st in &stop_times {
        by_trip.entry(st.trip_id.as_str()).or_default().push(st);
    }

    let mut seen = BTreeSet::new();
    let mut segments = Vec::new();
    for trip in &trips {
        let Some(sequence) = by_trip.get_mut(trip.trip_id.as_str()) else {
            continue;
        };
        sequence.sort_by_key(|st| st.stop_sequence);
        let agency = agency_by_route
            .get(trip.route_id.as_str())
            .copied()
            .unwrap_or_default();

        for pair in sequence.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            let (Some(a), Some(b)) = (
                coords.get(from.stop_id.as_str()),
                coords.get(to.stop_id.as_str()),
            ) else {
                continue;
            };
            let key = (
                agency.to_string(),
                trip.route_id.clone(),
                from.stop_id.clone(),
                to.stop_id.clone(),
            );
            if !seen.insert(key) {
                continue;
            }
            segments.push(BusSegment {
                agency_id: agency.to_string(),
                route_id: trip.route_id.clone(),
                from_stop_id: from.stop_id.clone(),
                to_stop_id: to.stop_id.clone(),
                line: LineString::new(vec![*a, *b]),
            });
        }
    }

    Ok(GtfsFeed { stops, segments })
}

fn read_optional<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, SourceError> {
    if path.is_file() {
        read_rows(path)
    } else {
        Ok(Vec::new())
    }
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, SourceError> {
    let bytes = std::fs::read(path).map_err(|e| SourceError::io(path, e))?;
    let text = decode_with_fallback(&bytes)
        .text()
        .ok_or_else(|| SourceError::Encoding {
            path: path.to_path_buf(),
        })?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|source| SourceError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::scratch_dir;

    fn write_feed(dir: &Path) {
        std::fs::write(
            dir.join("stops.txt"),
            "\u{feff}stop_id,stop_name,stop_lat,stop_lon\n\
             A,駅前,35.0,139.0\n\
             B,市役所,35.01,139.01\n\
             C,病院,35.02,139.02\n\
             X,座標なし,,\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("stop_times.txt"),
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             t1,08:00:00,08:00:00,B,2\n\
             t1,07:55:00,07:55:00,A,1\n\
             t1,08:05:00,08:05:00,C,3\n\
             t2,09:00:00,09:00:00,A,1\n\
             t2,09:05:00,09:05:00,B,2\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("trips.txt"),
            "route_id,service_id,trip_id\nr1,weekday,t1\nr1,weekday,t2\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("routes.txt"),
            "route_id,agency_id,route_short_name\nr1,ag1,1\n",
        )
        .unwrap();
    }

    #[test]
    fn counts_visits_and_dedups_segments() {
        let dir = scratch_dir("gtfs_feed");
        write_feed(&dir);

        let feed = read_gtfs(&dir).unwrap();
        assert_eq!(feed.stops.len(), 3);
        let a = feed.stops.iter().find(|s| s.stop_id == "A").unwrap();
        assert_eq!(a.stop_times_count, 2);
        assert_eq!(a.stop_name, "駅前");

        // t1: A->B, B->C; t2: A->B again (deduplicated).
        assert_eq!(feed.segments.len(), 2);
        assert_eq!(feed.segments[0].from_stop_id, "A");
        assert_eq!(feed.segments[0].to_stop_id, "B");
        assert_eq!(feed.segments[0].agency_id, "ag1");
        assert_eq!(feed.segments[1].to_stop_id, "C");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_stops_is_not_found() {
        let dir = scratch_dir("gtfs_empty");
        assert!(matches!(
            read_gtfs(&dir),
            Err(SourceError::NotFound { .. })
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
