use log::{debug, warn};
use serde::Serialize;

use crate::{
    error::{Error, Result},
    timestamp::Timestamp,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64, altitude: Option<f64>) -> GeoPoint {
        GeoPoint {
            latitude,
            longitude,
            altitude,
        }
    }

    /// Parse a track coordinate, `"<lon> <lat> [<alt>]"`.
    pub fn parse_track_coord(text: &str) -> Result<GeoPoint> {
        let parts: Vec<&str> = text.split_whitespace().collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(Error::InvalidLocation {
                value: text.to_string(),
                reason: "expected \"<lon> <lat> [<alt>]\"".to_string(),
            });
        }
        let number = |part: &str| {
            part.parse::<f64>().map_err(|e| Error::InvalidLocation {
                value: text.to_string(),
                reason: e.to_string(),
            })
        };

        let point = GeoPoint {
            longitude: number(parts[0])?,
            latitude: number(parts[1])?,
            altitude: parts.get(2).map(|alt| number(*alt)).transpose()?,
        };
        point.ensure_finite()?;
        Ok(point)
    }

    pub fn ensure_finite(&self) -> Result<()> {
        for value in [self.latitude, self.longitude]
            .into_iter()
            .chain(self.altitude)
        {
            if !value.is_finite() {
                return Err(Error::InvalidCoordinate { value });
            }
        }
        Ok(())
    }
}

/// One track sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedLocation {
    pub timestamp: Timestamp,
    pub location: GeoPoint,
}

impl TimedLocation {
    pub fn parse(timestamp: &str, coord: &str) -> Result<TimedLocation> {
        Ok(TimedLocation {
            timestamp: Timestamp::parse_iso(timestamp)?,
            location: GeoPoint::parse_track_coord(coord)?,
        })
    }
}

/// Track samples sorted by time, at most one per timestamp.
#[derive(Debug, Clone, Default)]
pub struct TrackIndex {
    samples: Vec<TimedLocation>,
}

impl TrackIndex {
    /// Build the index from raw `(timestamp, "lon lat alt")` pairs.
    ///
    /// Samples that do not parse are skipped with a warning. When
    /// several samples share a timestamp, the one seen last wins.
    pub fn build<I, T, C>(samples: I) -> Result<TrackIndex>
    where
        I: IntoIterator<Item = (T, C)>,
        T: AsRef<str>,
        C: AsRef<str>,
    {
        let mut parsed = Vec::new();
        for (timestamp, coord) in samples {
            let (timestamp, coord) = (timestamp.as_ref(), coord.as_ref());
            match TimedLocation::parse(timestamp, coord) {
                Ok(location) => parsed.push(location),
                Err(e) => warn!("Skipping track sample ({}, {}): {}", timestamp, coord, e),
            }
        }
        TrackIndex::from_locations(parsed)
    }

    pub fn from_locations(mut locations: Vec<TimedLocation>) -> Result<TrackIndex> {
        let first = match locations.first() {
            Some(first) => first.timestamp,
            None => return Err(Error::EmptyTrack),
        };
        for location in &locations {
            first.ensure_comparable(&location.timestamp)?;
        }

        // Stable: samples with equal timestamps keep their input order, so
        // the last one of each run is the last one seen.
        locations.sort_by_key(|location| location.timestamp.sort_key());

        let input_len = locations.len();
        let mut samples: Vec<TimedLocation> = Vec::with_capacity(input_len);
        for location in locations {
            match samples.last_mut() {
                Some(prev) if prev.timestamp == location.timestamp => *prev = location,
                _ => samples.push(location),
            }
        }

        debug!(
            "Track index: {} samples ({} duplicate timestamps collapsed)",
            samples.len(),
            input_len - samples.len()
        );
        Ok(TrackIndex { samples })
    }

    pub fn samples(&self) -> &[TimedLocation] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
