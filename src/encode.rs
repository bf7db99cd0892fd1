//! Decimal degrees to the EXIF GPS representation.
//!
//! Angles become whole degrees, whole minutes and seconds in hundredths,
//! each stored as a rational. Altitude becomes a reference byte and whole
//! meters.

use serde::Serialize;

use crate::track::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodedAngle {
    pub reference: char,
    pub degrees: u32,
    pub minutes: u32,
    /// Seconds scaled by 100, the numerator of `centiseconds / 100`.
    pub centiseconds: u32,
}

impl EncodedAngle {
    /// Decimal degrees this encoding stands for, sign from the reference.
    pub fn to_degrees(&self, negative_reference: char) -> f64 {
        let magnitude = self.degrees as f64
            + self.minutes as f64 / 60.0
            + self.centiseconds as f64 / 100.0 / 3600.0;
        if self.reference == negative_reference {
            -magnitude
        } else {
            magnitude
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodedAltitude {
    /// 0 above sea level, 1 below.
    pub reference: u8,
    pub meters: u32,
}

/// Encode a latitude or longitude. Non-negative values get `positive`,
/// negative ones `negative`. The value must be finite.
pub fn encode_lat_lon(value: f64, positive: char, negative: char) -> EncodedAngle {
    debug_assert!(value.is_finite());
    let reference = if value >= 0.0 { positive } else { negative };
    let dd = value.abs();
    let degrees = dd.trunc();
    let mm = (dd - degrees) * 60.0;
    let minutes = mm.trunc();
    let ss = (mm - minutes) * 60.0;
    EncodedAngle {
        reference,
        degrees: degrees as u32,
        minutes: minutes as u32,
        centiseconds: (ss * 100.0) as u32,
    }
}

/// Encode an altitude in meters, truncated toward zero.
pub fn encode_altitude(value: f64) -> EncodedAltitude {
    debug_assert!(value.is_finite());
    EncodedAltitude {
        reference: if value >= 0.0 { 0 } else { 1 },
        meters: value.trunc().abs() as u32,
    }
}

/// A location ready to be written as EXIF GPS fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodedLocation {
    pub latitude: EncodedAngle,
    pub longitude: EncodedAngle,
    pub altitude: Option<EncodedAltitude>,
}

impl EncodedLocation {
    pub fn new(point: &GeoPoint) -> EncodedLocation {
        EncodedLocation {
            latitude: encode_lat_lon(point.latitude, 'N', 'S'),
            longitude: encode_lat_lon(point.longitude, 'E', 'W'),
            altitude: point.altitude.map(encode_altitude),
        }
    }
}
