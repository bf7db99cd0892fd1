use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{
    error::{Error, Result},
    timestamp::Timestamp,
    track::GeoPoint,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    Manual,
    Track,
}

/// Outcome of tagging one photo.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoTagResult {
    pub file: PathBuf,
    pub source: LocationKind,
    #[serde(flatten)]
    pub location: GeoPoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_time: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certainty_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_sample_timestamp: Option<Timestamp>,
}

impl GeoTagResult {
    /// The line printed for this photo.
    pub fn summary(&self) -> String {
        match (self.source, self.capture_time, self.certainty_seconds) {
            (LocationKind::Track, Some(capture_time), Some(certainty)) => format!(
                "Tagged {} ({}) with {} seconds certainty at {:?}, {:?}",
                self.file.display(),
                capture_label(&capture_time),
                certainty,
                self.location.latitude,
                self.location.longitude
            ),
            _ => format!("Tagged {}", self.file.display()),
        }
    }
}

/// Capture time as the camera recorded it, `YYYY/MM/DD HH:MM:SS`.
fn capture_label(t: &Timestamp) -> String {
    let local = match t {
        Timestamp::Aware(dt) => dt.naive_local(),
        Timestamp::Naive(naive) => *naive,
    };
    local.format("%Y/%m/%d %H:%M:%S").to_string()
}

pub fn write_report(path: &Path, results: &[GeoTagResult]) -> Result<()> {
    let failed = |reason: String| Error::Report {
        path: path.to_path_buf(),
        reason,
    };
    let file = File::create(path).map_err(|e| failed(e.to_string()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, results).map_err(|e| failed(e.to_string()))?;
    writer.flush().map_err(|e| failed(e.to_string()))
}
