//! Error type shared by every stage of a tagging run.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// No usable track sample was found and no manual location was given.
    #[error("no usable track samples found (give track files or --location)")]
    EmptyTrack,

    #[error("cannot match against an empty track index")]
    EmptyIndex,

    /// A timezone-aware timestamp was compared with a naive one.
    #[error("cannot compare {left} with {right}: one carries a timezone and the other does not")]
    IncomparableTimestamps { left: String, right: String },

    #[error("coordinate is not a finite number: {value}")]
    InvalidCoordinate { value: f64 },

    #[error("invalid timestamp {value:?}")]
    InvalidTimestamp { value: String },

    /// Usage error for the manual location argument.
    #[error("invalid location {value:?}: {reason}")]
    InvalidLocation { value: String, reason: String },

    #[error("failed to read track file {path}: {reason}")]
    TrackFile { path: PathBuf, reason: String },

    #[error("cannot use input {path}: {reason}")]
    Input { path: PathBuf, reason: String },

    #[error("failed to write report {path}: {reason}")]
    Report { path: PathBuf, reason: String },

    #[error("Fail to load exif from {path}")]
    MetadataRead {
        path: PathBuf,
        #[source]
        source: Option<exif::Error>,
    },

    #[error("DateTimeOriginal not found in {path}")]
    MissingCaptureTime { path: PathBuf },

    #[error("failed to write metadata to {path}: {reason}")]
    MetadataWrite { path: PathBuf, reason: String },
}

impl Error {
    /// Errors that only concern one target file. The batch reports them
    /// and moves on; every other error aborts the run.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            Error::MetadataRead { .. }
                | Error::MissingCaptureTime { .. }
                | Error::MetadataWrite { .. }
                | Error::InvalidCoordinate { .. }
                | Error::InvalidTimestamp { .. }
        )
    }

    pub(crate) fn write_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::MetadataWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn track_file(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::TrackFile {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
