use std::path::{Path, PathBuf};

use chrono::FixedOffset;
use log::{debug, info, warn};

pub use encode::{encode_altitude, encode_lat_lon, EncodedLocation};
pub use error::{Error, Result};
pub use matcher::{match_time, nearest_index, TrackMatch};
pub use photo_metadata::{GeoFields, PhotoMetadata};
pub use report::{GeoTagResult, LocationKind};
pub use timestamp::Timestamp;
pub use track::{GeoPoint, TimedLocation, TrackIndex};

pub mod encode;
pub mod error;
pub mod matcher;
pub mod photo_metadata;
pub mod report;
pub mod timestamp;
pub mod timezone;
pub mod track;
pub mod track_file;

/// Where the coordinates for every photo of a run come from.
#[derive(Debug, Clone)]
pub enum LocationSource {
    /// One location for all photos, given on the command line.
    Manual(GeoPoint),
    /// Nearest track sample to each photo's capture time.
    Track {
        index: TrackIndex,
        default_offset: Option<FixedOffset>,
    },
}

impl LocationSource {
    pub fn from_track(index: TrackIndex) -> LocationSource {
        let default_offset = timezone::default_offset(&index);
        LocationSource::Track {
            index,
            default_offset,
        }
    }
}

pub struct Tagger {
    source: LocationSource,
    dry_run: bool,
}

impl Tagger {
    pub fn new(source: LocationSource, dry_run: bool) -> Tagger {
        Tagger { source, dry_run }
    }

    /// Tag every photo in order, printing one line per photo.
    ///
    /// Per-file failures are printed and skipped. Any other error stops
    /// the batch.
    pub fn tag_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<GeoTagResult>> {
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            match self.tag_file(path.as_ref()) {
                Ok(result) => {
                    println!("{}", result.summary());
                    results.push(result);
                }
                Err(e) if e.is_per_file() => {
                    if let Some(source) = std::error::Error::source(&e) {
                        debug!("{}: {}", path.as_ref().display(), source);
                    }
                    println!("{}", e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }

    pub fn tag_file(&self, path: &Path) -> Result<GeoTagResult> {
        let photo = PhotoMetadata::open(path)?;

        let (kind, location, capture_time, matched) = match &self.source {
            LocationSource::Manual(point) => (LocationKind::Manual, *point, None, None),
            LocationSource::Track {
                index,
                default_offset,
            } => {
                let captured = photo.capture_time()?;
                let t = captured.with_default_offset(*default_offset);
                let found = match_time(index, &t)?;
                debug!(
                    "{}: {} matched sample at {}",
                    path.display(),
                    t,
                    found.sample.timestamp
                );
                (
                    LocationKind::Track,
                    found.sample.location,
                    Some(captured),
                    Some((found.sample.timestamp, found.certainty)),
                )
            }
        };

        location.ensure_finite()?;
        let fields = GeoFields {
            location: EncodedLocation::new(&location),
            gps_time: matched.map(|(timestamp, _)| timestamp.utc_or_local()),
        };
        if self.dry_run {
            info!("Dry run, leaving {} unchanged", path.display());
        } else {
            photo.write_geo_fields(&fields)?;
        }

        Ok(GeoTagResult {
            file: path.to_path_buf(),
            source: kind,
            location,
            capture_time,
            certainty_seconds: matched.map(|(_, certainty)| certainty.num_seconds()),
            matched_sample_timestamp: matched.map(|(timestamp, _)| timestamp),
        })
    }
}

/// Parse `"lat,lon"` or `"lat,lon,alt"`.
pub fn parse_manual_location(text: &str) -> Result<GeoPoint> {
    let invalid = |reason: &str| Error::InvalidLocation {
        value: text.to_string(),
        reason: reason.to_string(),
    };

    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(invalid("location must be 2 or 3 parts"));
    }
    let latitude = parts[0]
        .parse::<f64>()
        .or_else(|_| latlon::parse_lat(parts[0]))
        .map_err(|_| invalid("bad latitude"))?;
    let longitude = parts[1]
        .parse::<f64>()
        .or_else(|_| latlon::parse_lng(parts[1]))
        .map_err(|_| invalid("bad longitude"))?;
    let altitude = match parts.get(2) {
        Some(alt) => Some(alt.parse::<f64>().map_err(|_| invalid("bad altitude"))?),
        None => None,
    };

    let point = GeoPoint::new(latitude, longitude, altitude);
    point
        .ensure_finite()
        .map_err(|_| invalid("coordinates must be finite"))?;
    Ok(point)
}

/// Track files and photos among `paths`, directories walked recursively.
pub fn collect_inputs<P: AsRef<Path>>(paths: &[P]) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut tracks = Vec::new();
    let mut photos = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let expanded = if path.is_dir() {
            visit_paths(path)?
        } else {
            vec![path.to_path_buf()]
        };
        for file in expanded {
            if track_file::TrackFormat::from_path(&file).is_some() {
                tracks.push(file);
            } else {
                photos.push(file);
            }
        }
    }
    Ok((tracks, photos))
}

/// Photos and track files under `root`, sorted by path.
pub fn visit_paths(root: &Path) -> Result<Vec<PathBuf>> {
    let walker = globwalk::GlobWalkerBuilder::from_patterns(root, &["**/*.{jpg,jpeg,kml,gpx}"])
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::Input {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;

    let mut files = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) => files.push(entry.into_path()),
            Err(e) => warn!("Skipping unreadable entry under {}: {}", root.display(), e),
        }
    }
    files.sort();
    Ok(files)
}

/// Tag the photos among `paths`, from `location` if given, otherwise from
/// the track files among `paths`.
pub fn run<P: AsRef<Path>>(
    paths: &[P],
    location: Option<&str>,
    dry_run: bool,
    report: Option<&Path>,
) -> Result<Vec<GeoTagResult>> {
    let manual = location.map(parse_manual_location).transpose()?;
    let (tracks, photos) = collect_inputs(paths)?;

    let source = match manual {
        Some(point) => {
            if !tracks.is_empty() {
                info!("Manual location given, ignoring {} track files", tracks.len());
            }
            LocationSource::Manual(point)
        }
        None => {
            let samples = track_file::read_all(&tracks)?;
            LocationSource::from_track(TrackIndex::build(samples)?)
        }
    };

    info!("Tagging {} photos", photos.len());
    let results = Tagger::new(source, dry_run).tag_files(&photos)?;

    if let Some(report) = report {
        report::write_report(report, &results)?;
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::photo_metadata::fixtures::*;
    use exif::{In, Tag};
    use tempfile::tempdir;

    const TRACK: &str = r#"<kml xmlns:gx="http://www.google.com/kml/ext/2.2"><Document><Placemark>
<gx:Track>
  <when>2014-05-03T10:00:00+02:00</when><gx:coord>0 0 0</gx:coord>
  <when>2014-05-03T10:10:00+02:00</when><gx:coord>1 1 100</gx:coord>
</gx:Track>
</Placemark></Document></kml>"#;

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn manual_location_parsing() {
        assert_eq!(
            parse_manual_location("37.5,-122.3").unwrap(),
            GeoPoint::new(37.5, -122.3, None)
        );
        assert_eq!(
            parse_manual_location(" 37.5 , -122.3 , 12 ").unwrap(),
            GeoPoint::new(37.5, -122.3, Some(12.0))
        );
        assert_eq!(
            parse_manual_location("1e-5,2").unwrap(),
            GeoPoint::new(0.00001, 2.0, None)
        );
        assert_eq!(
            parse_manual_location("91,0").unwrap(),
            GeoPoint::new(91.0, 0.0, None)
        );
        for bad in ["37.5", "1,2,3,4", "north,2", "1,2,high", "nan,0"] {
            assert!(
                matches!(parse_manual_location(bad), Err(Error::InvalidLocation { .. })),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn tags_photo_from_track() {
        let dir = tempdir().unwrap();
        let track = write_file(dir.path(), "day.kml", TRACK.as_bytes());
        let photo = write_file(
            dir.path(),
            "a.jpg",
            &jpeg_with_capture_time("2014:05:03 10:04:00", None),
        );

        let results = run(&[track, photo.clone()], None, false, None).unwrap();

        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.source, LocationKind::Track);
        assert_eq!(result.certainty_seconds, Some(240));
        assert_eq!(result.location, GeoPoint::new(0.0, 0.0, Some(0.0)));
        assert_eq!(
            result.matched_sample_timestamp,
            Some(Timestamp::parse_iso("2014-05-03T10:00:00+02:00").unwrap())
        );

        let exif = read_exif(&photo);
        assert_eq!(ascii_value(&exif, Tag::GPSLatitudeRef).as_deref(), Some("N"));
        assert_eq!(
            rational_parts(&exif, Tag::GPSLatitude),
            vec![(0, 1), (0, 1), (0, 100)]
        );
        assert_eq!(rational_parts(&exif, Tag::GPSAltitude), vec![(0, 1)]);
        // sample time in UTC
        assert_eq!(
            rational_parts(&exif, Tag::GPSTimeStamp),
            vec![(8, 1), (0, 1), (0, 1)]
        );
        assert_eq!(
            ascii_value(&exif, Tag::GPSDateStamp).as_deref(),
            Some("2014:05:03")
        );
    }

    #[test]
    fn tags_photo_with_manual_location() {
        let dir = tempdir().unwrap();
        let photo = write_file(dir.path(), "a.jpg", BARE_JPEG);

        let results = run(&[photo.clone()], Some("37.5,-122.3"), false, None).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].summary(), format!("Tagged {}", photo.display()));
        assert_eq!(results[0].certainty_seconds, None);

        let exif = read_exif(&photo);
        assert_eq!(ascii_value(&exif, Tag::GPSLatitudeRef).as_deref(), Some("N"));
        assert_eq!(
            rational_parts(&exif, Tag::GPSLatitude),
            vec![(37, 1), (30, 1), (0, 100)]
        );
        assert_eq!(ascii_value(&exif, Tag::GPSLongitudeRef).as_deref(), Some("W"));
        assert_eq!(rational_parts(&exif, Tag::GPSLongitude)[0], (122, 1));
        assert!(exif.get_field(Tag::GPSAltitude, In::PRIMARY).is_none());
        assert!(exif.get_field(Tag::GPSAltitudeRef, In::PRIMARY).is_none());
        assert!(exif.get_field(Tag::GPSTimeStamp, In::PRIMARY).is_none());
        assert!(exif.get_field(Tag::GPSDateStamp, In::PRIMARY).is_none());
    }

    #[test]
    fn invalid_location_processes_nothing() {
        let dir = tempdir().unwrap();
        let photo = write_file(dir.path(), "a.jpg", BARE_JPEG);

        let result = run(&[photo.clone()], Some("37.5"), false, None);

        assert!(matches!(result, Err(Error::InvalidLocation { .. })));
        assert_eq!(fs::read(&photo).unwrap(), BARE_JPEG);
    }

    #[test]
    fn no_track_and_no_location() {
        let dir = tempdir().unwrap();
        let photo = write_file(dir.path(), "a.jpg", BARE_JPEG);
        assert!(matches!(
            run(&[photo], None, false, None),
            Err(Error::EmptyTrack)
        ));
    }

    #[test]
    fn bad_files_do_not_stop_the_batch() {
        let dir = tempdir().unwrap();
        let track = write_file(dir.path(), "day.kml", TRACK.as_bytes());
        let broken = write_file(dir.path(), "broken.jpg", b"not an image");
        let undated = write_file(dir.path(), "undated.jpg", BARE_JPEG);
        let good = write_file(
            dir.path(),
            "good.jpg",
            &jpeg_with_capture_time("2014:05:03 10:09:00", None),
        );

        let inputs = [track, broken, undated.clone(), good.clone()];
        let results = run(&inputs, None, false, None).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file, good);
        assert_eq!(results[0].certainty_seconds, Some(60));
        assert_eq!(results[0].location.longitude, 1.0);
        assert_eq!(fs::read(&undated).unwrap(), BARE_JPEG);
    }

    #[test]
    fn naive_track_matches_by_wall_clock() {
        let dir = tempdir().unwrap();
        let track = write_file(
            dir.path(),
            "naive.kml",
            br#"<kml xmlns:gx="http://www.google.com/kml/ext/2.2"><gx:Track>
  <when>2014-05-03T10:00:00</when><gx:coord>0 0 0</gx:coord>
  <when>2014-05-03T10:10:00</when><gx:coord>1 1 100</gx:coord>
</gx:Track></kml>"#,
        );
        let early = write_file(
            dir.path(),
            "early.jpg",
            &jpeg_with_capture_time("2014:05:03 10:04:00", None),
        );
        let midway = write_file(
            dir.path(),
            "midway.jpg",
            &jpeg_with_capture_time("2014:05:03 10:05:00", None),
        );

        let samples = track_file::read_samples(&track).unwrap();
        let index = TrackIndex::build(samples).unwrap();
        assert_eq!(timezone::default_offset(&index), None);

        let results = run(&[track, early, midway], None, true, None).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].certainty_seconds, Some(240));
        assert_eq!(results[0].location, GeoPoint::new(0.0, 0.0, Some(0.0)));
        assert_eq!(
            results[0].matched_sample_timestamp,
            Some(Timestamp::parse_iso("2014-05-03T10:00:00").unwrap())
        );

        assert_eq!(results[1].certainty_seconds, Some(300));
        assert_eq!(results[1].location, GeoPoint::new(1.0, 1.0, Some(100.0)));
        assert_eq!(
            results[1].matched_sample_timestamp,
            Some(Timestamp::parse_iso("2014-05-03T10:10:00").unwrap())
        );
        assert_eq!(
            results[1].summary(),
            format!(
                "Tagged {} (2014/05/03 10:05:00) with 300 seconds certainty at 1.0, 1.0",
                results[1].file.display()
            )
        );
    }

    #[test]
    fn naive_capture_without_default_zone_aborts() {
        let dir = tempdir().unwrap();
        let track = write_file(
            dir.path(),
            "two-zones.gpx",
            br#"<gpx><trk><trkseg>
<trkpt lat="0" lon="0"><time>2014-05-03T10:00:00+02:00</time></trkpt>
<trkpt lat="1" lon="1"><time>2014-05-03T10:00:00-05:00</time></trkpt>
</trkseg></trk></gpx>"#,
        );
        let photo = write_file(
            dir.path(),
            "a.jpg",
            &jpeg_with_capture_time("2014:05:03 10:04:00", None),
        );

        assert!(matches!(
            run(&[track, photo], None, false, None),
            Err(Error::IncomparableTimestamps { .. })
        ));
    }

    #[test]
    fn dry_run_writes_nothing_but_reports() {
        let dir = tempdir().unwrap();
        let photo = write_file(dir.path(), "a.jpg", BARE_JPEG);
        let report = dir.path().join("out.json");

        let results = run(&[photo.clone()], Some("1,2,3"), true, Some(&report)).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(fs::read(&photo).unwrap(), BARE_JPEG);
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
        assert_eq!(json[0]["source"], "manual");
        assert_eq!(json[0]["altitude"], 3.0);
    }

    #[test]
    fn walks_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("trip/day1");
        fs::create_dir_all(&nested).unwrap();
        write_file(&nested, "b.JPG", BARE_JPEG);
        write_file(&nested, "track.gpx", b"<gpx/>");
        write_file(dir.path(), "a.jpeg", BARE_JPEG);
        write_file(dir.path(), "notes.txt", b"skip me");

        let (tracks, photos) = collect_inputs(&[dir.path()]).unwrap();

        assert_eq!(tracks, vec![nested.join("track.gpx")]);
        assert_eq!(photos, vec![dir.path().join("a.jpeg"), nested.join("b.JPG")]);
    }
}
