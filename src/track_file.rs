//! Track samples from KML and GPX files.
//!
//! Both formats are reduced to raw `(timestamp, "lon lat [alt]")` pairs;
//! parsing of the values themselves happens in [`crate::track`].

use std::{fs, path::Path};

use log::{debug, warn};
use quick_xml::{events::Event, Reader};

use crate::error::{Error, Result};

/// A timestamp string and a `"lon lat [alt]"` coordinate string.
pub type RawSample = (String, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackFormat {
    Kml,
    Gpx,
}

impl TrackFormat {
    /// Track format by file extension, case-insensitive.
    pub fn from_path(path: &Path) -> Option<TrackFormat> {
        let ext = path.extension()?.to_ascii_lowercase();
        match ext.to_str() {
            Some("kml") => Some(TrackFormat::Kml),
            Some("gpx") => Some(TrackFormat::Gpx),
            _ => None,
        }
    }
}

pub fn read_samples(path: &Path) -> Result<Vec<RawSample>> {
    let format = TrackFormat::from_path(path)
        .ok_or_else(|| Error::track_file(path, "not a .kml or .gpx file"))?;
    let xml = fs::read(path).map_err(|e| Error::track_file(path, e))?;
    let samples = match format {
        TrackFormat::Kml => parse_kml(&xml),
        TrackFormat::Gpx => parse_gpx(&xml),
    }
    .map_err(|e| Error::track_file(path, e))?;

    debug!("Read {} samples from {}", samples.len(), path.display());
    Ok(samples)
}

/// Pool the samples of every track file, in file order.
pub fn read_all<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<RawSample>> {
    let mut samples = Vec::new();
    for path in paths {
        samples.extend(read_samples(path.as_ref())?);
    }
    Ok(samples)
}

/// Samples of every `gx:Track`. The n-th `when` pairs with the n-th
/// `gx:coord` of the same track.
pub fn parse_kml(xml: &[u8]) -> std::result::Result<Vec<RawSample>, quick_xml::Error> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut samples = Vec::new();

    let mut in_track = false;
    let mut whens: Vec<String> = Vec::new();
    let mut coords: Vec<String> = Vec::new();
    let mut text: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => match e.local_name().as_ref() {
                b"Track" => {
                    in_track = true;
                    whens.clear();
                    coords.clear();
                }
                b"when" | b"coord" if in_track => text = Some(String::new()),
                _ => {}
            },
            Event::Text(e) => {
                if let Some(text) = text.as_mut() {
                    text.push_str(&e.unescape()?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"when" if in_track => whens.extend(text.take()),
                b"coord" if in_track => coords.extend(text.take()),
                b"Track" => {
                    in_track = false;
                    if whens.len() != coords.len() {
                        warn!(
                            "gx:Track has {} <when> and {} <gx:coord> elements",
                            whens.len(),
                            coords.len()
                        );
                    }
                    samples.extend(whens.drain(..).zip(coords.drain(..)));
                }
                _ => {}
            },
            _ => {}
        }
        buf.clear();
    }

    Ok(samples)
}

/// Samples of every `trkpt` carrying a `time`.
pub fn parse_gpx(xml: &[u8]) -> std::result::Result<Vec<RawSample>, quick_xml::Error> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut samples = Vec::new();

    let mut point: Option<(String, String)> = None;
    let mut elevation: Option<String> = None;
    let mut time: Option<String> = None;
    let mut text: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => match e.local_name().as_ref() {
                b"trkpt" => {
                    let lat = e.try_get_attribute("lat")?;
                    let lon = e.try_get_attribute("lon")?;
                    point = match (lat, lon) {
                        (Some(lat), Some(lon)) => Some((
                            lat.unescape_value()?.into_owned(),
                            lon.unescape_value()?.into_owned(),
                        )),
                        _ => None,
                    };
                    elevation = None;
                    time = None;
                }
                b"ele" | b"time" if point.is_some() => text = Some(String::new()),
                _ => {}
            },
            Event::Text(e) => {
                if let Some(text) = text.as_mut() {
                    text.push_str(&e.unescape()?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"ele" => elevation = text.take(),
                b"time" => time = text.take(),
                b"trkpt" => {
                    if let (Some((lat, lon)), Some(time)) = (point.take(), time.take()) {
                        let coord = match elevation.take() {
                            Some(ele) => format!("{} {} {}", lon.trim(), lat.trim(), ele.trim()),
                            None => format!("{} {}", lon.trim(), lat.trim()),
                        };
                        samples.push((time, coord));
                    }
                }
                _ => {}
            },
            _ => {}
        }
        buf.clear();
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KML_INTERLEAVED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:gx="http://www.google.com/kml/ext/2.2">
  <Document>
    <Placemark>
      <TimeStamp><when>2014-05-02T00:00:00Z</when></TimeStamp>
      <gx:Track>
        <when>2014-05-03T10:00:00.000-07:00</when>
        <gx:coord>-122.1 37.4 0</gx:coord>
        <when>2014-05-03T10:10:00.000-07:00</when>
        <gx:coord>-122.2 37.5 12</gx:coord>
      </gx:Track>
    </Placemark>
  </Document>
</kml>"#;

    const KML_GROUPED: &str = r#"<kml xmlns:gx="http://www.google.com/kml/ext/2.2">
  <gx:Track>
    <when>2014-05-03T10:00:00Z</when>
    <when>2014-05-03T10:01:00Z</when>
    <gx:coord>1 2 3</gx:coord>
    <gx:coord>4 5 6</gx:coord>
  </gx:Track>
  <gx:Track>
    <when>2014-05-03T11:00:00Z</when>
    <gx:coord>7 8 9</gx:coord>
  </gx:Track>
</kml>"#;

    const GPX: &str = r#"<?xml version="1.0"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><trkseg>
    <trkpt lat="51.5" lon="-0.12"><ele>35.2</ele><time>2014-05-03T10:00:00Z</time></trkpt>
    <trkpt lat="51.6" lon="-0.13"><time>2014-05-03T10:01:00Z</time></trkpt>
    <trkpt lat="51.7" lon="-0.14"><ele>40</ele></trkpt>
  </trkseg></trk>
</gpx>"#;

    fn pairs(samples: &[RawSample]) -> Vec<(&str, &str)> {
        samples
            .iter()
            .map(|(t, c)| (t.as_str(), c.as_str()))
            .collect()
    }

    #[test]
    fn reads_interleaved_kml_track() {
        let samples = parse_kml(KML_INTERLEAVED.as_bytes()).unwrap();
        assert_eq!(
            pairs(&samples),
            vec![
                ("2014-05-03T10:00:00.000-07:00", "-122.1 37.4 0"),
                ("2014-05-03T10:10:00.000-07:00", "-122.2 37.5 12"),
            ]
        );
    }

    #[test]
    fn pairs_grouped_kml_elements_by_position() {
        let samples = parse_kml(KML_GROUPED.as_bytes()).unwrap();
        assert_eq!(
            pairs(&samples),
            vec![
                ("2014-05-03T10:00:00Z", "1 2 3"),
                ("2014-05-03T10:01:00Z", "4 5 6"),
                ("2014-05-03T11:00:00Z", "7 8 9"),
            ]
        );
    }

    #[test]
    fn reads_gpx_track_points() {
        let samples = parse_gpx(GPX.as_bytes()).unwrap();
        assert_eq!(
            pairs(&samples),
            vec![
                ("2014-05-03T10:00:00Z", "-0.12 51.5 35.2"),
                ("2014-05-03T10:01:00Z", "-0.13 51.6"),
            ]
        );
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_gpx(b"<gpx><trk></gpx>").is_err());
    }

    #[test]
    fn detects_format_from_extension() {
        assert_eq!(
            TrackFormat::from_path(Path::new("walk.KML")),
            Some(TrackFormat::Kml)
        );
        assert_eq!(
            TrackFormat::from_path(Path::new("a/b/ride.gpx")),
            Some(TrackFormat::Gpx)
        );
        assert_eq!(TrackFormat::from_path(Path::new("photo.jpg")), None);
        assert_eq!(TrackFormat::from_path(Path::new("README")), None);
    }

    #[test]
    fn reads_track_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("day.gpx");
        fs::write(&path, GPX).unwrap();
        assert_eq!(read_all(&[&path]).unwrap().len(), 2);

        let missing = dir.path().join("missing.kml");
        assert!(matches!(
            read_samples(&missing),
            Err(Error::TrackFile { .. })
        ));
    }
}
