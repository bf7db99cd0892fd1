//! EXIF access for target photos: capture time in, GPS fields out.

use std::{
    fs,
    io::{Cursor, Write},
    path::{Path, PathBuf},
};

use chrono::{Datelike, NaiveDateTime, Timelike};
use exif::{experimental::Writer, Exif, Field, In, Rational, Tag, Value};
use log::debug;
use tempfile::NamedTempFile;

use crate::{
    encode::{EncodedAngle, EncodedLocation},
    error::{Error, Result},
    timestamp::Timestamp,
};

const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;
const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// GPS fields to store in a photo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFields {
    pub location: EncodedLocation,
    /// UTC time of the matched track sample, for `GPSTimeStamp` and
    /// `GPSDateStamp`. `None` leaves both untouched.
    pub gps_time: Option<NaiveDateTime>,
}

/// A photo's bytes and its parsed EXIF, if it has any.
pub struct PhotoMetadata {
    path: PathBuf,
    bytes: Vec<u8>,
    exif: Option<Exif>,
}

impl PhotoMetadata {
    /// Load a photo. A JPEG without EXIF loads with empty metadata; any
    /// other read or decode failure is a [`Error::MetadataRead`].
    pub fn open(path: &Path) -> Result<PhotoMetadata> {
        let bytes = fs::read(path).map_err(|e| Error::MetadataRead {
            path: path.to_path_buf(),
            source: Some(exif::Error::Io(e)),
        })?;

        let exif = match exif::Reader::new().read_from_container(&mut Cursor::new(&bytes)) {
            Ok(exif) => Some(exif),
            Err(exif::Error::NotFound(_)) if is_jpeg(&bytes) => {
                debug!("No EXIF segment in {}", path.display());
                None
            }
            Err(e) => {
                return Err(Error::MetadataRead {
                    path: path.to_path_buf(),
                    source: Some(e),
                })
            }
        };

        Ok(PhotoMetadata {
            path: path.to_path_buf(),
            bytes,
            exif,
        })
    }

    /// `DateTimeOriginal`, made timezone-aware by `OffsetTimeOriginal`
    /// when the camera recorded one.
    pub fn capture_time(&self) -> Result<Timestamp> {
        let missing = || Error::MissingCaptureTime {
            path: self.path.clone(),
        };
        let exif = self.exif.as_ref().ok_or_else(missing)?;
        let datetime = ascii_field(exif, Tag::DateTimeOriginal)
            .filter(|text| !text.trim_matches(['\0', ' ']).is_empty())
            .ok_or_else(missing)?;
        let offset = ascii_field(exif, Tag::OffsetTimeOriginal);

        Timestamp::parse_exif(&datetime, offset.as_deref())
    }

    /// Write `fields` into the photo, keeping its other metadata.
    ///
    /// GPS tags that `fields` does not set, such as an altitude from an
    /// earlier write, are kept as they are.
    ///
    /// The new file is written next to the original and renamed over it,
    /// so the photo is either fully updated or left as it was.
    pub fn write_geo_fields(&self, fields: &GeoFields) -> Result<()> {
        if !is_jpeg(&self.bytes) {
            return Err(Error::write_failed(&self.path, "only JPEG files can be written"));
        }

        let gps = gps_fields(fields);
        let tiff = self
            .serialize_with(&gps)
            .map_err(|e| Error::write_failed(&self.path, e))?;
        let jpeg = replace_exif_segment(&self.bytes, &tiff)
            .map_err(|e| Error::write_failed(&self.path, e))?;

        persist(&self.path, &jpeg)
    }

    fn serialize_with(&self, gps: &[Field]) -> std::result::Result<Vec<u8>, exif::Error> {
        let mut writer = Writer::new();
        let mut little_endian = false;

        if let Some(exif) = &self.exif {
            little_endian = exif.little_endian();
            for field in exif.fields() {
                if gps.iter().any(|new| new.tag == field.tag) {
                    continue;
                }
                if let Value::Unknown(..) = field.value {
                    debug!(
                        "Dropping undecodable field {} from {}",
                        field.tag,
                        self.path.display()
                    );
                    continue;
                }
                writer.push_field(field);
            }
            if let Some(thumbnail) = thumbnail(exif) {
                writer.set_jpeg(thumbnail, In::THUMBNAIL);
            }
        }
        for field in gps {
            writer.push_field(field);
        }

        let mut buf = Cursor::new(Vec::new());
        writer.write(&mut buf, little_endian)?;
        Ok(buf.into_inner())
    }
}

fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xD8])
}

fn ascii_field(exif: &Exif, tag: Tag) -> Option<String> {
    match exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(ref values) => values
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

fn thumbnail(exif: &Exif) -> Option<&[u8]> {
    let offset = exif
        .get_field(Tag::JPEGInterchangeFormat, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let len = exif
        .get_field(Tag::JPEGInterchangeFormatLength, In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    exif.buf().get(offset..offset.checked_add(len)?)
}

fn gps_field(tag: Tag, value: Value) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value,
    }
}

fn ascii(text: &str) -> Value {
    Value::Ascii(vec![text.as_bytes().to_vec()])
}

fn rationals(parts: &[(u32, u32)]) -> Value {
    Value::Rational(
        parts
            .iter()
            .map(|&(num, denom)| Rational { num, denom })
            .collect(),
    )
}

fn angle(angle: &EncodedAngle) -> Value {
    rationals(&[(angle.degrees, 1), (angle.minutes, 1), (angle.centiseconds, 100)])
}

fn gps_fields(fields: &GeoFields) -> Vec<Field> {
    let location = &fields.location;
    let mut gps = vec![
        gps_field(Tag::GPSVersionID, Value::Byte(vec![2, 3, 0, 0])),
        gps_field(Tag::GPSLatitudeRef, ascii(&location.latitude.reference.to_string())),
        gps_field(Tag::GPSLatitude, angle(&location.latitude)),
        gps_field(Tag::GPSLongitudeRef, ascii(&location.longitude.reference.to_string())),
        gps_field(Tag::GPSLongitude, angle(&location.longitude)),
    ];
    if let Some(altitude) = location.altitude {
        gps.push(gps_field(Tag::GPSAltitudeRef, Value::Byte(vec![altitude.reference])));
        gps.push(gps_field(Tag::GPSAltitude, rationals(&[(altitude.meters, 1)])));
    }
    if let Some(utc) = fields.gps_time {
        gps.push(gps_field(
            Tag::GPSTimeStamp,
            rationals(&[(utc.hour(), 1), (utc.minute(), 1), (utc.second(), 1)]),
        ));
        let date = format!("{:04}:{:02}:{:02}", utc.year(), utc.month(), utc.day());
        gps.push(gps_field(Tag::GPSDateStamp, ascii(&date)));
    }
    gps
}

/// Swap the APP1 `Exif` segment of a JPEG for one holding `tiff`.
///
/// Without an existing segment the new one goes after any leading APP0
/// (JFIF) segments. Everything from the first SOS on is copied verbatim.
fn replace_exif_segment(jpeg: &[u8], tiff: &[u8]) -> std::result::Result<Vec<u8>, String> {
    if !is_jpeg(jpeg) {
        return Err("not a JPEG file".to_string());
    }
    let segment_len = u16::try_from(2 + EXIF_HEADER.len() + tiff.len())
        .map_err(|_| format!("EXIF data too large for a JPEG segment ({} bytes)", tiff.len()))?;

    let mut app1 = Vec::with_capacity(segment_len as usize + 2);
    app1.extend_from_slice(&[0xFF, APP1]);
    app1.extend_from_slice(&segment_len.to_be_bytes());
    app1.extend_from_slice(EXIF_HEADER);
    app1.extend_from_slice(tiff);

    let mut out = Vec::with_capacity(jpeg.len() + app1.len());
    out.extend_from_slice(&jpeg[..2]);
    let mut app1 = Some(app1);
    let mut pos = 2;

    loop {
        if jpeg.get(pos) != Some(&0xFF) {
            return Err(format!("expected JPEG marker at offset {}", pos));
        }
        // 0xFF fill bytes may precede a marker
        let mut at = pos + 1;
        while jpeg.get(at) == Some(&0xFF) {
            at += 1;
        }
        let marker = *jpeg.get(at).ok_or("truncated JPEG")?;

        if marker == SOS || marker == EOI {
            out.extend(app1.take().unwrap_or_default());
            out.extend_from_slice(&jpeg[pos..]);
            return Ok(out);
        }
        // TEM and RSTn carry no length
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            out.extend_from_slice(&jpeg[pos..=at]);
            pos = at + 1;
            continue;
        }

        let len = match jpeg.get(at + 1..at + 3) {
            Some(len) => u16::from_be_bytes([len[0], len[1]]) as usize,
            None => return Err("truncated JPEG segment header".to_string()),
        };
        let end = at + 1 + len;
        if len < 2 || end > jpeg.len() {
            return Err(format!("truncated JPEG segment at offset {}", pos));
        }

        if marker != APP0 {
            out.extend(app1.take().unwrap_or_default());
        }
        let is_exif = marker == APP1 && jpeg[at + 3..end].starts_with(EXIF_HEADER);
        if !is_exif {
            out.extend_from_slice(&jpeg[pos..end]);
        }
        pos = end;
    }
}

fn persist(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::write_failed(path, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| Error::write_failed(path, e))?;
    if let Ok(metadata) = fs::metadata(path) {
        tmp.as_file()
            .set_permissions(metadata.permissions())
            .map_err(|e| Error::write_failed(path, e))?;
    }
    tmp.persist(path)
        .map_err(|e| Error::write_failed(path, e.error))?;
    Ok(())
}
