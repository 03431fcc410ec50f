//! Digest manifest parsing.
//!
//! A manifest is an XML document whose root `<digest>` element carries the
//! revision marker in its `timestamp` attribute (Unix seconds) and the patch
//! size in `packageSizeKB`. The whole document must be well-formed; anything
//! else about its structure is ignored.

use bytes::Bytes;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use pitbot_core::{ManifestRecord, Marker};

use crate::error::ParseError;

const ROOT_ELEMENT: &[u8] = b"digest";
const TIMESTAMP_ATTR: &str = "timestamp";
const SIZE_ATTR: &str = "packageSizeKB";

/// Parse a complete manifest body. `raw` is kept verbatim in the record.
pub fn parse_manifest(raw: Bytes) -> Result<ManifestRecord, ParseError> {
    let mut reader = Reader::from_reader(raw.as_ref());
    let mut buf = Vec::new();
    let mut root: Option<(String, Option<String>)> = None;
    let mut depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            ParseError::Malformed(format!("at byte {}: {e}", reader.buffer_position()))
        })?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                if depth == 0 {
                    if root.is_some() {
                        return Err(ParseError::Malformed(
                            "more than one root element".to_string(),
                        ));
                    }
                    root = Some(read_root(e)?);
                }
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                }
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if depth != 0 {
        return Err(ParseError::Malformed(
            "document ends inside an element".to_string(),
        ));
    }

    let (timestamp, size) = root.ok_or(ParseError::Empty)?;

    let marker = Marker::new(timestamp);
    let published_at = marker
        .published_at()
        .ok_or_else(|| ParseError::InvalidAttribute {
            name: TIMESTAMP_ATTR,
            value: marker.to_string(),
        })?;

    let package_size_kb = size
        .map(|s| {
            s.parse::<u64>().map_err(|_| ParseError::InvalidAttribute {
                name: SIZE_ATTR,
                value: s.clone(),
            })
        })
        .transpose()?;

    Ok(ManifestRecord {
        marker,
        published_at,
        package_size_kb,
        raw,
    })
}

/// Check the root element and pull its timestamp and size attributes.
fn read_root(e: &BytesStart<'_>) -> Result<(String, Option<String>), ParseError> {
    if e.local_name().as_ref() != ROOT_ELEMENT {
        return Err(ParseError::UnexpectedRoot {
            found: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
        });
    }

    let mut timestamp = None;
    let mut size = None;
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ParseError::Malformed(err.to_string()))?;
        let key = attr.key.local_name();
        let key = key.as_ref();
        if key != TIMESTAMP_ATTR.as_bytes() && key != SIZE_ATTR.as_bytes() {
            continue;
        }
        let value = attr
            .unescape_value()
            .map_err(|err| ParseError::Malformed(err.to_string()))?
            .trim()
            .to_string();
        if key == TIMESTAMP_ATTR.as_bytes() {
            timestamp = Some(value);
        } else {
            size = Some(value);
        }
    }

    let timestamp = timestamp
        .filter(|t| !t.is_empty())
        .ok_or(ParseError::MissingAttribute(TIMESTAMP_ATTR))?;
    Ok((timestamp, size.filter(|s| !s.is_empty())))
}
