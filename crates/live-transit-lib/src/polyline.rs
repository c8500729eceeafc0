//! Encoded polyline decoding
//!
//! Route shapes often arrive as encoded polyline strings: each coordinate is a zig-zag
//! encoded, 5-decimal fixed-point delta from the previous point, split into 5-bit chunks
//! offset by 63, latitude first.

use crate::{Result, TransitError};
use geo::Coord;

/// Fixed-point scale of the encoding (5 decimals)
const PRECISION: f64 = 1e5;

/// ASCII offset added to each 5-bit chunk
const CHUNK_OFFSET: u8 = 63;

/// Bit marking that another chunk follows
const CONTINUATION_BIT: i64 = 0x20;

/// Decode an encoded polyline into `(longitude, latitude)` coordinates
///
/// An empty string decodes to an empty vector. A truncated value or a character outside
/// the encoding alphabet is an error, never a partially decoded route.
pub fn decode_polyline(encoded: &str) -> Result<Vec<Coord<f64>>> {
    let bytes = encoded.as_bytes();
    let mut coords = Vec::with_capacity(bytes.len() / 4);
    let mut position = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;

    while position < bytes.len() {
        let (delta_lat, next) = decode_value(bytes, position)?;
        let (delta_lng, next) = decode_value(bytes, next)?;
        position = next;

        lat += delta_lat;
        lng += delta_lng;
        coords.push(Coord {
            x: lng as f64 / PRECISION,
            y: lat as f64 / PRECISION,
        });
    }

    Ok(coords)
}

/// Decode one zig-zag value starting at `start`; returns the value and the next offset
fn decode_value(bytes: &[u8], start: usize) -> Result<(i64, usize)> {
    let mut result: i64 = 0;
    let mut shift = 0;
    let mut position = start;

    loop {
        let byte = *bytes
            .get(position)
            .ok_or_else(|| TransitError::PolylineDecode {
                position,
                reason: "truncated value".to_string(),
            })?;

        if !(CHUNK_OFFSET..=CHUNK_OFFSET + 0x3f).contains(&byte) {
            return Err(TransitError::PolylineDecode {
                position,
                reason: format!("invalid character {:?}", byte as char),
            });
        }
        if shift > 60 {
            return Err(TransitError::PolylineDecode {
                position,
                reason: "value overflows 64 bits".to_string(),
            });
        }

        let chunk = i64::from(byte - CHUNK_OFFSET);
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        position += 1;

        if chunk & CONTINUATION_BIT == 0 {
            break;
        }
    }

    let value = if result & 1 == 1 {
        !(result >> 1)
    } else {
        result >> 1
    };
    Ok((value, position))
}
