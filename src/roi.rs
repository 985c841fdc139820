//! Region-of-interest decoding.
//!
//! Arena regions are stored as ImageJ `.roi` files next to the experiment
//! preferences. Only the bounding rectangle is needed for provenance, which
//! lives in the fixed 64-byte header:
//!
//! ```text
//! offset  size  field
//!  0       4    magic "Iout"
//!  4       2    version
//!  6       1    roi type
//!  8       2    top     (i16, big endian)
//! 10       2    left
//! 12       2    bottom
//! 14       2    right
//! ```

use crate::error::{ResultsError, ResultsResult};
use std::fmt;
use std::path::Path;

const MAGIC: &[u8; 4] = b"Iout";
const HEADER_SIZE: usize = 64;

/// Bounding rectangle of a region of interest, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiBounds {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width
    pub width: i32,
    /// Height
    pub height: i32,
}

impl fmt::Display for RoiBounds {
    /// Tab-separated `x y width height`, as written into result files.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}\t{}", self.x, self.y, self.width, self.height)
    }
}

/// Decodes the bounding rectangle of a region-of-interest file.
pub trait RoiDecoder: Send + Sync {
    /// Decode the bounding rectangle stored in `path`.
    fn decode(&self, path: &Path) -> ResultsResult<RoiBounds>;
}

/// Decoder for ImageJ `.roi` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageJRoiDecoder;

impl ImageJRoiDecoder {
    /// Decode the bounds from the raw bytes of a `.roi` file.
    pub fn decode_bytes(bytes: &[u8]) -> Result<RoiBounds, String> {
        if bytes.len() < HEADER_SIZE {
            return Err(format!(
                "file too short: {} bytes, header needs {}",
                bytes.len(),
                HEADER_SIZE
            ));
        }
        if &bytes[0..4] != MAGIC {
            return Err("missing Iout magic".to_string());
        }

        let read_i16 = |offset: usize| i32::from(i16::from_be_bytes([bytes[offset], bytes[offset + 1]]));
        let top = read_i16(8);
        let left = read_i16(10);
        let bottom = read_i16(12);
        let right = read_i16(14);

        if right < left || bottom < top {
            return Err(format!(
                "inverted rectangle: left={left} right={right} top={top} bottom={bottom}"
            ));
        }

        Ok(RoiBounds {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        })
    }
}

impl RoiDecoder for ImageJRoiDecoder {
    fn decode(&self, path: &Path) -> ResultsResult<RoiBounds> {
        let bytes = std::fs::read(path).map_err(|e| ResultsError::RoiDecode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::decode_bytes(&bytes).map_err(|reason| ResultsError::RoiDecode {
            path: path.to_path_buf(),
            reason,
        })
    }
}

/// Encode a rectangle ROI header. Used to produce fixtures.
#[cfg(test)]
pub(crate) fn encode_rect(bounds: RoiBounds) -> Vec<u8> {
    let mut bytes = vec![0u8; HEADER_SIZE];
    bytes[0..4].copy_from_slice(MAGIC);
    bytes[4..6].copy_from_slice(&227i16.to_be_bytes());
    bytes[6] = 1; // rectangle
    let put = |bytes: &mut Vec<u8>, offset: usize, v: i32| {
        bytes[offset..offset + 2].copy_from_slice(&(v as i16).to_be_bytes());
    };
    put(&mut bytes, 8, bounds.y);
    put(&mut bytes, 10, bounds.x);
    put(&mut bytes, 12, bounds.y + bounds.height);
    put(&mut bytes, 14, bounds.x + bounds.width);
    bytes
}
