//! Single-channel image frames.
//!
//! Every frame stored in a sequence is 8-bit grayscale. Acquisition hands over
//! frames in whatever depth the processing step produced ([`RawFrame`]); they are
//! normalized with [`Frame::from_raw`] before they are appended.
//!
//! Normalization clamps to `0..=255` without rescaling, so a 16-bit mask with
//! values 0 and 255 stays 0 and 255, and float values are rounded to nearest.

use crate::error::{ResultsError, ResultsResult};
use image::{GrayImage, ImageBuffer, Luma};

/// 16-bit grayscale buffer.
pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;

/// 32-bit float grayscale buffer.
pub type Gray32FImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// A frame as produced by the acquisition pipeline, in its native depth.
#[derive(Debug, Clone)]
pub enum RawFrame {
    /// 8-bit samples
    Gray8(GrayImage),
    /// 16-bit samples
    Gray16(Gray16Image),
    /// 32-bit float samples
    Gray32F(Gray32FImage),
}

/// An 8-bit single-channel frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    image: GrayImage,
}

impl Frame {
    /// Create a frame from 8-bit pixel data.
    ///
    /// Returns `None` when `data.len() != width * height`.
    pub fn from_u8(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        GrayImage::from_raw(width, height, data).map(|image| Self { image })
    }

    /// Create a frame where every pixel has the same value.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            image: GrayImage::from_pixel(width, height, Luma([value])),
        }
    }

    /// Normalize a raw frame to 8 bits.
    pub fn from_raw(raw: &RawFrame) -> Self {
        let image = match raw {
            RawFrame::Gray8(img) => img.clone(),
            RawFrame::Gray16(img) => {
                let (w, h) = img.dimensions();
                GrayImage::from_fn(w, h, |x, y| {
                    let v = img.get_pixel(x, y).0[0];
                    Luma([v.min(u16::from(u8::MAX)) as u8])
                })
            }
            RawFrame::Gray32F(img) => {
                let (w, h) = img.dimensions();
                GrayImage::from_fn(w, h, |x, y| {
                    let v = img.get_pixel(x, y).0[0];
                    Luma([clamp_to_byte(f64::from(v))])
                })
            }
        };
        Self { image }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Raw 8-bit pixel data, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Pixel value at (x, y), or `None` outside the frame.
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        self.image.get_pixel_checked(x, y).map(|p| p.0[0])
    }

    /// Borrow the underlying image buffer.
    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }
}

impl From<GrayImage> for Frame {
    fn from(image: GrayImage) -> Self {
        Self { image }
    }
}

impl From<&RawFrame> for Frame {
    fn from(raw: &RawFrame) -> Self {
        Frame::from_raw(raw)
    }
}

fn clamp_to_byte(v: f64) -> u8 {
    if v.is_nan() {
        return 0;
    }
    v.round().clamp(0.0, 255.0) as u8
}

/// Per-pixel arithmetic mean over a stack of frames, rounded to nearest.
///
/// # Errors
///
/// Returns a configuration error if `frames` is empty or the frames do not all
/// share the same dimensions.
pub fn mean_projection(frames: &[Frame]) -> ResultsResult<Frame> {
    let first = frames.first().ok_or_else(|| {
        ResultsError::Configuration("Cannot project an empty frame stack".to_string())
    })?;
    let (width, height) = (first.width(), first.height());

    if let Some((i, bad)) = frames
        .iter()
        .enumerate()
        .find(|(_, f)| f.width() != width || f.height() != height)
    {
        return Err(ResultsError::Configuration(format!(
            "Frame {} has inconsistent dimensions: {}x{} vs expected {}x{}",
            i,
            bad.width(),
            bad.height(),
            width,
            height
        )));
    }

    let mut sums = vec![0u64; first.as_bytes().len()];
    for frame in frames {
        for (sum, &px) in sums.iter_mut().zip(frame.as_bytes()) {
            *sum += u64::from(px);
        }
    }

    let n = frames.len() as f64;
    let data = sums
        .into_iter()
        .map(|sum| clamp_to_byte(sum as f64 / n))
        .collect();

    Frame::from_u8(width, height, data).ok_or_else(|| {
        ResultsError::Configuration("Projected frame has an invalid buffer size".to_string())
    })
}
