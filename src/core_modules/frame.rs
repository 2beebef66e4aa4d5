// THEORY:
// A `Frame` is a "dumb" data container: one decoded RGB picture plus the moment
// it was captured. It is handed to the detector by reference, read, and
// forgotten; nothing in the engine keeps a frame beyond a single `execute` call.
//
// Masks produced by the background model are plain `GrayImage`s. Any non-zero
// value counts as foreground; components that need tightly packed memory check
// it with `check_continuous` before touching the raw buffer.

use crate::error::DetectorError;
use chrono::{DateTime, Utc};
use image::imageops::FilterType;
use image::{GrayImage, RgbImage};

/// Number of interleaved channels every frame carries.
pub const FRAME_CHANNELS: u8 = 3;

/// A decoded video frame with its capture time.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Row-major, tightly packed RGB pixels.
    image: RgbImage,
    /// When the camera captured this frame.
    timestamp: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage, timestamp: DateTime<Utc>) -> Self {
        Self { image, timestamp }
    }

    /// Wraps a raw decoded buffer. The buffer must hold exactly
    /// `width * height * channels` bytes and `channels` must be 3.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, DetectorError> {
        if channels != FRAME_CHANNELS {
            return Err(DetectorError::InputContract(format!(
                "expected {} channels, got {}",
                FRAME_CHANNELS, channels
            )));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(DetectorError::NotContinuous {
                expected,
                actual: data.len(),
            });
        }
        let image = RgbImage::from_raw(width, height, data).ok_or_else(|| {
            DetectorError::InputContract(format!("cannot wrap {}x{} buffer", width, height))
        })?;
        Ok(Self { image, timestamp })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn channels(&self) -> u8 {
        FRAME_CHANNELS
    }

    /// Number of pixels in the frame.
    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns a copy shrunk by `factor` in both dimensions. A factor of 1 is a
    /// plain clone.
    pub fn minified(&self, factor: u32) -> Frame {
        if factor <= 1 {
            return self.clone();
        }
        let width = (self.width() / factor).max(1);
        let height = (self.height() / factor).max(1);
        let image = image::imageops::resize(&self.image, width, height, FilterType::Triangle);
        Frame {
            image,
            timestamp: self.timestamp,
        }
    }
}

/// Fails fast when a mask's backing buffer is not exactly `width * height` bytes.
pub fn check_continuous(mask: &GrayImage) -> Result<(), DetectorError> {
    let expected = mask.width() as usize * mask.height() as usize;
    let actual = mask.as_raw().len();
    if actual != expected {
        return Err(DetectorError::NotContinuous { expected, actual });
    }
    Ok(())
}
