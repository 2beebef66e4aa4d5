// THEORY:
// The `MorphologyFilter` is an optional smoothing pass over the foreground mask.
// An opening removes specks smaller than the structuring element, then a closing
// fills pinholes and narrow cracks inside what survived. Both passes use a 3x3
// square neighbourhood repeated `iterations` times.

use crate::core_modules::frame::check_continuous;
use crate::error::DetectorError;
use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close_mut, open_mut};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const MORPHOLOGY_FILTER_TYPE: &str = "MORPHOLOGY_FILTER";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphologySettings {
    /// Radius of the square neighbourhood; 1 is a 3x3 element.
    pub iterations: u8,
}

impl Default for MorphologySettings {
    fn default() -> Self {
        Self { iterations: 1 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MorphologyFilter {
    settings: MorphologySettings,
}

impl MorphologyFilter {
    pub fn new(settings: MorphologySettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> MorphologySettings {
        self.settings
    }

    pub fn filter_type(&self) -> &'static str {
        MORPHOLOGY_FILTER_TYPE
    }

    /// Returns the opened-then-closed copy of `mask`. Foreground is 255 in the
    /// output regardless of the input's non-zero value.
    pub fn apply(&self, mask: &GrayImage) -> Result<GrayImage, DetectorError> {
        check_continuous(mask)?;

        let mut smoothed = mask.clone();
        for pixel in smoothed.pixels_mut() {
            if pixel[0] != 0 {
                pixel[0] = 255;
            }
        }
        if self.settings.iterations == 0 {
            return Ok(smoothed);
        }

        open_mut(&mut smoothed, Norm::LInf, self.settings.iterations);
        close_mut(&mut smoothed, Norm::LInf, self.settings.iterations);
        debug!(
            width = mask.width(),
            height = mask.height(),
            iterations = self.settings.iterations,
            "morphology applied"
        );
        Ok(smoothed)
    }
}
