// THEORY:
// The background model is the engine's only source of per-pixel evidence. It
// watches the scene, keeps an estimate of what the empty scene looks like, and
// turns every classification frame into a foreground mask. Everything above it
// (blocks, regions, merging) reasons only about that mask.
//
// The detector talks to the model through the `BackgroundModel` trait so the
// separation algorithm can be swapped at construction time. `RunningAverageModel`
// is the reference implementation:
// 1.  **Learning**: every frame is blended into a per-pixel luma estimate. The
//     first frame seeds the estimate, later frames refine it as a running mean.
// 2.  **Detection**: a pixel further than `threshold` from its estimate is
//     foreground. Background pixels keep adapting at `learning_rate`.
// 3.  **Absorption**: a pixel that stays foreground for longer than the learning
//     delay is accepted as the new background. This is what eventually makes a
//     left object disappear from the mask after it has been reported.

use crate::core_modules::frame::Frame;
use crate::core_modules::settings::{ConsumedKeys, SettingsMap};
use crate::error::DetectorError;
use chrono::{DateTime, Duration, Utc};
use image::{imageops, GrayImage, Luma};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

pub const RUNNING_AVERAGE_MODEL_TYPE: &str = "RUNNING_AVERAGE_MODEL";
pub const KEY_BG_THRESHOLD: &str = "bgThreshold";
pub const KEY_BG_LEARNING_RATE: &str = "bgLearningRate";

/// Pixels with less background support than this are forgotten by
/// `clear_stale_entries`.
const MIN_SUPPORT: u32 = 2;

/// A pluggable background-separation algorithm.
pub trait BackgroundModel: Send {
    /// Feeds one frame of the empty scene into the model.
    fn learn(&mut self, frame: &Frame) -> Result<(), DetectorError>;

    /// Returns a single-channel mask, frame-sized, non-zero where the frame
    /// differs from the learned background.
    fn detect(&mut self, frame: &Frame) -> Result<GrayImage, DetectorError>;

    /// How long a pixel may stay foreground before it is absorbed.
    fn set_learning_delay_seconds(&mut self, seconds: u32);

    /// Resets adaptive parameters such as foreground timers.
    fn reset(&mut self);

    /// Drops entries with too little evidence behind them.
    fn clear_stale_entries(&mut self);

    /// Forgets everything learned.
    fn clear(&mut self);

    /// Parses the keys this model owns from `params`, recording them in
    /// `consumed`. On error the model's settings are unchanged.
    fn set_settings(
        &mut self,
        params: &SettingsMap,
        consumed: &mut ConsumedKeys,
    ) -> Result<(), DetectorError>;

    /// Writes the keys this model owns into `params`.
    fn get_settings(&self, params: &mut SettingsMap);

    fn model_type(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunningAverageSettings {
    /// Luma difference above which a pixel is foreground.
    pub threshold: u8,
    /// Percent of the difference folded into the estimate per background frame.
    pub learning_rate: u8,
}

impl Default for RunningAverageSettings {
    fn default() -> Self {
        Self {
            threshold: 30,
            learning_rate: 5,
        }
    }
}

/// Per-pixel running-average background model over frame luma.
#[derive(Debug, Clone, Default)]
pub struct RunningAverageModel {
    settings: RunningAverageSettings,
    learning_delay_seconds: u32,
    width: u32,
    height: u32,
    /// Background luma estimate per pixel.
    background: Vec<f32>,
    /// Frames in which each pixel was observed as background. Zero means the
    /// pixel has no estimate and is seeded by the next frame.
    support: Vec<u32>,
    /// Start of the current foreground run per pixel.
    foreground_since: Vec<Option<DateTime<Utc>>>,
}

impl RunningAverageModel {
    pub fn new(settings: RunningAverageSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> RunningAverageSettings {
        self.settings
    }

    pub fn learning_delay_seconds(&self) -> u32 {
        self.learning_delay_seconds
    }

    /// True once the model holds an estimate for a frame of this size.
    pub fn is_seeded_for(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height && !self.background.is_empty()
    }

    fn reseed_if_resized(&mut self, luma: &GrayImage) {
        if self.is_seeded_for(luma.width(), luma.height()) {
            return;
        }
        debug!(
            width = luma.width(),
            height = luma.height(),
            "background model seeded for new frame size"
        );
        let count = luma.width() as usize * luma.height() as usize;
        self.width = luma.width();
        self.height = luma.height();
        self.background = vec![0.0; count];
        self.support = vec![0; count];
        self.foreground_since = vec![None; count];
    }

    fn rate(&self) -> f32 {
        self.settings.learning_rate as f32 / 100.0
    }
}

fn luma_of(frame: &Frame) -> GrayImage {
    imageops::grayscale(frame.image())
}

impl BackgroundModel for RunningAverageModel {
    fn learn(&mut self, frame: &Frame) -> Result<(), DetectorError> {
        let luma = luma_of(frame);
        self.reseed_if_resized(&luma);

        let rate = self.rate();
        for (index, pixel) in luma.pixels().enumerate() {
            let value = pixel[0] as f32;
            let support = self.support[index];
            let alpha = if support == 0 {
                1.0
            } else {
                rate.max(1.0 / (support as f32 + 1.0))
            };
            self.background[index] += alpha * (value - self.background[index]);
            self.support[index] = support.saturating_add(1);
            self.foreground_since[index] = None;
        }
        Ok(())
    }

    fn detect(&mut self, frame: &Frame) -> Result<GrayImage, DetectorError> {
        let luma = luma_of(frame);
        self.reseed_if_resized(&luma);

        let timestamp = frame.timestamp();
        let delay = Duration::seconds(self.learning_delay_seconds as i64);
        let threshold = self.settings.threshold as f32;
        let rate = self.rate();

        let mut mask = GrayImage::new(luma.width(), luma.height());
        let mut absorbed = 0usize;
        for (index, (pixel, out)) in luma.pixels().zip(mask.pixels_mut()).enumerate() {
            let value = pixel[0] as f32;

            if self.support[index] == 0 {
                self.background[index] = value;
                self.support[index] = 1;
                continue;
            }

            if (value - self.background[index]).abs() <= threshold {
                self.background[index] += rate * (value - self.background[index]);
                self.support[index] = self.support[index].saturating_add(1);
                self.foreground_since[index] = None;
                continue;
            }

            let since = *self.foreground_since[index].get_or_insert(timestamp);
            if self.learning_delay_seconds > 0 && timestamp - since > delay {
                self.background[index] = value;
                self.support[index] = 1;
                self.foreground_since[index] = None;
                absorbed += 1;
                continue;
            }
            *out = Luma([255]);
        }

        if absorbed > 0 {
            debug!(absorbed, "foreground pixels absorbed into background");
        }
        Ok(mask)
    }

    fn set_learning_delay_seconds(&mut self, seconds: u32) {
        self.learning_delay_seconds = seconds;
    }

    fn reset(&mut self) {
        self.foreground_since.iter_mut().for_each(|since| *since = None);
    }

    fn clear_stale_entries(&mut self) {
        let mut forgotten = 0usize;
        for (support, since) in self.support.iter_mut().zip(self.foreground_since.iter_mut()) {
            if *support > 0 && *support < MIN_SUPPORT {
                *support = 0;
                *since = None;
                forgotten += 1;
            }
        }
        if forgotten > 0 {
            debug!(forgotten, "stale background entries cleared");
        }
    }

    fn clear(&mut self) {
        let settings = self.settings;
        *self = Self::new(settings);
    }

    fn set_settings(
        &mut self,
        params: &SettingsMap,
        consumed: &mut ConsumedKeys,
    ) -> Result<(), DetectorError> {
        let mut staged = self.settings;
        let mut claimed = ConsumedKeys::new();

        if let Some(threshold) = optional::<i64>(params, KEY_BG_THRESHOLD, &mut claimed)? {
            staged.threshold = in_range(KEY_BG_THRESHOLD, threshold, 255)?;
        }
        if let Some(rate) = optional::<i64>(params, KEY_BG_LEARNING_RATE, &mut claimed)? {
            staged.learning_rate = in_range(KEY_BG_LEARNING_RATE, rate, 100)?;
        }

        self.settings = staged;
        consumed.extend(claimed);
        Ok(())
    }

    fn get_settings(&self, params: &mut SettingsMap) {
        params.insert(
            KEY_BG_THRESHOLD.to_string(),
            self.settings.threshold.to_string(),
        );
        params.insert(
            KEY_BG_LEARNING_RATE.to_string(),
            self.settings.learning_rate.to_string(),
        );
    }

    fn model_type(&self) -> &str {
        RUNNING_AVERAGE_MODEL_TYPE
    }
}

/// Parses `key` when present. Absent keys keep their current value.
fn optional<T: FromStr>(
    params: &SettingsMap,
    key: &str,
    consumed: &mut ConsumedKeys,
) -> Result<Option<T>, DetectorError> {
    let Some(raw) = params.get(key) else {
        return Ok(None);
    };
    let value = raw.parse::<T>().map_err(|_| DetectorError::InvalidParameter {
        key: key.to_string(),
        value: raw.clone(),
    })?;
    consumed.insert(key.to_string());
    Ok(Some(value))
}

fn in_range(key: &str, value: i64, max: i64) -> Result<u8, DetectorError> {
    if !(0..=max).contains(&value) {
        return Err(DetectorError::OutOfRange {
            key: key.to_string(),
            reason: format!("{} is outside 0..={}", value, max),
        });
    }
    u8::try_from(value).map_err(|_| DetectorError::OutOfRange {
        key: key.to_string(),
        reason: format!("{} does not fit a byte", value),
    })
}
