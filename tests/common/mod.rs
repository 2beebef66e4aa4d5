#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use image::{GrayImage, Luma, Rgb, RgbImage};
use left_things::core_modules::background_model::BackgroundModel;
use left_things::core_modules::settings::{ConsumedKeys, SettingsMap};
use left_things::{DetectorError, Frame};
use std::sync::{Arc, Mutex};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(seconds)
}

pub fn blank_frame(width: u32, height: u32, timestamp: DateTime<Utc>) -> Frame {
    Frame::new(RgbImage::from_pixel(width, height, Rgb([0, 0, 0])), timestamp)
}

/// A frame-sized mask with `[x0, x1) x [y0, y1)` set to 255.
pub fn rect_mask(width: u32, height: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        if x >= x0 && x < x1 && y >= y0 && y < y1 {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Everything the stub model has been asked to do, shared with the test.
#[derive(Debug, Default)]
pub struct StubLog {
    pub learned: usize,
    pub detected: usize,
    pub resets: usize,
    pub stale_clears: usize,
    pub clears: usize,
    pub learning_delay: Option<u32>,
    /// Keys the model claims in `set_settings`; the first one is reported by
    /// `get_settings`.
    pub claims: Vec<String>,
    pub value: Option<String>,
}

/// A background model that returns a fixed mask and claims a configurable set
/// of settings keys.
pub struct StubModel {
    pub mask: Option<GrayImage>,
    pub log: Arc<Mutex<StubLog>>,
}

impl StubModel {
    pub fn new(mask: Option<GrayImage>, claims: &[&str]) -> (Self, Arc<Mutex<StubLog>>) {
        let log = Arc::new(Mutex::new(StubLog {
            claims: claims.iter().map(|key| key.to_string()).collect(),
            ..StubLog::default()
        }));
        let model = Self {
            mask,
            log: log.clone(),
        };
        (model, log)
    }
}

impl BackgroundModel for StubModel {
    fn learn(&mut self, _frame: &Frame) -> Result<(), DetectorError> {
        self.log.lock().unwrap().learned += 1;
        Ok(())
    }

    fn detect(&mut self, frame: &Frame) -> Result<GrayImage, DetectorError> {
        self.log.lock().unwrap().detected += 1;
        Ok(self
            .mask
            .clone()
            .unwrap_or_else(|| GrayImage::new(frame.width(), frame.height())))
    }

    fn set_learning_delay_seconds(&mut self, seconds: u32) {
        self.log.lock().unwrap().learning_delay = Some(seconds);
    }

    fn reset(&mut self) {
        self.log.lock().unwrap().resets += 1;
    }

    fn clear_stale_entries(&mut self) {
        self.log.lock().unwrap().stale_clears += 1;
    }

    fn clear(&mut self) {
        self.log.lock().unwrap().clears += 1;
    }

    fn set_settings(
        &mut self,
        params: &SettingsMap,
        consumed: &mut ConsumedKeys,
    ) -> Result<(), DetectorError> {
        let mut log = self.log.lock().unwrap();
        for key in log.claims.clone() {
            if let Some(value) = params.get(&key) {
                log.value = Some(value.clone());
                consumed.insert(key);
            }
        }
        Ok(())
    }

    fn get_settings(&self, params: &mut SettingsMap) {
        let log = self.log.lock().unwrap();
        if let (Some(key), Some(value)) = (log.claims.first(), log.value.as_ref()) {
            params.insert(key.clone(), value.clone());
        }
    }

    fn model_type(&self) -> &str {
        "STUB_MODEL"
    }
}

/// A complete, valid settings map for the controller.
pub fn settings(
    interval: i32,
    learning_time: i32,
    morphology: bool,
    connected: bool,
    mode: i64,
) -> SettingsMap {
    [
        ("alertTime", "30".to_string()),
        ("interval", interval.to_string()),
        ("minObjectArea", "0.5".to_string()),
        ("maxObjectArea", "30".to_string()),
        ("startingLearningPercent", "0".to_string()),
        ("startingLearningTime", learning_time.to_string()),
        ("maxMergingGapPercent", "3".to_string()),
        ("morphology", u8::from(morphology).to_string()),
        ("connectedComp", u8::from(connected).to_string()),
        ("mode", mode.to_string()),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect()
}
