// THEORY:
// The `detector` module is the top-level API of the left-things engine. It
// wraps the whole stack into one object that is fed frames one at a time and
// answers each with a `Report`.
//
// Key architectural principles:
// 1.  **Three-phase life cycle**: An inactive detector is `Idle`. Switching it on
//     starts `Learning`, during which frames only train the background model.
//     Once the configured learning time has passed on the wall clock, the
//     detector moves to `Classification` and runs the full pipeline.
// 2.  **Pipeline stages**: background separation -> optional morphology ->
//     optional connected-region filter -> block grid dwell tracking -> region
//     extraction -> rectangle merging -> area filter and pixel-space report.
// 3.  **Never throws**: `execute` converts every error, and every panic raised
//     inside the pipeline, into `Report::Error`. The next frame is processed
//     normally.
// 4.  **Transactional settings**: A settings update either applies to both the
//     controller and the background model, or to neither.

use crate::core_modules::background_model::{
    BackgroundModel, RunningAverageModel, RunningAverageSettings,
};
use crate::core_modules::block_grid::{BlockGridTracker, GridGeometry};
use crate::core_modules::clock::{Clock, SystemClock};
use crate::core_modules::connected_regions::{ConnectedRegionFilter, ConnectedRegionSettings};
use crate::core_modules::context::AnalysisContext;
use crate::core_modules::frame::{check_continuous, Frame};
use crate::core_modules::morphology::{MorphologyFilter, MorphologySettings};
use crate::core_modules::rect_merger::RectMerger;
use crate::core_modules::region::MergedRegion;
use crate::core_modules::region_extractor::{region_extractor, STANDARD_APPROX_LEVEL};
use crate::core_modules::settings::{ConsumedKeys, DetectorSettings, SettingsMap};
use crate::error::DetectorError;
use chrono::{DateTime, Duration, Utc};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info, warn};

// Re-export key data structures for the public API.
pub use crate::core_modules::settings::Mode;

pub const LEFT_THINGS_DETECTOR_TYPE: &str = "LEFT_THINGS_DETECTOR";

/// Everything needed to build a detector. Loaded from JSON by the demo runner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub context: AnalysisContext,
    /// Settings the detector starts with and returns to on `off`.
    pub settings: DetectorSettings,
    pub morphology: MorphologySettings,
    pub connected_regions: ConnectedRegionSettings,
    /// Used only when the detector builds its own `RunningAverageModel`.
    pub background: RunningAverageSettings,
}

/// Pixel size of one reported block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockSize {
    pub w: u32,
    pub h: u32,
}

/// A left object in pixel coordinates of the original (unshrunk) frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedObject {
    pub id: u32,
    /// `[x1, y1, x2, y2]`, with `x2`/`y2` one past the last covered pixel.
    pub points: [i64; 4],
}

/// Result of one classification frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeftThingsData {
    pub block_size: BlockSize,
    /// One string of `0`/`1` per grid row; `1` marks a standing block.
    pub data: Vec<String>,
    pub objects: Vec<ReportedObject>,
}

/// The output of the detector for a single frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Report {
    /// Idle or learning; nothing to say.
    Empty,
    LeftThings(LeftThingsData),
    /// The frame could not be processed.
    Error(String),
}

impl Report {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Report::Error(_))
    }

    /// Objects of a classification report; empty for every other variant.
    pub fn objects(&self) -> &[ReportedObject] {
        match self {
            Report::LeftThings(data) => &data.objects,
            _ => &[],
        }
    }
}

/// The abandoned-object detector for a single video stream.
pub struct LeftThingsDetector {
    config: DetectorConfig,
    settings: DetectorSettings,
    mode: Mode,
    prev_mode: Mode,
    is_on: bool,
    /// Wall-clock time of the last `on`; cleared when learning completes.
    activation_time: Option<DateTime<Utc>>,
    background: Box<dyn BackgroundModel>,
    tracker: BlockGridTracker,
    morphology: MorphologyFilter,
    connected_regions: ConnectedRegionFilter,
    clock: Box<dyn Clock>,
}

impl Default for LeftThingsDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl LeftThingsDetector {
    /// Builds a detector backed by a `RunningAverageModel`.
    pub fn new(config: DetectorConfig) -> Self {
        let model = RunningAverageModel::new(config.background);
        Self::with_model(config, Box::new(model))
    }

    pub fn with_model(config: DetectorConfig, background: Box<dyn BackgroundModel>) -> Self {
        Self {
            settings: config.settings.clone(),
            mode: Mode::Idle,
            prev_mode: Mode::Idle,
            is_on: false,
            activation_time: None,
            background,
            tracker: BlockGridTracker::default(),
            morphology: MorphologyFilter::new(config.morphology),
            connected_regions: ConnectedRegionFilter::new(config.connected_regions),
            clock: Box::new(SystemClock),
            config,
        }
    }

    /// Replaces the wall clock used to time the learning phase.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn detector_type(&self) -> &'static str {
        LEFT_THINGS_DETECTOR_TYPE
    }

    /// Whether the detector is switched on.
    pub fn state(&self) -> bool {
        self.is_on
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn context(&self) -> &AnalysisContext {
        &self.config.context
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    /// Learning progress in percent, 0..=100.
    pub fn learning_progress(&self) -> i32 {
        self.settings.starting_learning_percent
    }

    /// Grid geometry of the last classification frame.
    pub fn geometry(&self) -> Option<GridGeometry> {
        self.tracker.geometry()
    }

    pub fn on(&mut self) {
        let now = self.clock.now();
        info!(learning_seconds = self.settings.starting_learning_time, "detector on");
        self.is_on = true;
        self.mode = Mode::Learning;
        self.activation_time = Some(now);
        self.settings.starting_learning_percent = 0;
    }

    /// Switches the detector off and forgets everything it has learned.
    pub fn off(&mut self) {
        info!("detector off");
        self.tracker.clear();
        self.background.clear();
        self.settings = self.config.settings.clone();
        self.mode = Mode::Idle;
        self.prev_mode = Mode::Idle;
        self.activation_time = None;
        self.is_on = false;
    }

    /// Processes one frame. Never fails; problems are reported as
    /// `Report::Error` and the detector stays usable.
    pub fn execute(&mut self, frame: &Frame) -> Report {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.find_standing_objects(frame)));
        match outcome {
            Ok(Ok(report)) => report,
            Ok(Err(err)) => {
                warn!(error = %err, "frame aborted");
                Report::Error(err.to_string())
            }
            Err(payload) => {
                let err = DetectorError::Unidentified(panic_message(payload.as_ref()));
                warn!(error = %err, "panic while processing frame");
                Report::Error(err.to_string())
            }
        }
    }

    /// Applies a settings map to the controller and the background model.
    /// On any error neither side changes.
    pub fn set_settings(&mut self, params: &SettingsMap) -> Result<(), DetectorError> {
        let (staged, mode, controller_keys) = self.settings.parse(params)?;

        let mut snapshot = SettingsMap::new();
        self.background.get_settings(&mut snapshot);

        let mut model_keys = ConsumedKeys::new();
        if let Err(err) = self.background.set_settings(params, &mut model_keys) {
            self.restore_model_settings(&snapshot);
            return Err(err);
        }

        let collisions: Vec<&str> = controller_keys
            .intersection(&model_keys)
            .map(String::as_str)
            .collect();
        if !collisions.is_empty() {
            let err = DetectorError::ParameterCollision {
                detector: LEFT_THINGS_DETECTOR_TYPE.to_string(),
                model: self.background.model_type().to_string(),
                keys: collisions.join(", "),
            };
            self.restore_model_settings(&snapshot);
            return Err(err);
        }

        info!(mode = ?mode, "settings applied");
        self.settings = staged;
        self.mode = mode;
        Ok(())
    }

    /// Controller keys, including the live learning percent and the mode
    /// index, merged with the background model's keys.
    pub fn get_settings(&self) -> SettingsMap {
        let mut params = SettingsMap::new();
        self.settings.write_params(self.mode, &mut params);
        self.background.get_settings(&mut params);
        params
    }

    fn restore_model_settings(&mut self, snapshot: &SettingsMap) {
        let mut ignored = ConsumedKeys::new();
        if let Err(err) = self.background.set_settings(snapshot, &mut ignored) {
            warn!(error = %err, "background model rejected its own settings snapshot");
        }
    }

    fn find_standing_objects(&mut self, frame: &Frame) -> Result<Report, DetectorError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(DetectorError::InputContract(format!(
                "empty frame {}x{}",
                frame.width(),
                frame.height()
            )));
        }
        if !self.is_on {
            return Ok(Report::Empty);
        }

        self.advance_mode();

        if self.prev_mode != self.mode {
            debug!(from = ?self.prev_mode, to = ?self.mode, "mode changed, resetting background model");
            self.background.reset();
            self.background.clear_stale_entries();
        }

        let minification = self.config.context.minification();
        let analysis_frame;
        let frame = if minification > 1 {
            analysis_frame = frame.minified(minification);
            &analysis_frame
        } else {
            frame
        };

        let report = match self.mode {
            Mode::Idle => Report::Empty,
            Mode::Learning => {
                let delay = 1.1 * self.settings.max_supervision_time as f64;
                self.background.set_learning_delay_seconds(delay as u32);
                self.background.learn(frame)?;
                debug!(progress = self.settings.starting_learning_percent, "learned frame");
                Report::Empty
            }
            Mode::Classification => self.classify(frame)?,
        };

        // A failed frame leaves the transition pending so the next one resets again.
        self.prev_mode = self.mode;
        Ok(report)
    }

    /// Moves from learning to classification once the learning time is up and
    /// keeps the progress percentage current.
    fn advance_mode(&mut self) {
        let Some(activated) = self.activation_time else {
            return;
        };
        let elapsed = self.clock.now() - activated;
        let learning_time = Duration::seconds(self.settings.starting_learning_time as i64);

        if self.mode == Mode::Classification || elapsed >= learning_time {
            info!(elapsed_ms = elapsed.num_milliseconds(), "learning finished");
            self.mode = Mode::Classification;
            self.activation_time = None;
            return;
        }

        if self.mode == Mode::Learning {
            let progress = learning_percent(elapsed, self.settings.starting_learning_time);
            self.settings.starting_learning_percent =
                self.settings.starting_learning_percent.max(progress);
        }
    }

    fn classify(&mut self, frame: &Frame) -> Result<Report, DetectorError> {
        let geometry = self
            .tracker
            .resize(frame.width(), frame.height(), &self.config.context)?;
        self.settings.num_block_width = geometry.grid_width;
        self.settings.num_block_height = geometry.grid_height;

        let mut mask = self.background.detect(frame)?;
        if mask.dimensions() != (frame.width(), frame.height()) {
            return Err(DetectorError::BackgroundModel(format!(
                "{} returned a {}x{} mask for a {}x{} frame",
                self.background.model_type(),
                mask.width(),
                mask.height(),
                frame.width(),
                frame.height()
            )));
        }
        check_continuous(&mask)?;
        debug!(width = mask.width(), height = mask.height(), "foreground mask ready");

        if self.settings.use_morphology {
            mask = self.morphology.apply(&mask)?;
        }
        if self.settings.use_connected_comp {
            mask = self.connected_regions.apply(&mask)?;
        }

        let supervision = Duration::seconds(self.settings.max_supervision_time as i64);
        let bitmap = self
            .tracker
            .process_mask(&mask, frame.timestamp(), supervision)?
            .clone();

        let candidates = region_extractor::find_regions(&bitmap, STANDARD_APPROX_LEVEL);
        let merger = RectMerger::for_grid(geometry.grid_width, geometry.grid_height);
        let gap = self.settings.max_merging_gap_percent * geometry.grid_width as i32 / 100;
        let merged = merger.merge(&candidates, gap);

        let objects = self.reportable_objects(&merged, &geometry, frame.area());
        debug!(
            candidates = candidates.len(),
            merged = merged.len(),
            reported = objects.len(),
            "classification frame done"
        );

        let minification = self.config.context.minification();
        Ok(Report::LeftThings(LeftThingsData {
            block_size: BlockSize {
                w: geometry.block_width * minification,
                h: geometry.block_height * minification,
            },
            data: bitmap_rows(&bitmap),
            objects,
        }))
    }

    /// Drops regions outside the configured area bounds and converts the rest
    /// to pixel coordinates of the original frame.
    fn reportable_objects(
        &self,
        merged: &[MergedRegion],
        geometry: &GridGeometry,
        frame_area: u64,
    ) -> Vec<ReportedObject> {
        let min_area = (self.settings.min_object_area * frame_area as f64 / 100.0) as i64;
        let max_area = (self.settings.max_object_area * frame_area as f64 / 100.0) as i64;
        let block_area = geometry.block_width as i64 * geometry.block_height as i64;
        let scale_x = geometry.block_width as i64 * self.config.context.minification() as i64;
        let scale_y = geometry.block_height as i64 * self.config.context.minification() as i64;

        merged
            .iter()
            .filter(|region| {
                let area = block_area * region.rect.area();
                min_area <= area && area <= max_area
            })
            .map(|region| ReportedObject {
                id: region.id,
                points: [
                    region.rect.x as i64 * scale_x,
                    region.rect.y as i64 * scale_y,
                    region.rect.right() as i64 * scale_x,
                    region.rect.bottom() as i64 * scale_y,
                ],
            })
            .collect()
    }
}

/// ceil(elapsed_ms * 0.1 / learning_seconds), capped at 100.
fn learning_percent(elapsed: Duration, learning_seconds: i32) -> i32 {
    if learning_seconds <= 0 {
        return 100;
    }
    let elapsed_ms = elapsed.num_milliseconds().max(0) as f64;
    let percent = (elapsed_ms * 0.1 / learning_seconds as f64).ceil();
    percent.min(100.0) as i32
}

fn bitmap_rows(bitmap: &GrayImage) -> Vec<String> {
    bitmap
        .rows()
        .map(|row| {
            row.map(|pixel| if pixel[0] != 0 { '1' } else { '0' })
                .collect()
        })
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::clock::ManualClock;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_learning_percent_rounds_up_and_caps() {
        assert_eq!(learning_percent(Duration::milliseconds(0), 10), 0);
        assert_eq!(learning_percent(Duration::milliseconds(1), 10), 1);
        assert_eq!(learning_percent(Duration::milliseconds(5000), 10), 50);
        assert_eq!(learning_percent(Duration::seconds(60), 10), 100);
        assert_eq!(learning_percent(Duration::seconds(1), 0), 100);
    }

    #[test]
    fn test_bitmap_rows() {
        let mut bitmap = GrayImage::new(3, 2);
        bitmap.put_pixel(1, 0, image::Luma([1]));
        bitmap.put_pixel(2, 1, image::Luma([1]));
        assert_eq!(bitmap_rows(&bitmap), vec!["010".to_string(), "001".to_string()]);
    }

    #[test]
    fn test_new_detector_is_idle_and_off() {
        let detector = LeftThingsDetector::default();
        assert!(!detector.state());
        assert_eq!(detector.mode(), Mode::Idle);
        assert_eq!(detector.detector_type(), "LEFT_THINGS_DETECTOR");
    }

    #[test]
    fn test_progress_never_decreases() {
        let clock = ManualClock::new(t0());
        let mut detector =
            LeftThingsDetector::default().with_clock(Box::new(clock.clone()));
        detector.on();

        clock.advance(Duration::seconds(4));
        detector.advance_mode();
        assert_eq!(detector.learning_progress(), 40);

        // A clock step backwards must not lower the reported progress.
        clock.set(t0() + Duration::seconds(2));
        detector.advance_mode();
        assert_eq!(detector.learning_progress(), 40);
    }

    #[test]
    fn test_panic_message_is_extracted() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }

    #[test]
    fn test_report_json_shape() {
        let report = Report::LeftThings(LeftThingsData {
            block_size: BlockSize { w: 20, h: 20 },
            data: vec!["01".to_string()],
            objects: vec![ReportedObject {
                id: 1,
                points: [20, 0, 40, 20],
            }],
        });
        let json = report.to_json().unwrap();
        assert!(json.starts_with("{\"left_things\":"));
        assert!(json.contains("\"points\":[20,0,40,20]"));
        assert_eq!(Report::Empty.to_json().unwrap(), "\"empty\"");
    }
}
