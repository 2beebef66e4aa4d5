// THEORY:
// Settings arrive from the outside world as a flat `name -> text` map. The
// `DetectorSettings` module turns that map into typed values, and it does so
// transactionally: parsing always happens into a fresh staging copy, and the
// caller swaps it in only after every key (and every collaborator) agreed.
//
// Key architectural principles:
// 1.  **Strict parsing**: Every value goes through Rust's `str::parse`, which
//     accepts no trailing garbage. A failure names the offending key.
// 2.  **Ownership bookkeeping**: Parsing reports the set of keys it consumed so
//     the controller can detect a parameter claimed by two components.
// 3.  **Round-tripping**: `write_params` emits the same key names `parse` reads.

use crate::error::DetectorError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// The textual settings map exchanged with the outside world.
pub type SettingsMap = BTreeMap<String, String>;

/// Names of the settings a component consumed.
pub type ConsumedKeys = BTreeSet<String>;

pub const KEY_ALERT_TIME: &str = "alertTime";
pub const KEY_INTERVAL: &str = "interval";
pub const KEY_MIN_OBJECT_AREA: &str = "minObjectArea";
pub const KEY_MAX_OBJECT_AREA: &str = "maxObjectArea";
pub const KEY_STARTING_LEARNING_PERCENT: &str = "startingLearningPercent";
pub const KEY_STARTING_LEARNING_TIME: &str = "startingLearningTime";
pub const KEY_MAX_MERGING_GAP_PERCENT: &str = "maxMergingGapPercent";
pub const KEY_MORPHOLOGY: &str = "morphology";
pub const KEY_CONNECTED_COMP: &str = "connectedComp";
pub const KEY_MODE: &str = "mode";

/// Operating mode of a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Switched off; frames produce empty reports.
    Idle,
    /// Feeding the background model only.
    Learning,
    /// Running the full detection pipeline.
    Classification,
}

impl Mode {
    pub const COUNT: i64 = 3;

    pub fn from_index(index: i64) -> Result<Self, DetectorError> {
        match index {
            0 => Ok(Mode::Idle),
            1 => Ok(Mode::Learning),
            2 => Ok(Mode::Classification),
            _ => Err(DetectorError::InvalidMode(index)),
        }
    }

    pub fn index(self) -> i64 {
        match self {
            Mode::Idle => 0,
            Mode::Learning => 1,
            Mode::Classification => 2,
        }
    }
}

/// Tunable parameters of the left-things detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Interval, in seconds, at which left things are re-announced.
    pub alert_time: i32,
    /// How long, in seconds, a block must stay occupied to count as standing.
    pub max_supervision_time: i32,
    /// Grid width in blocks, as of the last classification frame.
    pub num_block_width: u32,
    /// Grid height in blocks, as of the last classification frame.
    pub num_block_height: u32,
    /// Smallest reportable object, percent of frame area.
    pub min_object_area: f64,
    /// Largest reportable object, percent of frame area.
    pub max_object_area: f64,
    /// Duration of the initial learning phase, in seconds.
    pub starting_learning_time: i32,
    /// Largest gap between candidate rectangles that still merges them,
    /// percent of the grid width.
    pub max_merging_gap_percent: i32,
    /// Progress of the initial learning phase, 0..=100.
    pub starting_learning_percent: i32,
    /// Run the morphology smoother on the foreground mask.
    pub use_morphology: bool,
    /// Run the connected-region filter on the foreground mask.
    pub use_connected_comp: bool,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            alert_time: 30,
            max_supervision_time: 10,
            num_block_width: 16,
            num_block_height: 16,
            min_object_area: 0.5,
            max_object_area: 30.0,
            starting_learning_time: 10,
            max_merging_gap_percent: 3,
            starting_learning_percent: 0,
            use_morphology: false,
            use_connected_comp: true,
        }
    }
}

impl DetectorSettings {
    /// Parses every controller-owned key from `params` into a new settings value
    /// based on `self`. Returns the staged settings, the requested mode and the
    /// consumed key names. `self` is never modified.
    pub fn parse(
        &self,
        params: &SettingsMap,
    ) -> Result<(DetectorSettings, Mode, ConsumedKeys), DetectorError> {
        let mut staged = self.clone();
        let mut consumed = ConsumedKeys::new();

        staged.alert_time = required(params, KEY_ALERT_TIME, &mut consumed)?;
        staged.max_supervision_time = required(params, KEY_INTERVAL, &mut consumed)?;
        staged.min_object_area = required(params, KEY_MIN_OBJECT_AREA, &mut consumed)?;
        staged.max_object_area = required(params, KEY_MAX_OBJECT_AREA, &mut consumed)?;
        staged.starting_learning_percent =
            required(params, KEY_STARTING_LEARNING_PERCENT, &mut consumed)?;
        staged.starting_learning_time = required(params, KEY_STARTING_LEARNING_TIME, &mut consumed)?;
        staged.max_merging_gap_percent =
            required(params, KEY_MAX_MERGING_GAP_PERCENT, &mut consumed)?;
        staged.use_morphology = required_flag(params, KEY_MORPHOLOGY, &mut consumed)?;
        staged.use_connected_comp = required_flag(params, KEY_CONNECTED_COMP, &mut consumed)?;
        let mode_index: i64 = required(params, KEY_MODE, &mut consumed)?;
        let mode = Mode::from_index(mode_index)?;

        staged.validate()?;
        Ok((staged, mode, consumed))
    }

    fn validate(&self) -> Result<(), DetectorError> {
        non_negative(KEY_ALERT_TIME, self.alert_time)?;
        non_negative(KEY_INTERVAL, self.max_supervision_time)?;
        non_negative(KEY_STARTING_LEARNING_TIME, self.starting_learning_time)?;
        percent(KEY_STARTING_LEARNING_PERCENT, self.starting_learning_percent as f64)?;
        percent(KEY_MAX_MERGING_GAP_PERCENT, self.max_merging_gap_percent as f64)?;
        percent(KEY_MIN_OBJECT_AREA, self.min_object_area)?;
        percent(KEY_MAX_OBJECT_AREA, self.max_object_area)?;
        if self.min_object_area > self.max_object_area {
            return Err(DetectorError::OutOfRange {
                key: KEY_MIN_OBJECT_AREA.to_string(),
                reason: format!(
                    "{} exceeds {} {}",
                    self.min_object_area, KEY_MAX_OBJECT_AREA, self.max_object_area
                ),
            });
        }
        Ok(())
    }

    /// Writes the controller-owned keys into `params`.
    pub fn write_params(&self, mode: Mode, params: &mut SettingsMap) {
        params.insert(KEY_ALERT_TIME.to_string(), self.alert_time.to_string());
        params.insert(KEY_INTERVAL.to_string(), self.max_supervision_time.to_string());
        params.insert(KEY_MIN_OBJECT_AREA.to_string(), self.min_object_area.to_string());
        params.insert(KEY_MAX_OBJECT_AREA.to_string(), self.max_object_area.to_string());
        params.insert(
            KEY_STARTING_LEARNING_TIME.to_string(),
            self.starting_learning_time.to_string(),
        );
        params.insert(
            KEY_MAX_MERGING_GAP_PERCENT.to_string(),
            self.max_merging_gap_percent.to_string(),
        );
        params.insert(KEY_MODE.to_string(), mode.index().to_string());
        params.insert(
            KEY_STARTING_LEARNING_PERCENT.to_string(),
            self.starting_learning_percent.to_string(),
        );
        params.insert(KEY_MORPHOLOGY.to_string(), flag(self.use_morphology));
        params.insert(KEY_CONNECTED_COMP.to_string(), flag(self.use_connected_comp));
    }
}

/// Looks up `key` and parses it strictly, recording the key as consumed.
pub fn required<T: FromStr>(
    params: &SettingsMap,
    key: &str,
    consumed: &mut ConsumedKeys,
) -> Result<T, DetectorError> {
    let raw = params
        .get(key)
        .ok_or_else(|| DetectorError::MissingParameter(key.to_string()))?;
    let value = raw.parse::<T>().map_err(|_| DetectorError::InvalidParameter {
        key: key.to_string(),
        value: raw.clone(),
    })?;
    consumed.insert(key.to_string());
    Ok(value)
}

fn required_flag(
    params: &SettingsMap,
    key: &str,
    consumed: &mut ConsumedKeys,
) -> Result<bool, DetectorError> {
    match required::<i32>(params, key, consumed)? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(DetectorError::InvalidParameter {
            key: key.to_string(),
            value: params.get(key).cloned().unwrap_or_default(),
        }),
    }
}

fn flag(value: bool) -> String {
    let text = if value { "1" } else { "0" };
    text.to_string()
}

fn non_negative(key: &str, value: i32) -> Result<(), DetectorError> {
    if value < 0 {
        return Err(DetectorError::OutOfRange {
            key: key.to_string(),
            reason: format!("{} is negative", value),
        });
    }
    Ok(())
}

fn percent(key: &str, value: f64) -> Result<(), DetectorError> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(DetectorError::OutOfRange {
            key: key.to_string(),
            reason: format!("{} is not a percentage", value),
        });
    }
    Ok(())
}
