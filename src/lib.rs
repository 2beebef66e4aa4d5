// THEORY:
// This file is the main entry point for the `left_things` library crate. It
// exports the `LeftThingsDetector` and its associated data structures
// (`DetectorConfig`, `Report`, `Frame`, the settings map) as the high-level
// interface of the abandoned-object engine, plus the `StreamPool` that runs one
// detector per camera stream.
//
// The building blocks live in `core_modules` and are public so that alternative
// background models and tools can be assembled from them.

pub mod core_modules;
pub mod detector;
pub mod error;
pub mod stream_pool;

pub use core_modules::frame::Frame;
pub use core_modules::settings::{Mode, SettingsMap};
pub use detector::{DetectorConfig, LeftThingsDetector, Report};
pub use error::DetectorError;
pub use stream_pool::{StreamError, StreamPool};
