// THEORY:
// `core_modules` holds the building blocks of the left-things engine, ordered
// bottom-up: per-frame data (`frame`, `settings`, `context`, `clock`), temporal
// memory (`block`, `block_grid`), mask post-processing (`morphology`,
// `connected_regions`), spatial grouping (`region`, `region_extractor`,
// `rect_merger`) and the pluggable `background_model`. The `detector` module at
// the crate root composes them into a single pipeline.

pub mod background_model;
pub mod block;
pub mod block_grid;
pub mod clock;
pub mod connected_regions;
pub mod context;
pub mod frame;
pub mod morphology;
pub mod rect_merger;
pub mod region;
pub mod region_extractor;
pub mod settings;
pub mod utils;
