// THEORY:
// The `AnalysisContext` is the shared, explicit configuration every spatial
// component reads. It answers one question for the rest of the engine: "how big
// may a block be, and by how much has the frame been shrunk?"
//
// Key architectural principles:
// 1.  **No hidden globals**: The frame minification factor is a plain field that
//     is passed by reference into the block grid, the controller and the report
//     builder. Two detectors in one process may run with different factors.
// 2.  **Derived limits**: The per-block pixel limit shrinks together with the
//     frame, so a block covers the same physical area of the scene regardless of
//     how aggressively the frame was downscaled.

use serde::{Deserialize, Serialize};

/// Largest block edge, in pixels of an unshrunk frame.
pub const DEFAULT_MAX_BLOCK_SIZE: u32 = 20;

/// Configuration shared by every component that maps pixels to blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisContext {
    /// Linear factor by which incoming frames are shrunk before analysis (>= 1).
    pub frame_minification: u32,
    /// Upper bound on block width for a full-size frame.
    pub max_block_width: u32,
    /// Upper bound on block height for a full-size frame.
    pub max_block_height: u32,
}

impl Default for AnalysisContext {
    fn default() -> Self {
        Self {
            frame_minification: 1,
            max_block_width: DEFAULT_MAX_BLOCK_SIZE,
            max_block_height: DEFAULT_MAX_BLOCK_SIZE,
        }
    }
}

impl AnalysisContext {
    pub fn with_minification(frame_minification: u32) -> Self {
        Self {
            frame_minification,
            ..Self::default()
        }
    }

    /// The minification factor, never below 1.
    pub fn minification(&self) -> u32 {
        self.frame_minification.max(1)
    }

    /// Block width limit after minification; at least one pixel.
    pub fn scaled_max_block_width(&self) -> u32 {
        (self.max_block_width / self.minification()).max(1)
    }

    /// Block height limit after minification; at least one pixel.
    pub fn scaled_max_block_height(&self) -> u32 {
        (self.max_block_height / self.minification()).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let context = AnalysisContext::default();
        assert_eq!(context.scaled_max_block_width(), 20);
        assert_eq!(context.scaled_max_block_height(), 20);
    }

    #[test]
    fn test_minification_shrinks_limits() {
        let context = AnalysisContext::with_minification(4);
        assert_eq!(context.scaled_max_block_width(), 5);
        assert_eq!(context.scaled_max_block_height(), 5);
    }

    #[test]
    fn test_zero_minification_is_treated_as_one() {
        let context = AnalysisContext::with_minification(0);
        assert_eq!(context.minification(), 1);
        assert_eq!(context.scaled_max_block_width(), 20);
    }

    #[test]
    fn test_huge_minification_keeps_one_pixel_blocks() {
        let context = AnalysisContext::with_minification(64);
        assert_eq!(context.scaled_max_block_width(), 1);
        assert_eq!(context.scaled_max_block_height(), 1);
    }
}
