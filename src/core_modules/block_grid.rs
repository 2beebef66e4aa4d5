// THEORY:
// The `BlockGridTracker` is the temporal analysis layer of the left-things
// engine. It owns the 2D grid of `Block`s and turns a stream of per-pixel
// foreground masks into a single, slow-moving answer: which blocks have been
// covered for longer than the supervision duration.
//
// Key architectural principles:
// 1.  **Adaptive geometry**: The grid is not fixed at construction. Every frame,
//     the tracker picks the largest block size that tiles the frame exactly and
//     does not exceed the context's block limit. If the resulting number of
//     blocks differs from the last frame, all history is discarded.
// 2.  **Two passes per frame**: `detect_blocks_with_object` decides, for each
//     block, whether the mask covers it now (more than 95% non-zero pixels).
//     `detect_standing_blocks` then folds that into each block's dwell history.
// 3.  **State Aggregation**: The result is a grid-sized bitmap (0/1 per block)
//     that is the direct input of the region extractor.
// 4.  **Owned scratch**: The bitmap buffer belongs to the tracker and is only
//     reallocated when the grid dimensions change.

use crate::core_modules::block::block::{Block, DwellPolicy};
use crate::core_modules::context::AnalysisContext;
use crate::error::DetectorError;
use chrono::{DateTime, Duration, Utc};
use image::{GrayImage, Luma};
use tracing::debug;

/// Fraction of non-zero mask pixels above which a block counts as covered.
pub const OCCUPANCY_THRESHOLD: f64 = 0.95;

/// Size of the block grid and of a single block, for one frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridGeometry {
    /// Width of a block in pixels.
    pub block_width: u32,
    /// Height of a block in pixels.
    pub block_height: u32,
    /// Number of block columns.
    pub grid_width: u32,
    /// Number of block rows.
    pub grid_height: u32,
}

impl GridGeometry {
    /// Picks the largest block size, bounded by the context, that evenly divides
    /// the frame in each dimension.
    pub fn for_frame(
        frame_width: u32,
        frame_height: u32,
        context: &AnalysisContext,
    ) -> Result<Self, DetectorError> {
        if frame_width == 0 || frame_height == 0 {
            return Err(DetectorError::InputContract(format!(
                "empty frame {}x{}",
                frame_width, frame_height
            )));
        }

        let block_width = largest_divisor_up_to(frame_width, context.scaled_max_block_width());
        let block_height = largest_divisor_up_to(frame_height, context.scaled_max_block_height());

        Ok(Self {
            block_width,
            block_height,
            grid_width: frame_width / block_width,
            grid_height: frame_height / block_height,
        })
    }

    pub fn block_count(&self) -> usize {
        self.grid_width as usize * self.grid_height as usize
    }
}

fn largest_divisor_up_to(length: u32, limit: u32) -> u32 {
    let mut candidate = limit.min(length).max(1);
    while length % candidate != 0 {
        candidate -= 1;
    }
    candidate
}

/// Owns the block grid and its temporal history.
pub struct BlockGridTracker {
    /// Geometry of the last processed frame, if any.
    geometry: Option<GridGeometry>,
    /// One entry per block, row-major. Always `grid_width * grid_height` long.
    blocks: Vec<Block>,
    /// Grid-sized 0/1 image of standing blocks, reused between frames.
    standing_bitmap: GrayImage,
    /// What an uncovered frame does to a block's history.
    policy: DwellPolicy,
}

impl Default for BlockGridTracker {
    fn default() -> Self {
        Self::new(DwellPolicy::default())
    }
}

impl BlockGridTracker {
    pub fn new(policy: DwellPolicy) -> Self {
        Self {
            geometry: None,
            blocks: Vec::new(),
            standing_bitmap: GrayImage::new(0, 0),
            policy,
        }
    }

    /// Recomputes the grid for a frame of the given size. Reallocates the block
    /// array (dropping all history) when the block count changes, and the
    /// bitmap scratch when the grid dimensions change.
    pub fn resize(
        &mut self,
        frame_width: u32,
        frame_height: u32,
        context: &AnalysisContext,
    ) -> Result<GridGeometry, DetectorError> {
        let geometry = GridGeometry::for_frame(frame_width, frame_height, context)?;

        if self.blocks.len() != geometry.block_count() {
            debug!(
                old = self.blocks.len(),
                new = geometry.block_count(),
                "block count changed, resetting block history"
            );
            self.blocks = vec![Block::default(); geometry.block_count()];
        }
        if self.standing_bitmap.dimensions() != (geometry.grid_width, geometry.grid_height) {
            self.standing_bitmap = GrayImage::new(geometry.grid_width, geometry.grid_height);
        }

        self.geometry = Some(geometry);
        Ok(geometry)
    }

    /// Marks each block as occupied or not according to the foreground mask.
    pub fn detect_blocks_with_object(&mut self, mask: &GrayImage) -> Result<(), DetectorError> {
        let geometry = self.geometry.ok_or_else(|| {
            DetectorError::InputContract("block grid used before being sized".to_string())
        })?;
        let expected = (
            geometry.grid_width * geometry.block_width,
            geometry.grid_height * geometry.block_height,
        );
        if mask.dimensions() != expected {
            return Err(DetectorError::InputContract(format!(
                "mask is {}x{}, grid expects {}x{}",
                mask.width(),
                mask.height(),
                expected.0,
                expected.1
            )));
        }

        for grid_y in 0..geometry.grid_height {
            for grid_x in 0..geometry.grid_width {
                let index = (grid_y * geometry.grid_width + grid_x) as usize;
                self.blocks[index].is_occupied = is_object_block(
                    mask,
                    grid_x * geometry.block_width,
                    grid_y * geometry.block_height,
                    geometry.block_width,
                    geometry.block_height,
                );
            }
        }
        Ok(())
    }

    /// Advances every block's dwell history with the current occupancy.
    pub fn detect_standing_blocks(&mut self, timestamp: DateTime<Utc>, supervision: Duration) {
        for block in &mut self.blocks {
            let occupied = block.is_occupied;
            block.observe(occupied, timestamp, supervision, self.policy);
        }
    }

    /// Writes the standing flags into the bitmap scratch and returns it.
    pub fn standing_bitmap(&mut self) -> &GrayImage {
        let grid_width = self.standing_bitmap.width();
        for (index, block) in self.blocks.iter().enumerate() {
            let x = index as u32 % grid_width.max(1);
            let y = index as u32 / grid_width.max(1);
            self.standing_bitmap
                .put_pixel(x, y, Luma([u8::from(block.is_standing)]));
        }
        &self.standing_bitmap
    }

    /// Runs both passes for one frame and returns the standing bitmap.
    pub fn process_mask(
        &mut self,
        mask: &GrayImage,
        timestamp: DateTime<Utc>,
        supervision: Duration,
    ) -> Result<&GrayImage, DetectorError> {
        self.detect_blocks_with_object(mask)?;
        self.detect_standing_blocks(timestamp, supervision);
        Ok(self.standing_bitmap())
    }

    /// Forgets all history and geometry.
    pub fn clear(&mut self) {
        self.geometry = None;
        self.blocks.clear();
        self.standing_bitmap = GrayImage::new(0, 0);
    }

    pub fn geometry(&self) -> Option<GridGeometry> {
        self.geometry
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn policy(&self) -> DwellPolicy {
        self.policy
    }
}

/// A block is occupied when more than 95% of its mask pixels are non-zero.
pub fn is_object_block(mask: &GrayImage, x: u32, y: u32, width: u32, height: u32) -> bool {
    let right = (x + width).min(mask.width());
    let bottom = (y + height).min(mask.height());
    let mut counter: u64 = 0;
    for row in y..bottom {
        for col in x..right {
            if mask.get_pixel(col, row)[0] != 0 {
                counter += 1;
            }
        }
    }
    counter as f64 > (width as f64 * height as f64) * OCCUPANCY_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fill(mask: &mut GrayImage, x: u32, y: u32, width: u32, height: u32) {
        for row in y..y + height {
            for col in x..x + width {
                mask.put_pixel(col, row, Luma([255]));
            }
        }
    }

    #[test]
    fn test_geometry_divides_frame_exactly() {
        let context = AnalysisContext::default();
        for (w, h) in [(640, 480), (641, 479), (37, 23), (1, 1), (100, 7), (1920, 1080)] {
            let geometry = GridGeometry::for_frame(w, h, &context).unwrap();
            assert_eq!(geometry.grid_width * geometry.block_width, w);
            assert_eq!(geometry.grid_height * geometry.block_height, h);
            assert!(geometry.block_width <= 20);
            assert!(geometry.block_height <= 20);
        }
    }

    #[test]
    fn test_geometry_picks_largest_divisor() {
        let geometry = GridGeometry::for_frame(640, 480, &AnalysisContext::default()).unwrap();
        assert_eq!((geometry.block_width, geometry.block_height), (20, 20));
        assert_eq!((geometry.grid_width, geometry.grid_height), (32, 24));

        // 90 = 18 * 5, the largest divisor below 20 is 18.
        let geometry = GridGeometry::for_frame(90, 90, &AnalysisContext::default()).unwrap();
        assert_eq!(geometry.block_width, 18);
    }

    #[test]
    fn test_geometry_respects_minification() {
        let geometry =
            GridGeometry::for_frame(160, 120, &AnalysisContext::with_minification(4)).unwrap();
        assert_eq!((geometry.block_width, geometry.block_height), (5, 5));
    }

    #[test]
    fn test_empty_frame_is_rejected() {
        assert!(GridGeometry::for_frame(0, 10, &AnalysisContext::default()).is_err());
    }

    #[test]
    fn test_occupancy_threshold() {
        let mut mask = GrayImage::new(20, 20);
        fill(&mut mask, 0, 0, 20, 19); // 380 of 400 pixels: exactly 95%, not above.
        assert!(!is_object_block(&mask, 0, 0, 20, 20));

        mask.put_pixel(0, 19, Luma([1]));
        assert!(is_object_block(&mask, 0, 0, 20, 20));
    }

    #[test]
    fn test_resize_reallocates_on_block_count_change() {
        let context = AnalysisContext::default();
        let mut tracker = BlockGridTracker::default();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

        tracker.resize(80, 60, &context).unwrap();
        let mut mask = GrayImage::new(80, 60);
        fill(&mut mask, 0, 0, 20, 20);
        tracker.process_mask(&mask, t0, Duration::seconds(1)).unwrap();
        assert_eq!(tracker.blocks()[0].appear_timestamp, Some(t0));

        // Same frame size keeps history.
        tracker.resize(80, 60, &context).unwrap();
        assert_eq!(tracker.blocks()[0].appear_timestamp, Some(t0));

        // A different grid loses it.
        let geometry = tracker.resize(100, 60, &context).unwrap();
        assert_eq!(tracker.blocks().len(), geometry.block_count());
        assert!(tracker.blocks().iter().all(|b| *b == Block::default()));
    }

    #[test]
    fn test_mask_size_mismatch_is_rejected() {
        let mut tracker = BlockGridTracker::default();
        tracker.resize(80, 60, &AnalysisContext::default()).unwrap();
        let err = tracker
            .detect_blocks_with_object(&GrayImage::new(40, 30))
            .unwrap_err();
        assert!(matches!(err, DetectorError::InputContract(_)));
    }

    #[test]
    fn test_standing_after_supervision_and_reset_on_gap() {
        let context = AnalysisContext::default();
        let supervision = Duration::seconds(10);
        let epsilon = Duration::seconds(1);
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

        let mut covered = GrayImage::new(40, 40);
        fill(&mut covered, 0, 0, 20, 20);
        let empty = GrayImage::new(40, 40);

        let mut tracker = BlockGridTracker::default();
        tracker.resize(40, 40, &context).unwrap();

        // Occupied for (duration - epsilon), one empty frame, then again.
        tracker.process_mask(&covered, t0, supervision).unwrap();
        let bitmap = tracker
            .process_mask(&covered, t0 + supervision - epsilon, supervision)
            .unwrap();
        assert_eq!(bitmap.get_pixel(0, 0)[0], 0);

        tracker.process_mask(&empty, t0 + supervision, supervision).unwrap();
        let restart = t0 + supervision + epsilon;
        tracker.process_mask(&covered, restart, supervision).unwrap();
        let bitmap = tracker
            .process_mask(&covered, restart + supervision - epsilon, supervision)
            .unwrap();
        assert_eq!(bitmap.get_pixel(0, 0)[0], 0);

        // Continuous occupancy past the duration promotes the block.
        let bitmap = tracker
            .process_mask(&covered, restart + supervision + epsilon, supervision)
            .unwrap();
        assert_eq!(bitmap.get_pixel(0, 0)[0], 1);
        assert_eq!(bitmap.get_pixel(1, 0)[0], 0);
        assert_eq!(bitmap.get_pixel(0, 1)[0], 0);
    }

    #[test]
    fn test_standing_is_set_once_and_stays() {
        let context = AnalysisContext::default();
        let supervision = Duration::seconds(2);
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let mut covered = GrayImage::new(20, 20);
        fill(&mut covered, 0, 0, 20, 20);

        let mut tracker = BlockGridTracker::default();
        tracker.resize(20, 20, &context).unwrap();

        let mut transitions = 0;
        let mut was_standing = false;
        for second in 0..10 {
            tracker
                .process_mask(&covered, t0 + Duration::seconds(second), supervision)
                .unwrap();
            let standing = tracker.blocks()[0].is_standing;
            if standing && !was_standing {
                transitions += 1;
            }
            assert!(!(was_standing && !standing));
            was_standing = standing;
        }
        assert_eq!(transitions, 1);
    }

    #[test]
    fn test_clear_drops_geometry() {
        let mut tracker = BlockGridTracker::default();
        tracker.resize(40, 40, &AnalysisContext::default()).unwrap();
        tracker.clear();
        assert!(tracker.geometry().is_none());
        assert!(tracker.blocks().is_empty());
    }
}
