// THEORY:
// The `region_extractor` is the spatial grouping step of the left-things engine.
// It turns the standing-block bitmap produced by the `BlockGridTracker` into a
// list of candidate rectangles, one per outer region of standing blocks.
//
// Algorithm steps:
// 1.  **Padding**: The bitmap is copied into a canvas one cell larger on every
//     side, so regions touching the frame edge still get a closed border.
// 2.  **Border Tracing**: Only the outermost borders are kept. A ring of standing
//     blocks with an empty middle yields one region, not two.
// 3.  **Simplification**: Each border is approximated with a closed
//     Douglas-Peucker pass at `STANDARD_APPROX_LEVEL` cells.
// 4.  **Boxing**: The bounding rectangle of the approximation is shifted back by
//     the padding and becomes a `CandidateRegion`.
// 5.  **Stateless Utility**: Like the rest of the spatial layer this has no memory
//     of previous frames. Ids restart at 1 on every call.

use crate::core_modules::region::CandidateRegion;
use crate::core_modules::utils::contour_helper::contour_helper;
use image::{GrayImage, Luma};

/// Default Douglas-Peucker tolerance, in grid cells.
pub const STANDARD_APPROX_LEVEL: f64 = 3.0;

pub mod region_extractor {
    use super::*;

    /// Finds one candidate rectangle per outer region of non-zero cells.
    pub fn find_regions(bitmap: &GrayImage, approx_level: f64) -> Vec<CandidateRegion> {
        let padded = pad(bitmap);

        let mut regions = Vec::new();
        for contour in contour_helper::outer_contours(&padded) {
            let approximated = contour_helper::approximate_closed(&contour, approx_level);
            let Some(rect) = contour_helper::bounding_rect(&approximated) else {
                continue;
            };
            regions.push(CandidateRegion {
                id: regions.len() as u32 + 1,
                rect: rect.translate(-1, -1),
            });
        }
        regions
    }

    fn pad(bitmap: &GrayImage) -> GrayImage {
        let mut padded = GrayImage::new(bitmap.width() + 2, bitmap.height() + 2);
        for (x, y, pixel) in bitmap.enumerate_pixels() {
            if pixel[0] != 0 {
                padded.put_pixel(x + 1, y + 1, Luma([255]));
            }
        }
        padded
    }
}
