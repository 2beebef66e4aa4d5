// THEORY:
// The `ConnectedRegionFilter` rebuilds the foreground mask from its significant
// outlines. Every outer region is traced; outlines with a perimeter too small
// relative to the frame are dropped as noise; the rest are simplified and
// painted back, filled, into a fresh mask. Holes and ragged edges disappear
// along with the noise.

use crate::core_modules::frame::check_continuous;
use crate::core_modules::utils::contour_helper::contour_helper::{self, Contour};
use crate::error::DetectorError;
use image::{GrayImage, Luma};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::geometry::convex_hull;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CONNECTED_REGION_FILTER_TYPE: &str = "CONNECTED_COMPONENTS_FILTER";

const FOREGROUND: Luma<u8> = Luma([255]);

/// How a surviving outline is simplified before it is redrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RefinementMethod {
    /// Douglas-Peucker approximation at `approx_level`.
    #[default]
    Approx,
    ConvexHull,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectedRegionSettings {
    pub approx_level: f64,
    pub method: RefinementMethod,
    /// Outlines shorter than `(width + height) / perim_scale` are discarded.
    pub perim_scale: f64,
}

impl Default for ConnectedRegionSettings {
    fn default() -> Self {
        Self {
            approx_level: 2.0,
            method: RefinementMethod::Approx,
            perim_scale: 20.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectedRegionFilter {
    settings: ConnectedRegionSettings,
}

impl ConnectedRegionFilter {
    pub fn new(settings: ConnectedRegionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> ConnectedRegionSettings {
        self.settings
    }

    pub fn filter_type(&self) -> &'static str {
        CONNECTED_REGION_FILTER_TYPE
    }

    pub fn apply(&self, mask: &GrayImage) -> Result<GrayImage, DetectorError> {
        check_continuous(mask)?;

        let min_perimeter = if self.settings.perim_scale > 0.0 {
            (mask.width() + mask.height()) as f64 / self.settings.perim_scale
        } else {
            0.0
        };

        let mut result = GrayImage::new(mask.width(), mask.height());
        let mut kept = 0usize;
        let mut dropped = 0usize;
        for contour in contour_helper::outer_contours(mask) {
            if contour_helper::closed_perimeter(&contour) < min_perimeter {
                dropped += 1;
                continue;
            }
            let refined = self.refine(&contour);
            fill_polygon(&mut result, &refined);
            kept += 1;
        }

        debug!(kept, dropped, "connected regions filtered");
        Ok(result)
    }

    fn refine(&self, contour: &[imageproc::point::Point<i32>]) -> Contour {
        match self.settings.method {
            RefinementMethod::Approx => {
                contour_helper::approximate_closed(contour, self.settings.approx_level)
            }
            RefinementMethod::ConvexHull => convex_hull(contour),
        }
    }
}

/// Paints a filled polygon including its outline.
fn fill_polygon(canvas: &mut GrayImage, polygon: &[imageproc::point::Point<i32>]) {
    let mut points: Vec<_> = polygon.to_vec();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }

    match points.len() {
        0 => {}
        1 => {
            let point = points[0];
            if point.x >= 0
                && point.y >= 0
                && (point.x as u32) < canvas.width()
                && (point.y as u32) < canvas.height()
            {
                canvas.put_pixel(point.x as u32, point.y as u32, FOREGROUND);
            }
        }
        _ => {
            if points.len() >= 3 {
                draw_polygon_mut(canvas, &points, FOREGROUND);
            }
            for (index, start) in points.iter().enumerate() {
                let end = points[(index + 1) % points.len()];
                draw_line_segment_mut(
                    canvas,
                    (start.x as f32, start.y as f32),
                    (end.x as f32, end.y as f32),
                    FOREGROUND,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(mask: &mut GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) {
        for y in y0..y1 {
            for x in x0..x1 {
                mask.put_pixel(x, y, FOREGROUND);
            }
        }
    }

    #[test]
    fn test_empty_mask_returns_zero_mask() {
        let mask = GrayImage::new(40, 30);
        let result = ConnectedRegionFilter::default().apply(&mask).unwrap();
        assert_eq!(result.dimensions(), (40, 30));
        assert!(result.pixels().all(|pixel| pixel[0] == 0));
    }

    #[test]
    fn test_small_regions_are_dropped() {
        // Threshold is (100 + 100) / 20 = 10 pixels of perimeter.
        let mut mask = GrayImage::new(100, 100);
        fill(&mut mask, 3, 3, 5, 5);
        fill(&mut mask, 40, 40, 60, 60);

        let result = ConnectedRegionFilter::default().apply(&mask).unwrap();
        assert_eq!(result.get_pixel(3, 3)[0], 0);
        assert_eq!(result.get_pixel(50, 50)[0], 255);
        assert_eq!(result.get_pixel(40, 40)[0], 255);
        assert_eq!(result.get_pixel(59, 59)[0], 255);
        assert_eq!(result.get_pixel(61, 61)[0], 0);
    }

    #[test]
    fn test_holes_are_filled() {
        let mut mask = GrayImage::new(100, 100);
        fill(&mut mask, 20, 20, 80, 80);
        for y in 40..60 {
            for x in 40..60 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }

        let result = ConnectedRegionFilter::default().apply(&mask).unwrap();
        assert_eq!(result.get_pixel(50, 50)[0], 255);
    }

    #[test]
    fn test_convex_hull_covers_concave_shape() {
        let mut mask = GrayImage::new(100, 100);
        // An L shape whose hull includes the empty corner.
        fill(&mut mask, 10, 10, 20, 60);
        fill(&mut mask, 10, 50, 60, 60);

        let filter = ConnectedRegionFilter::new(ConnectedRegionSettings {
            method: RefinementMethod::ConvexHull,
            ..ConnectedRegionSettings::default()
        });
        let result = filter.apply(&mask).unwrap();
        assert_eq!(result.get_pixel(30, 45)[0], 255);
        assert_eq!(result.get_pixel(50, 15)[0], 0);
    }
}
