pub mod contour_helper {
    use crate::core_modules::region::GridRect;
    use image::GrayImage;
    use imageproc::contours::{self, BorderType};
    use imageproc::geometry::approximate_polygon_dp;
    use imageproc::point::Point;

    /// A traced border as a list of pixel coordinates.
    pub type Contour = Vec<Point<i32>>;

    /// Traces the outermost borders of every non-zero region. Borders nested
    /// inside holes are skipped.
    pub fn outer_contours(image: &GrayImage) -> Vec<Contour> {
        contours::find_contours::<i32>(image)
            .into_iter()
            .filter(|contour| contour.parent.is_none() && contour.border_type == BorderType::Outer)
            .map(|contour| contour.points)
            .filter(|points| !points.is_empty())
            .collect()
    }

    /// Douglas-Peucker approximation of a closed contour. The curve is split at
    /// the point farthest from its start so both extreme points survive, then
    /// each half is simplified as an open polyline.
    pub fn approximate_closed(points: &[Point<i32>], epsilon: f64) -> Contour {
        if points.len() <= 2 || epsilon <= 0.0 {
            return points.to_vec();
        }

        let start = points[0];
        let (split, _) = points
            .iter()
            .enumerate()
            .skip(1)
            .map(|(index, point)| (index, squared_distance(start, *point)))
            .fold((0, 0i64), |best, candidate| if candidate.1 > best.1 { candidate } else { best });
        if split == 0 {
            return vec![start];
        }

        let mut second_half: Vec<Point<i32>> = points[split..].to_vec();
        second_half.push(start);

        let mut approximated = approximate_polygon_dp(&points[..=split], epsilon, false);
        approximated.pop();
        let mut tail = approximate_polygon_dp(&second_half, epsilon, false);
        tail.pop();
        approximated.append(&mut tail);
        approximated
    }

    /// Smallest rectangle containing every point.
    pub fn bounding_rect(points: &[Point<i32>]) -> Option<GridRect> {
        let first = points.first()?;
        let (mut left, mut top, mut right, mut bottom) = (first.x, first.y, first.x, first.y);
        for point in points {
            left = left.min(point.x);
            top = top.min(point.y);
            right = right.max(point.x);
            bottom = bottom.max(point.y);
        }
        Some(GridRect::from_corners(left, top, right, bottom))
    }

    /// Perimeter of a closed polygon.
    pub fn closed_perimeter(points: &[Point<i32>]) -> f64 {
        if points.len() < 2 {
            return 0.0;
        }
        let mut length = 0.0;
        for (index, point) in points.iter().enumerate() {
            let next = points[(index + 1) % points.len()];
            length += (squared_distance(*point, next) as f64).sqrt();
        }
        length
    }

    fn squared_distance(a: Point<i32>, b: Point<i32>) -> i64 {
        let dx = (a.x - b.x) as i64;
        let dy = (a.y - b.y) as i64;
        dx * dx + dy * dy
    }
}
