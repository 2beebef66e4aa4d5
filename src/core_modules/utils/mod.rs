pub mod contour_helper;
