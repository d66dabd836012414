//! Tests for pixel windows and their interaction with affine transforms.

use zonal_common::{Affine, BoundingBox, Window};

// ============================================================================
// Bounds -> window
// ============================================================================

#[test]
fn test_window_covers_requested_bounds() {
    let affine = Affine::new(0.25, 0.0, -10.0, 0.0, -0.25, 5.0);
    let bounds = BoundingBox::new(-9.9, 3.1, -8.05, 4.95);
    let window = Window::from_bounds(&bounds, &affine);
    let covered = window.bounds(&affine);

    assert!(covered.min_x <= bounds.min_x);
    assert!(covered.max_x >= bounds.max_x);
    assert!(covered.min_y <= bounds.min_y);
    assert!(covered.max_y >= bounds.max_y);
}

#[test]
fn test_window_on_pixel_edges_is_exact() {
    let affine = Affine::new(1.0, 0.0, 0.0, 0.0, -1.0, 2.0);
    let window = Window::from_bounds(&BoundingBox::new(0.0, 0.0, 2.0, 2.0), &affine);
    assert_eq!(window, Window::full(2, 2));
}

#[test]
fn test_window_south_up_raster() {
    let affine = Affine::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0);
    let window = Window::from_bounds(&BoundingBox::new(0.5, 1.5, 2.5, 3.5), &affine);
    assert_eq!(window, Window::new(1, 4, 0, 3));
}

// ============================================================================
// Window transforms
// ============================================================================

#[test]
fn test_window_transform_origin_matches_upper_left() {
    let affine = Affine::new(1.0, 0.0, 1.0, 0.0, -1.0, 3.0);
    let window = Window::new(1, 3, 2, 3);
    let t = window.transform(&affine);
    let bounds = window.bounds(&affine);

    assert_eq!(t.origin(), (bounds.min_x, bounds.max_y));
    assert_eq!((t.a, t.e), (affine.a, affine.e));
}

#[test]
fn test_window_outside_raster() {
    let window = Window::new(-5, -1, 0, 3);
    assert!(!window.is_within(10, 10));
    assert!(window.clip(10, 10).is_none());
    assert_eq!(window.shape(), (4, 3));
}
