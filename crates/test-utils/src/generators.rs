//! Test data generators for synthetic rasters.
//!
//! These generators create predictable, verifiable grids so tests can check
//! exactly which cells were read and reduced.

use ndarray::Array2;

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that a window was read from the right place
/// by checking that `grid[[row, col]] == col * 1000 + row`.
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(5, 10);
/// assert_eq!(grid.dim(), (5, 10));
/// assert_eq!(grid[[0, 1]], 1000.0);
/// assert_eq!(grid[[1, 0]], 1.0);
/// ```
pub fn create_test_grid(rows: usize, cols: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(row, col)| (col * 1000 + row) as f64)
}

/// Creates a grid numbered `1..=rows*cols` in row-major order.
pub fn create_sequential_grid(rows: usize, cols: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(row, col)| (row * cols + col + 1) as f64)
}

/// Creates a grid filled with one value.
pub fn create_constant_grid(rows: usize, cols: usize, value: f64) -> Array2<f64> {
    Array2::from_elem((rows, cols), value)
}

/// Creates a categorical grid cycling through `categories` in row-major order.
pub fn create_category_grid(rows: usize, cols: usize, categories: &[f64]) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(row, col)| {
        if categories.is_empty() {
            0.0
        } else {
            categories[(row * cols + col) % categories.len()]
        }
    })
}

/// Creates a grid with NaN values at the given `(row, col)` positions, zeros elsewhere.
pub fn create_grid_with_nans(rows: usize, cols: usize, nan_positions: &[(usize, usize)]) -> Array2<f64> {
    let mut grid = Array2::zeros((rows, cols));
    for &(row, col) in nan_positions {
        if let Some(cell) = grid.get_mut((row, col)) {
            *cell = f64::NAN;
        }
    }
    grid
}
