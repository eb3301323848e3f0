//! Test data generators for creating synthetic forecast fields.
//!
//! These generators create predictable, verifiable test data patterns
//! that can be used across the test suite.

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50); // 10 * 5
/// assert_eq!(grid[0], 0.0);   // col=0, row=0 -> 0*1000 + 0
/// assert_eq!(grid[1], 1000.0); // col=1, row=0 -> 1*1000 + 0
/// assert_eq!(grid[10], 1.0);  // col=0, row=1 -> 0*1000 + 1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Creates a U-component wind grid (west-east component), -20 to +20 m/s
/// varying by row.
pub fn create_u_wind_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for _col in 0..width {
            let lat_factor = (row as f32 / height as f32 - 0.5) * 2.0;
            data.push(lat_factor * 20.0);
        }
    }
    data
}

/// Creates a V-component wind grid (south-north component), -15 to +15 m/s
/// varying by column.
pub fn create_v_wind_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for _row in 0..height {
        for col in 0..width {
            let lon_factor = (col as f32 / width as f32 - 0.5) * 2.0;
            data.push(lon_factor * 15.0);
        }
    }
    data
}

/// Creates a grid filled with a constant value.
///
/// ```
/// use test_utils::create_constant_grid;
///
/// let grid = create_constant_grid(4, 3, 2.5e-4);
/// assert_eq!(grid.len(), 12);
/// assert!(grid.iter().all(|&v| v == 2.5e-4));
/// ```
pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}
