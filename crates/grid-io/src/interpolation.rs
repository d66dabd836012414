//! Point interpolation kernels.

use std::fmt;
use std::str::FromStr;

/// How to sample a raster at a point that is not a cell center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationMethod {
    /// Value of the containing cell.
    Nearest,
    /// Weighted mean of the four cells whose centers bracket the point.
    #[default]
    Bilinear,
}

/// Error for unrecognized interpolation names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("interpolate must be 'nearest' or 'bilinear', got '{0}'")]
pub struct ParseInterpolationError(pub String);

impl FromStr for InterpolationMethod {
    type Err = ParseInterpolationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "bilinear" => Ok(Self::Bilinear),
            _ => Err(ParseInterpolationError(s.to_string())),
        }
    }
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Bilinear => write!(f, "bilinear"),
        }
    }
}

/// Bilinear interpolation on a 2x2 neighborhood.
///
/// `cells` is in raster order: `cells[0] = [upper-left, upper-right]`,
/// `cells[1] = [lower-left, lower-right]`, with `None` for invalid cells.
/// `(x, y)` is the position on the unit square spanned by the four cell
/// centers, origin at the lower-left center and y increasing upward.
///
/// When any neighbor is invalid this falls back to the nearest of the four
/// cells (ties round to even), which may itself be `None`.
pub fn bilinear(cells: [[Option<f64>; 2]; 2], x: f64, y: f64) -> Option<f64> {
    match cells {
        [[Some(ulv), Some(urv)], [Some(llv), Some(lrv)]] => Some(
            llv * (1.0 - x) * (1.0 - y)
                + lrv * x * (1.0 - y)
                + ulv * (1.0 - x) * y
                + urv * x * y,
        ),
        _ => {
            let row = (1.0 - y).round_ties_even().clamp(0.0, 1.0) as usize;
            let col = x.round_ties_even().clamp(0.0, 1.0) as usize;
            cells[row][col]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(values: [[f64; 2]; 2]) -> [[Option<f64>; 2]; 2] {
        values.map(|row| row.map(Some))
    }

    #[test]
    fn test_parse() {
        assert_eq!("nearest".parse(), Ok(InterpolationMethod::Nearest));
        assert_eq!("Bilinear".parse(), Ok(InterpolationMethod::Bilinear));
        assert!("cubic".parse::<InterpolationMethod>().is_err());
        assert_eq!(InterpolationMethod::default().to_string(), "bilinear");
    }

    #[test]
    fn test_bilinear_corners() {
        let cells = full([[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(bilinear(cells, 0.0, 0.0), Some(3.0));
        assert_eq!(bilinear(cells, 1.0, 0.0), Some(4.0));
        assert_eq!(bilinear(cells, 0.0, 1.0), Some(1.0));
        assert_eq!(bilinear(cells, 1.0, 1.0), Some(2.0));
    }

    #[test]
    fn test_bilinear_center_is_mean() {
        let cells = full([[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(bilinear(cells, 0.5, 0.5), Some(2.5));

        let equal = full([[7.0, 7.0], [7.0, 7.0]]);
        assert_eq!(bilinear(equal, 0.3, 0.9), Some(7.0));
    }

    #[test]
    fn test_fallback_to_nearest() {
        let cells = [[Some(1.0), None], [Some(3.0), Some(4.0)]];
        // closest to lower-right
        assert_eq!(bilinear(cells, 0.9, 0.1), Some(4.0));
        // closest to upper-left
        assert_eq!(bilinear(cells, 0.1, 0.8), Some(1.0));
        // nearest cell is itself invalid
        assert_eq!(bilinear(cells, 0.9, 0.9), None);
    }

    #[test]
    fn test_fallback_ties_round_to_even() {
        let cells = [[Some(1.0), Some(2.0)], [None, Some(4.0)]];
        // x = 0.5 rounds to column 0, 1 - y = 0.5 rounds to row 0
        assert_eq!(bilinear(cells, 0.5, 0.5), Some(1.0));
    }
}
