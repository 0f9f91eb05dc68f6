//! Hilbert curve ordering used by bulk loading.
//!
//! The Hilbert curve maps 2D coordinates to a 1D index while preserving
//! spatial locality: points that are close in the plane stay relatively close
//! along the curve. Sorting entries by the Hilbert index of their centers
//! clusters neighbors into the same leaves.
//!
//! Higher-dimensional envelopes are ordered by their first two axes;
//! 1-dimensional envelopes use their single axis.

use crate::envelope::Envelope;

/// Maximum order for Hilbert curve encoding (determines precision)
const MAX_HILBERT_ORDER: u32 = 32;

/// Encodes 2D coordinates normalized to `[0, 1]` to a Hilbert curve index.
///
/// At order `n` the index lies in `0..4^n`.
pub fn hilbert_index(x: f64, y: f64, order: u32) -> u64 {
    debug_assert!((0.0..=1.0).contains(&x), "x must be in [0,1]");
    debug_assert!((0.0..=1.0).contains(&y), "y must be in [0,1]");
    debug_assert!(order > 0 && order <= MAX_HILBERT_ORDER, "order must be 1-32");

    let n = 1u64 << order;
    let xi = ((x * (n as f64 - 0.5)) as u64).min(n - 1);
    let yi = ((y * (n as f64 - 0.5)) as u64).min(n - 1);

    xy2d(n, xi, yi)
}

/// Hilbert index of `point` relative to the space covered by `bounds`.
///
/// Coordinates are normalized against `bounds` and clamped to it; an axis
/// with zero extent maps to the middle of the curve's range.
pub fn hilbert_index_in(point: &[f64], bounds: &Envelope, order: u32) -> u64 {
    let normalize = |axis: usize| -> f64 {
        if axis >= point.len() || axis >= bounds.dimension() {
            return 0.5;
        }
        let range = bounds.extent(axis);
        if range > 0.0 {
            ((point[axis] - bounds.low()[axis]) / range).clamp(0.0, 1.0)
        } else {
            0.5
        }
    };

    hilbert_index(normalize(0), normalize(1), order)
}

/// Converts (x, y) on an `n`x`n` grid to the distance along the curve.
fn xy2d(n: u64, x: u64, y: u64) -> u64 {
    let mut d = 0u64;
    let mut x = x;
    let mut y = y;
    let mut s = n / 2;

    while s > 0 {
        let rx = ((x & s) > 0) as u64;
        let ry = ((y & s) > 0) as u64;
        d += s * s * ((3 * rx) ^ ry);
        rotate(s, &mut x, &mut y, rx, ry);
        s /= 2;
    }

    d
}

/// Rotates and reflects the quadrant so the curve stays continuous.
fn rotate(n: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = n.wrapping_sub(1).wrapping_sub(*x);
            *y = n.wrapping_sub(1).wrapping_sub(*y);
        }
        std::mem::swap(x, y);
    }
}
