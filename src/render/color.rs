//! Color mapping for choropleth fills.

use std::fmt;

/// Simple RGB color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Rgb {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
}

impl fmt::Display for Rgb {
    /// Format as a hex color: #rrggbb
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Fill used for polygons with no data to color by.
pub(crate) const NO_DATA_GRAY: Rgb = Rgb { r: 150, g: 150, b: 150 };

// Sequential ramp stops (viridis-like), low to high.
const STOPS: &[(f64, Rgb)] = &[
    (0.00, Rgb { r: 68, g: 1, b: 84 }),
    (0.25, Rgb { r: 59, g: 82, b: 139 }),
    (0.50, Rgb { r: 33, g: 145, b: 140 }),
    (0.75, Rgb { r: 94, g: 201, b: 98 }),
    (1.00, Rgb { r: 253, g: 231, b: 37 }),
];

fn lerp(a: u8, b: u8, t: f64) -> u8 {
    (a as f64 + (b as f64 - a as f64) * t).round().clamp(0.0, 255.0) as u8
}

/// Sequential color for a normalized value in [0, 1]. Out-of-range and
/// non-finite inputs clamp to the nearest end / the no-data gray.
pub(crate) fn sequential_color(t: f64) -> Rgb {
    if !t.is_finite() {
        return NO_DATA_GRAY;
    }
    let t = t.clamp(0.0, 1.0);

    for pair in STOPS.windows(2) {
        let ((lo, a), (hi, b)) = (pair[0], pair[1]);
        if t <= hi {
            let s = if hi > lo { (t - lo) / (hi - lo) } else { 0.0 };
            return Rgb { r: lerp(a.r, b.r, s), g: lerp(a.g, b.g, s), b: lerp(a.b, b.b, s) };
        }
    }

    STOPS[STOPS.len() - 1].1
}
