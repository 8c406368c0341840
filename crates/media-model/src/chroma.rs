//! The chroma key classification rule.

use crate::frame::Rgba;

/// Hard-threshold key color rule.
///
/// A pixel is keyed when `r < 45`, `170 < g < 180` and `b == 0`.
/// The green interval is open on both ends and blue must be exactly zero;
/// this is a narrow rule tuned for one kind of green backdrop, not a
/// general green-screen detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChromaKeyRule;

impl ChromaKeyRule {
    /// Red must be strictly below this value.
    pub const RED_LIMIT: u8 = 45;
    /// Green must be strictly above this value.
    pub const GREEN_FLOOR: u8 = 170;
    /// Green must be strictly below this value.
    pub const GREEN_CEILING: u8 = 180;
    /// Blue must equal this value.
    pub const BLUE_EXACT: u8 = 0;

    pub const fn new() -> Self {
        Self
    }

    /// Whether the color channels fall inside the key range.
    #[inline]
    pub fn matches(&self, r: u8, g: u8, b: u8) -> bool {
        r < Self::RED_LIMIT
            && g > Self::GREEN_FLOOR
            && g < Self::GREEN_CEILING
            && b == Self::BLUE_EXACT
    }

    /// Same as [`matches`](Self::matches); alpha is ignored.
    #[inline]
    pub fn matches_pixel(&self, px: Rgba) -> bool {
        self.matches(px.r, px.g, px.b)
    }
}
