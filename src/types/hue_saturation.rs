//! Hue and Saturation color representation.

use serde::{Deserialize, Serialize};

/// Hue and Saturation color representation.
///
/// The color mode Yeelight bulbs report as `color_mode = 3`:
/// - Hue: The color angle on the color wheel (0-359 degrees)
/// - Saturation: The intensity of the color (0-100 percent)
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HueSaturation {
    hue: u16,
    saturation: u8,
}

impl HueSaturation {
    pub const MAX_HUE: u16 = 359;
    pub const MAX_SATURATION: u8 = 100;

    /// Create a new HueSaturation with the given values.
    ///
    /// Returns `None` if values are outside valid ranges.
    ///
    /// # Examples
    ///
    /// ```
    /// use yeelight_rs::HueSaturation;
    ///
    /// assert!(HueSaturation::create(0, 100).is_some());   // Red at full saturation
    /// assert!(HueSaturation::create(120, 50).is_some()); // Green at 50% saturation
    /// assert!(HueSaturation::create(360, 50).is_none()); // Invalid hue
    /// assert!(HueSaturation::create(180, 101).is_none()); // Invalid saturation
    /// ```
    pub fn create(hue: u16, saturation: u8) -> Option<Self> {
        if hue <= Self::MAX_HUE && saturation <= Self::MAX_SATURATION {
            Some(HueSaturation { hue, saturation })
        } else {
            None
        }
    }

    /// Get the hue value.
    pub fn hue(&self) -> u16 {
        self.hue
    }

    /// Get the saturation value.
    pub fn saturation(&self) -> u8 {
        self.saturation
    }
}
