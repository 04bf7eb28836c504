//! Color temperature control.

use serde::{Deserialize, Serialize};

/// Color temperature in Kelvin.
///
/// Values sent to a light must be within 1700K to 6500K. Temperatures a
/// light reports are kept as reported.
///
/// Lower values produce warmer (more yellow/orange) light, while higher
/// values produce cooler (more blue) light. Typical values:
/// - 2700K: Warm white (incandescent-like)
/// - 4000K: Neutral white
/// - 6500K: Daylight
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Kelvin {
    pub(crate) kelvin: u16,
}

impl Kelvin {
    pub const MIN: u16 = 1700;
    pub const MAX: u16 = 6500;

    /// Get the kelvin value.
    pub fn kelvin(&self) -> u16 {
        self.kelvin
    }

    /// Create a new Kelvin with the given value.
    ///
    /// Returns `None` if value is outside the valid range (1700-6500).
    ///
    /// # Examples
    ///
    /// ```
    /// use yeelight_rs::Kelvin;
    ///
    /// assert!(Kelvin::create(1699).is_none());
    /// assert!(Kelvin::create(1700).is_some());
    /// assert!(Kelvin::create(6500).is_some());
    /// assert!(Kelvin::create(6501).is_none());
    /// ```
    pub fn create(kelvin: u16) -> Option<Self> {
        if (Self::MIN..=Self::MAX).contains(&kelvin) {
            Some(Kelvin { kelvin })
        } else {
            None
        }
    }

    /// Wrap a temperature a light reported, without range checking.
    pub(crate) fn reported(kelvin: u16) -> Self {
        Kelvin { kelvin }
    }
}

impl Default for Kelvin {
    /// 3000K, the warm white a fresh bulb starts at.
    fn default() -> Self {
        Kelvin { kelvin: 3000 }
    }
}
