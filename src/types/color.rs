//! Color reported by or sent to a light.

use serde::{Deserialize, Serialize};

use super::{HueSaturation, Kelvin};

/// The color a light is showing.
///
/// `Undefined` is used when the device reported fields that cannot be
/// interpreted as either a temperature or a hue/saturation pair.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Color {
    #[default]
    Undefined,
    /// White light at a color temperature
    Temperature(Kelvin),
    /// Colored light
    Hsv(HueSaturation),
}

impl Color {
    /// Color mode value bulbs report for color temperature.
    pub(crate) const TEMPERATURE_MODE: &'static str = "2";

    /// Build a color from raw `get_prop`/`props` fields.
    ///
    /// # Examples
    ///
    /// ```
    /// use yeelight_rs::{Color, HueSaturation, Kelvin};
    ///
    /// assert_eq!(
    ///     Color::from_fields("2", "4000", "0", "0"),
    ///     Color::Temperature(Kelvin::create(4000).unwrap())
    /// );
    /// assert_eq!(
    ///     Color::from_fields("1", "4000", "120", "50"),
    ///     Color::Hsv(HueSaturation::create(120, 50).unwrap())
    /// );
    /// assert_eq!(Color::from_fields("3", "", "x", "50"), Color::Undefined);
    /// ```
    pub fn from_fields(color_mode: &str, ct: &str, hue: &str, sat: &str) -> Self {
        if color_mode == Self::TEMPERATURE_MODE {
            // Reported temperatures are taken as-is; only outgoing values are range checked.
            ct.trim()
                .parse::<u16>()
                .map_or(Color::Undefined, |ct| Color::Temperature(Kelvin::reported(ct)))
        } else {
            match (hue.trim().parse::<u16>(), sat.trim().parse::<u8>()) {
                (Ok(hue), Ok(sat)) => HueSaturation::create(hue, sat)
                    .map_or(Color::Undefined, Color::Hsv),
                _ => Color::Undefined,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reported_temperature_outside_command_range() {
        let color = Color::from_fields("2", "1500", "0", "0");
        assert!(matches!(color, Color::Temperature(k) if k.kelvin() == 1500));

        let color = Color::from_fields("2", "9000", "0", "0");
        assert!(matches!(color, Color::Temperature(k) if k.kelvin() == 9000));
    }

    #[test]
    fn test_unparsable_temperature_is_undefined() {
        assert_eq!(Color::from_fields("2", "warm", "0", "0"), Color::Undefined);
    }

    #[test]
    fn test_hsv_out_of_range_is_undefined() {
        assert_eq!(Color::from_fields("1", "4000", "400", "50"), Color::Undefined);
    }
}
