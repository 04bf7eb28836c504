//! Value types for light control parameters.

mod color;
mod hue_saturation;
mod kelvin;
mod power;

pub use color::Color;
pub use hue_saturation::HueSaturation;
pub use kelvin::Kelvin;
pub use power::PowerMode;
