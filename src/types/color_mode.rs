use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Which channel a light is currently driven by.
///
/// Govee lights are either in RGB mode or in white color-temperature mode;
/// the protocol signals temperature mode with a non-zero kelvin value.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ColorMode {
    Rgb,
    ColorTemp,
}
