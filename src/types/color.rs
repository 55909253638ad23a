//! RGB color representation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An RGB color with red, green, and blue components (0-255 each).
///
/// Serializes to the `{"r": .., "g": .., "b": ..}` object used on the wire.
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    #[serde(rename = "r")]
    pub(crate) red: u8,
    #[serde(rename = "g")]
    pub(crate) green: u8,
    #[serde(rename = "b")]
    pub(crate) blue: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    /// Create a color with the given RGB values.
    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Create a color, clamping each channel into 0-255 independently.
    ///
    /// # Examples
    ///
    /// ```
    /// use govee_lan_rs::Color;
    ///
    /// assert_eq!(Color::clamped(-5, 128, 300), Color::rgb(0, 128, 255));
    /// ```
    pub fn clamped(red: i64, green: i64, blue: i64) -> Self {
        let channel = |v: i64| v.clamp(0, u8::MAX as i64) as u8;
        Self::rgb(channel(red), channel(green), channel(blue))
    }

    pub fn red(&self) -> u8 {
        self.red
    }

    pub fn green(&self) -> u8 {
        self.green
    }

    pub fn blue(&self) -> u8 {
        self.blue
    }

    /// All channels zero; the "unset" color of temperature mode.
    pub fn is_black(&self) -> bool {
        *self == Self::BLACK
    }
}

impl From<(u8, u8, u8)> for Color {
    fn from((red, green, blue): (u8, u8, u8)) -> Self {
        Self::rgb(red, green, blue)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.red, self.green, self.blue)
    }
}

impl FromStr for Color {
    type Err = String;

    /// Parse from comma-separated string (e.g., "255,128,0").
    fn from_str(s: &str) -> Result<Self, String> {
        let parts = s
            .split(',')
            .map(|c| c.trim().parse::<u8>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid color component: {e}"))?;
        match parts[..] {
            [r, g, b] => Ok(Self::rgb(r, g, b)),
            _ => Err("Expected format: r,g,b".into()),
        }
    }
}
