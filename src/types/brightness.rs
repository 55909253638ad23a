//! Brightness control for Govee lights.

use serde::{Deserialize, Serialize};

/// Brightness level from 1 to 100 percent.
///
/// Serializes as a bare number; deserializing rejects values outside 1-100.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub struct Brightness {
    pub(crate) value: u8,
}

impl Default for Brightness {
    fn default() -> Self {
        Self::new()
    }
}

impl Brightness {
    const MIN: u8 = 1;
    const MAX: u8 = 100;

    /// Full brightness.
    pub fn new() -> Self {
        Brightness { value: Self::MAX }
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    /// Returns None if value is outside valid range (1-100).
    pub fn create(value: u8) -> Option<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Some(Brightness { value })
        } else {
            None
        }
    }

    /// Clamp an arbitrary integer into the valid range.
    ///
    /// # Examples
    ///
    /// ```
    /// use govee_lan_rs::Brightness;
    ///
    /// assert_eq!(Brightness::clamped(0).value(), 1);
    /// assert_eq!(Brightness::clamped(42).value(), 42);
    /// assert_eq!(Brightness::clamped(500).value(), 100);
    /// ```
    pub fn clamped(value: i64) -> Self {
        let value = value.clamp(Self::MIN as i64, Self::MAX as i64);
        Brightness { value: value as u8 }
    }

    /// Convert from a 0-255 scale, as used by most home automation hosts.
    ///
    /// # Examples
    ///
    /// ```
    /// use govee_lan_rs::Brightness;
    ///
    /// assert_eq!(Brightness::from_255(255).value(), 100);
    /// assert_eq!(Brightness::from_255(128).value(), 50);
    /// assert_eq!(Brightness::from_255(0).value(), 1);
    /// ```
    pub fn from_255(value: u8) -> Self {
        let scaled = (value as i64 * 100 + 127) / 255;
        Self::clamped(scaled)
    }

    /// Convert to a 0-255 scale.
    pub fn to_255(&self) -> u8 {
        ((self.value as u32 * 255 + 50) / 100) as u8
    }
}

impl TryFrom<u8> for Brightness {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        Self::create(value).ok_or_else(|| format!("brightness {value} outside 1-100"))
    }
}

impl From<Brightness> for u8 {
    fn from(brightness: Brightness) -> u8 {
        brightness.value
    }
}
