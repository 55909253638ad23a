//! Color temperature control.

use serde::{Deserialize, Serialize};

/// Color temperature in Kelvin, with valid values from 2000K to 9000K.
///
/// Lower values produce warmer (more yellow/orange) light, while higher
/// values produce cooler (more blue) light. Typical values:
/// - 2700K: Warm white (incandescent-like)
/// - 4000K: Neutral white
/// - 6500K: Daylight
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "u32", into = "u32")]
pub struct Kelvin {
    pub(crate) kelvin: u32,
}

impl Kelvin {
    pub const MIN: u32 = 2000;
    pub const MAX: u32 = 9000;

    /// Get the kelvin value.
    pub fn kelvin(&self) -> u32 {
        self.kelvin
    }

    /// Create a new Kelvin with the given value.
    ///
    /// Returns `None` if value is outside the valid range (2000-9000).
    ///
    /// # Examples
    ///
    /// ```
    /// use govee_lan_rs::Kelvin;
    ///
    /// assert!(Kelvin::create(1999).is_none());
    /// assert!(Kelvin::create(2000).is_some());
    /// assert!(Kelvin::create(9000).is_some());
    /// assert!(Kelvin::create(9001).is_none());
    /// ```
    pub fn create(kelvin: u32) -> Option<Self> {
        if (Self::MIN..=Self::MAX).contains(&kelvin) {
            Some(Kelvin { kelvin })
        } else {
            None
        }
    }

    /// Clamp an arbitrary integer into the valid range.
    ///
    /// # Examples
    ///
    /// ```
    /// use govee_lan_rs::Kelvin;
    ///
    /// assert_eq!(Kelvin::clamped(0).kelvin(), 2000);
    /// assert_eq!(Kelvin::clamped(12000).kelvin(), 9000);
    /// ```
    pub fn clamped(kelvin: i64) -> Self {
        let kelvin = kelvin.clamp(Self::MIN as i64, Self::MAX as i64);
        Kelvin {
            kelvin: kelvin as u32,
        }
    }
}

impl TryFrom<u32> for Kelvin {
    type Error = String;

    fn try_from(kelvin: u32) -> Result<Self, String> {
        Self::create(kelvin).ok_or_else(|| format!("{kelvin}K outside 2000-9000K"))
    }
}

impl From<Kelvin> for u32 {
    fn from(kelvin: Kelvin) -> u32 {
        kelvin.kelvin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_checks_range() {
        assert_eq!(serde_json::from_str::<Kelvin>("6500").unwrap().kelvin(), 6500);
        assert!(serde_json::from_str::<Kelvin>("1500").is_err());
        assert!(serde_json::from_str::<Kelvin>("9500").is_err());
    }
}
