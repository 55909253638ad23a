//! Device state tracking.

use serde::{Deserialize, Serialize};

use crate::message::StatusData;
use crate::types::{Brightness, Color, ColorMode, Kelvin, PowerMode};

/// Snapshot of a light's state.
///
/// A non-zero color temperature and a non-black color are mutually
/// exclusive: the device is either in white temperature mode or in RGB
/// mode, and switching to one resets the other.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DeviceState {
    on: bool,
    brightness: Brightness,
    color: Color,
    color_temp_kelvin: u32,
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState {
            on: false,
            brightness: Brightness::new(),
            color: Color::WHITE,
            color_temp_kelvin: 0,
        }
    }
}

impl DeviceState {
    pub fn new(on: bool, brightness: Brightness, color: Color, color_temp_kelvin: u32) -> Self {
        DeviceState {
            on,
            brightness,
            color,
            color_temp_kelvin,
        }
    }

    /// Check if the light is emitting.
    pub fn on(&self) -> bool {
        self.on
    }

    pub fn brightness(&self) -> Brightness {
        self.brightness
    }

    /// Brightness on a 0-255 scale.
    pub fn brightness_255(&self) -> u8 {
        self.brightness.to_255()
    }

    pub fn color(&self) -> Color {
        self.color
    }

    /// Raw color temperature; 0 when the light is in RGB mode.
    pub fn color_temp_kelvin(&self) -> u32 {
        self.color_temp_kelvin
    }

    /// Color temperature, or `None` when the light is in RGB mode.
    pub fn color_temp(&self) -> Option<u32> {
        (self.color_temp_kelvin > 0).then_some(self.color_temp_kelvin)
    }

    pub fn color_mode(&self) -> ColorMode {
        if self.color_temp_kelvin > 0 {
            ColorMode::ColorTemp
        } else {
            ColorMode::Rgb
        }
    }

    /// Apply a partial update.
    ///
    /// # Examples
    ///
    /// ```
    /// use govee_lan_rs::{Color, DeviceState, Kelvin, StateUpdate};
    ///
    /// let mut state = DeviceState::default();
    /// state.apply(&StateUpdate::from(&Kelvin::clamped(3000)));
    /// assert_eq!(state.color(), Color::BLACK);
    /// assert_eq!(state.color_temp(), Some(3000));
    ///
    /// state.apply(&StateUpdate::from(&Color::rgb(255, 0, 0)));
    /// assert_eq!(state.color_temp(), None);
    /// ```
    pub fn apply(&mut self, update: &StateUpdate) {
        if let Some(on) = update.on {
            self.on = on;
        }
        if let Some(brightness) = update.brightness {
            self.brightness = brightness;
        }
        if let Some(color) = update.color {
            self.color = color;
            self.color_temp_kelvin = 0;
        }
        if let Some(kelvin) = update.color_temp {
            self.color_temp_kelvin = kelvin.kelvin();
            self.color = Color::BLACK;
        }
    }
}

impl From<&StatusData> for DeviceState {
    fn from(data: &StatusData) -> Self {
        let color = match &data.color {
            Some(c) => Color::rgb(
                c.r.unwrap_or(u8::MAX),
                c.g.unwrap_or(u8::MAX),
                c.b.unwrap_or(u8::MAX),
            ),
            None => Color::WHITE,
        };

        DeviceState {
            on: data.on_off == Some(1),
            brightness: data
                .brightness
                .map(Brightness::clamped)
                .unwrap_or_default(),
            color,
            color_temp_kelvin: data.color_tem_in_kelvin.unwrap_or(0),
        }
    }
}

/// A partial state change recorded after sending a command.
///
/// Build one with the setters, or from a single attribute with [`From`].
///
/// ```
/// use govee_lan_rs::{Brightness, PowerMode, StateUpdate};
///
/// let mut update = StateUpdate::from(&PowerMode::On);
/// update.brightness(&Brightness::clamped(30));
/// assert!(!update.is_empty());
/// ```
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateUpdate {
    pub(crate) on: Option<bool>,
    pub(crate) brightness: Option<Brightness>,
    pub(crate) color: Option<Color>,
    pub(crate) color_temp: Option<Kelvin>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.on.is_none()
            && self.brightness.is_none()
            && self.color.is_none()
            && self.color_temp.is_none()
    }

    pub fn power(&mut self, power: &PowerMode) {
        self.on = Some(power.is_on());
    }

    pub fn brightness(&mut self, brightness: &Brightness) {
        self.brightness = Some(*brightness);
    }

    pub fn color(&mut self, color: &Color) {
        self.color = Some(*color);
    }

    pub fn color_temp(&mut self, kelvin: &Kelvin) {
        self.color_temp = Some(*kelvin);
    }
}

impl From<&PowerMode> for StateUpdate {
    fn from(power: &PowerMode) -> Self {
        let mut u = StateUpdate::new();
        u.power(power);
        u
    }
}

impl From<&Brightness> for StateUpdate {
    fn from(brightness: &Brightness) -> Self {
        let mut u = StateUpdate::new();
        u.brightness(brightness);
        u
    }
}

impl From<&Color> for StateUpdate {
    fn from(color: &Color) -> Self {
        let mut u = StateUpdate::new();
        u.color(color);
        u
    }
}

impl From<&Kelvin> for StateUpdate {
    fn from(kelvin: &Kelvin) -> Self {
        let mut u = StateUpdate::new();
        u.color_temp(kelvin);
        u
    }
}
