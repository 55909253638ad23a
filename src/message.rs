//! Wire messages exchanged with Govee devices.
//!
//! Every datagram in either direction has the shape
//! `{"msg": {"cmd": <command>, "data": <payload>}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Error;
use crate::state::DeviceState;
use crate::types::{Brightness, Color, Kelvin, PowerMode};

type Result<T> = std::result::Result<T, Error>;

/// A request sent to a device or to the discovery multicast group.
///
/// # Examples
///
/// ```
/// use govee_lan_rs::{PowerMode, Request};
/// use serde_json::json;
///
/// let msg = Request::turn(PowerMode::On).to_value().unwrap();
/// assert_eq!(msg, json!({"msg": {"cmd": "turn", "data": {"value": 1}}}));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cmd", content = "data", rename_all = "camelCase")]
pub enum Request {
    Scan {
        account_topic: String,
    },
    DevStatus {},
    Turn {
        value: u8,
    },
    Brightness {
        value: u8,
    },
    Colorwc {
        color: Color,
        #[serde(rename = "colorTemInKelvin")]
        color_temp_kelvin: u32,
    },
}

#[derive(Serialize)]
struct Envelope<'a> {
    msg: &'a Request,
}

impl Request {
    pub fn scan() -> Self {
        Request::Scan {
            account_topic: "reserve".to_string(),
        }
    }

    pub fn dev_status() -> Self {
        Request::DevStatus {}
    }

    pub fn turn(power: PowerMode) -> Self {
        Request::Turn {
            value: power.value(),
        }
    }

    pub fn brightness(brightness: Brightness) -> Self {
        Request::Brightness {
            value: brightness.value(),
        }
    }

    /// Switch to RGB mode; the temperature is reset to 0.
    pub fn color(color: Color) -> Self {
        Request::Colorwc {
            color,
            color_temp_kelvin: 0,
        }
    }

    /// Switch to white temperature mode; the color is reset to black.
    pub fn color_temp(kelvin: Kelvin) -> Self {
        Request::Colorwc {
            color: Color::BLACK,
            color_temp_kelvin: kelvin.kelvin(),
        }
    }

    /// Protocol command name.
    pub fn command(&self) -> &'static str {
        match self {
            Request::Scan { .. } => "scan",
            Request::DevStatus {} => "devStatus",
            Request::Turn { .. } => "turn",
            Request::Brightness { .. } => "brightness",
            Request::Colorwc { .. } => "colorwc",
        }
    }

    /// Wrap the request in its `msg` envelope.
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(Envelope { msg: self }).map_err(Error::JsonDump)
    }
}

/// Validate the response envelope and return its `data` payload.
pub(crate) fn payload_of<'a>(response: &'a Value, command: &str) -> Result<&'a Value> {
    let msg = response
        .get("msg")
        .ok_or_else(|| Error::UnexpectedResponse("missing msg envelope".to_string()))?;

    match msg.get("cmd").and_then(Value::as_str) {
        Some(cmd) if cmd == command => {}
        other => {
            return Err(Error::UnexpectedResponse(format!(
                "expected {command} reply, got {other:?}"
            )));
        }
    }

    msg.get("data")
        .ok_or_else(|| Error::UnexpectedResponse(format!("{command} reply without data")))
}

/// Parse a `devStatus` reply into a [`DeviceState`].
///
/// Absent fields fall back to defaults so that partial replies from older
/// firmware still produce a usable state.
pub(crate) fn parse_status(response: &Value) -> Result<DeviceState> {
    let data = payload_of(response, "devStatus")?;
    let status: StatusData = serde_json::from_value(data.clone()).map_err(Error::JsonLoad)?;
    Ok(DeviceState::from(&status))
}

/// `data` of a `devStatus` reply.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatusData {
    pub on_off: Option<u8>,
    pub brightness: Option<i64>,
    pub color: Option<StatusColor>,
    pub color_tem_in_kelvin: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StatusColor {
    pub r: Option<u8>,
    pub g: Option<u8>,
    pub b: Option<u8>,
}

/// `data` of a `scan` reply.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ScanData {
    pub ip: Option<String>,
    pub device: Option<String>,
    pub sku: Option<String>,
    pub mac: Option<String>,
}
