//! # govee_lan_rs
//!
//! An async Rust library for controlling Govee smart lights over the LAN UDP
//! protocol.
//!
//! The crate provides a **runtime-agnostic** async API to find Govee lights
//! on the local network, switch them, set brightness, RGB color and white
//! color temperature, and keep track of their state.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use govee_lan_rs::discover_devices;
//!
//! async fn all_on() -> Result<(), Box<dyn std::error::Error>> {
//!     for device in discover_devices(Duration::from_secs(3)).await? {
//!         let client = device.into_client();
//!         client.turn_on().await?;
//!         client.set_color(255, 0, 0).await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Runtime Agnostic**: Works with tokio, async-std, or smol async runtimes
//! - **Discovery**: Find devices with a multicast scan via [`discover_devices`]
//! - **Commands**: Power, brightness, RGB and color temperature through [`DeviceClient`];
//!   out of range values are clamped rather than rejected
//! - **Status Queries**: [`DeviceClient::get_device_state`] retries with a growing timeout
//! - **State Tracking**: [`Coordinator`] polls on an interval and falls back to
//!   locally tracked state for models that never answer status queries
//!
//! ## Communication
//!
//! Discovery goes to multicast group `239.255.255.250` port 4001. Commands and
//! status queries go to the device on port 4003, and every reply arrives on
//! port 4002. Commands are never acknowledged. See [`ProtocolConfig`] to
//! change any of these.
//!
//! ## Runtime Selection
//!
//! Select the runtime with feature flags:
//!
//! ```toml
//! [dependencies]
//! # tokio (default)
//! govee-lan-rs = "0.1"
//!
//! # async-std
//! govee-lan-rs = { version = "0.1", default-features = false, features = ["runtime-async-std"] }
//!
//! # smol
//! govee-lan-rs = { version = "0.1", default-features = false, features = ["runtime-smol"] }
//! ```

mod client;
mod config;
mod coordinator;
mod discovery;
mod errors;
mod history;
mod message;
pub mod runtime;
mod state;
mod transport;
mod types;

// Re-export public API
pub use client::{DeviceClient, parse_device_address};
pub use config::{MULTICAST_ADDRESS, PORT_CONTROL, PORT_LISTEN, PORT_SCAN, ProtocolConfig};
pub use coordinator::{Coordinator, LightRequest, StateCallback, StatusSupport, SubscriptionId};
pub use discovery::{DiscoveredDevice, discover_devices, discover_devices_with};
pub use errors::Error;
pub use history::{HistoryEntry, HistorySummary, MessageHistory, MessageType};
pub use message::Request;
pub use state::{DeviceState, StateUpdate};
pub use transport::{Transport, UdpTransport};
pub use types::{Brightness, Color, ColorMode, Kelvin, PowerMode};
