//! Protocol parameters: ports, timeouts and polling.

use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationSecondsWithFrac, serde_as};

/// Port devices listen on for `scan` requests.
pub const PORT_SCAN: u16 = 4001;
/// Port replies to `scan` and `devStatus` arrive on.
pub const PORT_LISTEN: u16 = 4002;
/// Port devices listen on for control commands and status queries.
pub const PORT_CONTROL: u16 = 4003;
/// Multicast group used for discovery.
pub const MULTICAST_ADDRESS: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Tunable protocol parameters.
///
/// The defaults match what Govee devices expect; override them only for
/// testing or unusual network setups. Missing fields take their default
/// when deserializing, and durations are expressed in (fractional) seconds.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use govee_lan_rs::ProtocolConfig;
///
/// let config = ProtocolConfig::default();
/// assert_eq!(config.control_port, 4003);
/// assert_eq!(config.status_timeout_for(3), Duration::from_secs(6));
/// ```
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub scan_port: u16,
    pub listen_port: u16,
    pub control_port: u16,
    pub multicast_address: Ipv4Addr,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub discovery_timeout: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub command_timeout: Duration,
    /// Base timeout of a status query, multiplied by the attempt number.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub status_timeout: Duration,
    pub max_attempts: u32,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub poll_interval: Duration,
    /// Receive buffer size in bytes.
    pub buffer_size: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            scan_port: PORT_SCAN,
            listen_port: PORT_LISTEN,
            control_port: PORT_CONTROL,
            multicast_address: MULTICAST_ADDRESS,
            discovery_timeout: Duration::from_secs(3),
            command_timeout: Duration::from_secs(2),
            status_timeout: Duration::from_secs(2),
            max_attempts: 3,
            poll_interval: Duration::from_secs(30),
            buffer_size: 4096,
        }
    }
}

impl ProtocolConfig {
    /// Timeout for the given 1-based status query attempt.
    pub fn status_timeout_for(&self, attempt: u32) -> Duration {
        self.status_timeout * attempt.max(1)
    }
}
