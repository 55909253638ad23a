//! Device discovery via UDP multicast.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::DeviceClient;
use crate::config::ProtocolConfig;
use crate::errors::Error;
use crate::message::{self, Request, ScanData};
use crate::runtime::{self, AsyncUdpSocket, Instant};

type Result<T> = std::result::Result<T, Error>;

/// A Govee device that answered a scan.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// IP address of the device
    pub address: Ipv4Addr,
    /// Protocol-assigned device identifier
    pub device_id: String,
    /// Model string, e.g. `H6076`
    pub sku: String,
    pub mac: Option<String>,
}

impl DiscoveredDevice {
    /// Human readable name, `"{sku} ({ip})"`, or just the IP when the
    /// device did not report a model.
    pub fn display_name(&self) -> String {
        if self.sku.is_empty() {
            self.address.to_string()
        } else {
            format!("{} ({})", self.sku, self.address)
        }
    }

    /// Convert this discovered device into a [`DeviceClient`].
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let devices = discover_devices(Duration::from_secs(3)).await?;
    /// for device in devices {
    ///     device.into_client().turn_on().await?;
    /// }
    /// ```
    pub fn into_client(self) -> DeviceClient {
        DeviceClient::new(self.address)
    }
}

/// Discover Govee devices on the local network.
///
/// Sends one `scan` message to the discovery multicast group and collects
/// replies until `discovery_timeout` elapses. An empty list means nobody
/// answered; the caller decides whether to fall back to manual entry.
///
/// # Examples
///
/// ```ignore
/// use std::time::Duration;
/// use govee_lan_rs::discover_devices;
///
/// let devices = discover_devices(Duration::from_secs(3)).await?;
/// for device in devices {
///     println!("{} - {}", device.display_name(), device.device_id);
/// }
/// ```
pub async fn discover_devices(discovery_timeout: Duration) -> Result<Vec<DiscoveredDevice>> {
    discover_devices_with(&ProtocolConfig::default(), discovery_timeout).await
}

/// [`discover_devices`] with explicit ports and multicast group.
pub async fn discover_devices_with(
    config: &ProtocolConfig,
    discovery_timeout: Duration,
) -> Result<Vec<DiscoveredDevice>> {
    // Replies go to the fixed listen port, not to the sender's port.
    let listen = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.listen_port));
    let socket = runtime::bind_reusable(listen).map_err(|e| Error::socket("bind", e))?;

    socket
        .set_broadcast(true)
        .map_err(|e| Error::socket("set_broadcast", e))?;

    let msg = Request::scan().to_value()?;
    let msg_bytes = serde_json::to_vec(&msg).map_err(Error::JsonDump)?;
    let group = format!("{}:{}", config.multicast_address, config.scan_port);

    socket
        .send_to(&msg_bytes, &group)
        .await
        .map_err(|e| Error::socket("send_to", e))?;
    debug!(
        "Sent discovery message to {} (listening on {:?})",
        group,
        socket.local_addr().ok()
    );

    let mut collector = DiscoveryCollector::new();
    let start = Instant::now();
    let mut buffer = vec![0u8; config.buffer_size];

    loop {
        let remaining = discovery_timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            break;
        }

        match runtime::timeout(remaining, socket.recv_from(&mut buffer)).await {
            Ok(Ok((size, sender))) => {
                collector.ingest(&buffer[..size], sender);
            }
            Ok(Err(e)) => {
                debug!("Socket error during discovery: {}", e);
                break;
            }
            Err(_) => break,
        }
    }

    Ok(collector.into_devices())
}

/// Decodes scan replies and deduplicates them by device identifier.
#[derive(Debug, Default)]
pub(crate) struct DiscoveryCollector {
    devices: Vec<DiscoveredDevice>,
    seen: HashSet<String>,
}

impl DiscoveryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one datagram. Returns the device if it is new.
    pub fn ingest(&mut self, datagram: &[u8], sender: SocketAddr) -> Option<&DiscoveredDevice> {
        let json = match serde_json::from_slice::<Value>(datagram) {
            Ok(json) => json,
            Err(e) => {
                debug!("Invalid JSON response from {}: {}", sender, e);
                return None;
            }
        };

        let scan = match message::payload_of(&json, "scan")
            .and_then(|data| serde_json::from_value::<ScanData>(data.clone()).map_err(Error::JsonLoad))
        {
            Ok(scan) => scan,
            Err(e) => {
                debug!("Ignoring discovery reply from {}: {}", sender, e);
                return None;
            }
        };

        let Some(device_id) = scan.device.filter(|id| !id.is_empty()) else {
            debug!("Discovery reply from {} has no device id", sender);
            return None;
        };
        let address = resolve_address(scan.ip.as_deref(), sender)?;

        if !self.seen.insert(device_id.clone()) {
            debug!("Duplicate discovery reply for {} from {}", device_id, sender);
            return None;
        }

        let device = DiscoveredDevice {
            address,
            device_id,
            sku: scan.sku.unwrap_or_default(),
            mac: scan.mac,
        };
        info!(
            "Discovered Govee device: {} ({}) at {}",
            if device.sku.is_empty() { "Unknown" } else { device.sku.as_str() },
            device.device_id,
            device.address
        );
        self.devices.push(device);
        self.devices.last()
    }

    pub fn into_devices(self) -> Vec<DiscoveredDevice> {
        self.devices
    }
}

/// Prefer the address the device declares; some models leave it out, in
/// which case the datagram's source address is used.
fn resolve_address(declared: Option<&str>, sender: SocketAddr) -> Option<Ipv4Addr> {
    let declared = declared.map(str::trim).filter(|ip| !ip.is_empty());
    if let Some(ip) = declared {
        match ip.parse() {
            Ok(ip) => return Some(ip),
            Err(_) => debug!("Device at {} declared invalid ip {:?}", sender, ip),
        }
    }

    match sender {
        SocketAddr::V4(v4) => Some(*v4.ip()),
        SocketAddr::V6(v6) => v6.ip().to_ipv4_mapped(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reply(data: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({"msg": {"cmd": "scan", "data": data}})).unwrap()
    }

    fn from(ip: &str) -> SocketAddr {
        format!("{ip}:4003").parse().unwrap()
    }

    #[test]
    fn test_dedup_keeps_first_reply() {
        let mut collector = DiscoveryCollector::new();
        let first = reply(json!({"device": "AA:BB", "sku": "H6076"}));
        assert!(collector.ingest(&first, from("192.168.1.10")).is_some());
        assert!(collector.ingest(&first, from("192.168.1.11")).is_none());

        let devices = collector.into_devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].address, Ipv4Addr::new(192, 168, 1, 10));
    }

    #[test]
    fn test_missing_ip_falls_back_to_sender() {
        let mut collector = DiscoveryCollector::new();
        let device = collector
            .ingest(
                &reply(json!({"device": "11:22", "sku": "H6072", "mac": "aa:bb"})),
                from("10.0.0.77"),
            )
            .cloned()
            .unwrap();

        assert_eq!(device.address, Ipv4Addr::new(10, 0, 0, 77));
        assert_eq!(device.mac.as_deref(), Some("aa:bb"));
        assert_eq!(device.display_name(), "H6072 (10.0.0.77)");
    }

    #[test]
    fn test_declared_ip_is_preferred() {
        let mut collector = DiscoveryCollector::new();
        let device = collector
            .ingest(
                &reply(json!({"device": "33:44", "ip": "192.168.5.5", "sku": ""})),
                from("10.0.0.1"),
            )
            .cloned()
            .unwrap();

        assert_eq!(device.address, Ipv4Addr::new(192, 168, 5, 5));
        assert_eq!(device.display_name(), "192.168.5.5");
    }

    #[test]
    fn test_blank_or_invalid_ip_falls_back_to_sender() {
        let sender = from("10.0.0.9");
        assert_eq!(
            resolve_address(Some(""), sender),
            Some(Ipv4Addr::new(10, 0, 0, 9))
        );
        assert_eq!(
            resolve_address(Some("bogus"), sender),
            Some(Ipv4Addr::new(10, 0, 0, 9))
        );
    }

    #[test]
    fn test_noise_is_skipped() {
        let mut collector = DiscoveryCollector::new();
        let sender = from("10.0.0.2");
        assert!(collector.ingest(b"not json", sender).is_none());
        assert!(collector.ingest(br#"{"msg": {"cmd": "devStatus", "data": {}}}"#, sender).is_none());
        assert!(collector.ingest(&reply(json!({"sku": "H6076"})), sender).is_none());
        assert!(collector.ingest(&reply(json!({"device": 42})), sender).is_none());

        assert!(collector.ingest(&reply(json!({"device": "55:66"})), sender).is_some());
        assert_eq!(collector.into_devices().len(), 1);
    }

    #[test]
    fn test_arrival_order_is_preserved() {
        let mut collector = DiscoveryCollector::new();
        for (id, ip) in [("c", "10.0.0.3"), ("a", "10.0.0.1"), ("b", "10.0.0.2")] {
            collector.ingest(&reply(json!({"device": id})), from(ip));
        }
        let ids: Vec<_> = collector
            .into_devices()
            .into_iter()
            .map(|d| d.device_id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    fn free_port() -> u16 {
        std::net::UdpSocket::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn loopback_config(scan_port: u16) -> ProtocolConfig {
        ProtocolConfig {
            scan_port,
            listen_port: free_port(),
            multicast_address: Ipv4Addr::LOCALHOST,
            ..ProtocolConfig::default()
        }
    }

    #[tokio::test]
    async fn test_no_replies_is_empty_list() {
        let config = loopback_config(free_port());
        let started = std::time::Instant::now();

        let devices = discover_devices_with(&config, Duration::from_millis(200))
            .await
            .unwrap();

        assert!(devices.is_empty());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_scan_collects_replies_until_deadline() {
        let device = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = loopback_config(device.local_addr().unwrap().port());
        let listen_port = config.listen_port;

        let fake_device = tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let (size, from) = device.recv_from(&mut buf).await.unwrap();
            let request: Value = serde_json::from_slice(&buf[..size]).unwrap();
            assert_eq!(request["msg"]["cmd"], "scan");
            assert_eq!(request["msg"]["data"]["account_topic"], "reserve");
            assert_eq!(from.port(), listen_port);

            let scan_reply = reply(json!({"device": "AA:BB:CC", "sku": "H6159"}));
            device.send_to(b"garbage", from).await.unwrap();
            device.send_to(&scan_reply, from).await.unwrap();
            device.send_to(&scan_reply, from).await.unwrap();
        });

        let devices = discover_devices_with(&config, Duration::from_millis(500))
            .await
            .unwrap();
        fake_device.await.unwrap();

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_id, "AA:BB:CC");
        assert_eq!(devices[0].address, Ipv4Addr::LOCALHOST);
        assert_eq!(devices[0].sku, "H6159");
    }
}
