//! Individual device control.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, OnceLock, PoisonError, Weak};

use log::debug;
use serde_json::{Value, json};

use crate::config::ProtocolConfig;
use crate::errors::Error;
use crate::history::{MessageHistory, MessageType};
use crate::message::{self, Request};
use crate::runtime::Mutex;
use crate::state::DeviceState;
use crate::transport::{Transport, UdpTransport};
use crate::types::{Brightness, Color, Kelvin, PowerMode};

type Result<T> = std::result::Result<T, Error>;

/// Parse user supplied text into a device address.
///
/// # Examples
///
/// ```
/// use govee_lan_rs::parse_device_address;
///
/// assert!(parse_device_address(" 192.168.1.40 ").is_ok());
/// assert!(parse_device_address("living-room").is_err());
/// ```
pub fn parse_device_address(host: &str) -> Result<Ipv4Addr> {
    host.trim()
        .parse()
        .map_err(|_| Error::InvalidAddress(host.to_string()))
}

type LockRegistry = std::sync::Mutex<HashMap<Ipv4Addr, Weak<Mutex<()>>>>;

fn lock_registry() -> &'static LockRegistry {
    static LOCKS: OnceLock<LockRegistry> = OnceLock::new();
    LOCKS.get_or_init(Default::default)
}

/// Exchange lock shared by every client addressing the same device.
///
/// A reply can only be matched to a request as "the next datagram from this
/// address", so exchanges with one device must never interleave. The
/// registry only holds weak references; entries of dropped clients are
/// pruned when a new lock is created.
fn device_lock(ip: Ipv4Addr) -> Arc<Mutex<()>> {
    let mut locks = lock_registry()
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    if let Some(lock) = locks.get(&ip).and_then(Weak::upgrade) {
        return lock;
    }

    locks.retain(|_, lock| lock.strong_count() > 0);
    let lock = Arc::new(Mutex::new(()));
    locks.insert(ip, Arc::downgrade(&lock));
    lock
}

/// Client for a single Govee device.
///
/// All commands are fire-and-forget: the device never acknowledges them, so
/// they succeed as soon as the datagram has been handed to the network. The
/// only request/response exchange is [`DeviceClient::get_device_state`].
///
/// # Example
///
/// ```
/// use std::net::Ipv4Addr;
/// use govee_lan_rs::DeviceClient;
///
/// let client = DeviceClient::new(Ipv4Addr::new(192, 168, 1, 40));
/// assert_eq!(client.address(), Ipv4Addr::new(192, 168, 1, 40));
/// ```
pub struct DeviceClient<T: Transport = UdpTransport> {
    transport: T,
    config: ProtocolConfig,
    lock: Arc<Mutex<()>>,
    history: Mutex<MessageHistory>,
}

impl DeviceClient<UdpTransport> {
    pub fn new(ip: Ipv4Addr) -> Self {
        Self::with_config(ip, ProtocolConfig::default())
    }

    pub fn with_config(ip: Ipv4Addr, config: ProtocolConfig) -> Self {
        let transport = UdpTransport::new(ip, config.buffer_size);
        Self::with_transport(transport, config)
    }
}

impl<T: Transport> DeviceClient<T> {
    pub fn with_transport(transport: T, config: ProtocolConfig) -> Self {
        DeviceClient {
            lock: device_lock(transport.address()),
            transport,
            config,
            history: Mutex::new(MessageHistory::new()),
        }
    }

    pub fn address(&self) -> Ipv4Addr {
        self.transport.address()
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn history(&self) -> MessageHistory {
        self.history.lock().await.clone()
    }

    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
    }

    pub async fn turn_on(&self) -> Result<()> {
        self.set_power(PowerMode::On).await
    }

    pub async fn turn_off(&self) -> Result<()> {
        self.set_power(PowerMode::Off).await
    }

    pub async fn set_power(&self, power: PowerMode) -> Result<()> {
        self.send_command(&Request::turn(power)).await
    }

    /// Set brightness, clamped to 1-100. Returns the value actually sent.
    pub async fn set_brightness(&self, value: i64) -> Result<Brightness> {
        let brightness = Brightness::clamped(value);
        self.send_command(&Request::brightness(brightness)).await?;
        Ok(brightness)
    }

    /// Switch to RGB mode, clamping each channel to 0-255.
    pub async fn set_color(&self, red: i64, green: i64, blue: i64) -> Result<Color> {
        let color = Color::clamped(red, green, blue);
        self.send_command(&Request::color(color)).await?;
        Ok(color)
    }

    /// Switch to white temperature mode, clamped to 2000-9000K.
    pub async fn set_color_temp(&self, kelvin: i64) -> Result<Kelvin> {
        let kelvin = Kelvin::clamped(kelvin);
        self.send_command(&Request::color_temp(kelvin)).await?;
        Ok(kelvin)
    }

    /// Query the device for its current state (live network call).
    ///
    /// Attempt `n` waits `status_timeout * n`. Timeouts, foreign replies and
    /// malformed replies all count as a failed attempt; once every attempt
    /// has failed, [`Error::StatusUnavailable`] is returned.
    ///
    /// A local socket failure (typically the listen port being held by a
    /// socket without `SO_REUSEADDR`) says nothing about the device and is
    /// returned as is, without further attempts.
    pub async fn get_device_state(&self) -> Result<DeviceState> {
        let msg = Request::dev_status().to_value()?;
        let attempts = self.config.max_attempts.max(1);

        for attempt in 1..=attempts {
            let timeout = self.config.status_timeout_for(attempt);
            self.history.lock().await.record(MessageType::Send, &msg);

            let reply = {
                let _exchange = self.lock.lock().await;
                self.transport
                    .send_and_receive(
                        &msg,
                        self.config.control_port,
                        self.config.listen_port,
                        timeout,
                    )
                    .await
            };

            let err = match reply {
                Ok(response) => {
                    self.history
                        .lock()
                        .await
                        .record(MessageType::Receive, &response);
                    match message::parse_status(&response) {
                        Ok(state) => return Ok(state),
                        Err(e) => e,
                    }
                }
                Err(e @ Error::Socket { .. }) => {
                    debug!("Status query to {} failed locally: {}", self.address(), e);
                    self.history.lock().await.record_error(&e.to_string());
                    return Err(e);
                }
                Err(e) => e,
            };

            debug!(
                "Attempt {}/{} failed to get state from {}: {}",
                attempt,
                attempts,
                self.address(),
                err
            );
            self.history.lock().await.record_error(&err.to_string());
        }

        Err(Error::StatusUnavailable { attempts })
    }

    /// Whether the device answers status queries.
    pub async fn check_connection(&self) -> bool {
        self.get_device_state().await.is_ok()
    }

    /// Returns diagnostics including configuration, history and a live
    /// status probe.
    pub async fn diagnostics(&self) -> Value {
        let mut diag = json!({
            "address": self.address().to_string(),
            "control_port": self.config.control_port,
            "listen_port": self.config.listen_port,
        });

        let history = self.history.lock().await;
        diag["history"] = serde_json::to_value(history.summary()).unwrap_or(Value::Null);
        drop(history); // Release lock before network operations

        diag["status"] = match self.get_device_state().await {
            Ok(state) => serde_json::to_value(state).unwrap_or(Value::Null),
            Err(e) => json!({ "error": e.to_string() }),
        };

        diag
    }

    async fn send_command(&self, request: &Request) -> Result<()> {
        let msg = request.to_value()?;
        self.history.lock().await.record(MessageType::Send, &msg);

        let _exchange = self.lock.lock().await;
        self.transport
            .send(&msg, self.config.control_port, self.config.command_timeout)
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::transport::mock::MockTransport;
    use serde_json::json;

    fn client(last_octet: u8) -> DeviceClient<MockTransport> {
        let ip = Ipv4Addr::new(10, 0, 1, last_octet);
        DeviceClient::with_transport(MockTransport::new(ip), ProtocolConfig::default())
    }

    fn status_reply(on: u8, brightness: u8) -> Result<Value> {
        Ok(json!({"msg": {"cmd": "devStatus", "data": {
            "onOff": on, "brightness": brightness,
            "color": {"r": 0, "g": 0, "b": 0}, "colorTemInKelvin": 3000
        }}}))
    }

    #[tokio::test]
    async fn test_brightness_is_clamped_before_sending() {
        let client = client(1);
        assert_eq!(client.set_brightness(0).await.unwrap().value(), 1);
        assert_eq!(client.set_brightness(500).await.unwrap().value(), 100);

        let sent: Vec<_> = client
            .transport()
            .calls()
            .iter()
            .map(|c| c.message["msg"]["data"]["value"].clone())
            .collect();
        assert_eq!(sent, vec![json!(1), json!(100)]);
    }

    #[tokio::test]
    async fn test_color_channels_clamped_independently() {
        let client = client(2);
        client.set_color(-1, 300, 128).await.unwrap();

        let call = &client.transport().calls()[0];
        assert_eq!(call.target_port, 4003);
        assert_eq!(call.listen_port, None);
        assert_eq!(
            call.message["msg"]["data"],
            json!({"color": {"r": 0, "g": 255, "b": 128}, "colorTemInKelvin": 0})
        );
    }

    #[tokio::test]
    async fn test_color_temp_clamped_and_resets_color() {
        let client = client(3);
        assert_eq!(client.set_color_temp(10_000).await.unwrap().kelvin(), 9000);
        assert_eq!(client.set_color_temp(1500).await.unwrap().kelvin(), 2000);

        let call = &client.transport().calls()[1];
        assert_eq!(
            call.message["msg"]["data"],
            json!({"color": {"r": 0, "g": 0, "b": 0}, "colorTemInKelvin": 2000})
        );
    }

    #[tokio::test]
    async fn test_turn_is_fire_and_forget() {
        let client = client(4);
        client.turn_on().await.unwrap();
        client.turn_off().await.unwrap();

        let calls = client.transport().calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.listen_port.is_none()));
        assert_eq!(calls[0].message["msg"]["data"]["value"], 1);
        assert_eq!(calls[1].message["msg"]["data"]["value"], 0);
        assert_eq!(calls[0].timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_status_retries_with_linear_backoff() {
        let client = client(5);
        let result = client.get_device_state().await;

        assert_eq!(
            result.unwrap_err(),
            Error::StatusUnavailable { attempts: 3 }
        );

        let calls = client.transport().calls();
        let timeouts: Vec<_> = calls.iter().map(|c| c.timeout).collect();
        assert_eq!(
            timeouts,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(6)
            ]
        );
        assert!(
            calls
                .iter()
                .all(|c| c.target_port == 4003 && c.listen_port == Some(4002))
        );
    }

    #[tokio::test]
    async fn test_status_succeeds_on_later_attempt() {
        let client = client(6);
        client.transport().push_reply(Err(Error::Timeout));
        client.transport().push_reply(status_reply(1, 64));

        let state = client.get_device_state().await.unwrap();
        assert!(state.on());
        assert_eq!(state.brightness().value(), 64);
        assert_eq!(state.color_temp(), Some(3000));
        assert_eq!(client.transport().exchanges(), 2);
    }

    #[tokio::test]
    async fn test_malformed_reply_counts_as_failed_attempt() {
        let client = client(7);
        client
            .transport()
            .push_reply(Ok(json!({"msg": {"cmd": "scan", "data": {}}})));
        client
            .transport()
            .push_reply(Err(Error::address_mismatch(&Ipv4Addr::new(10, 0, 1, 7), "10.0.1.99")));
        client.transport().push_reply(status_reply(0, 10));

        let state = client.get_device_state().await.unwrap();
        assert!(!state.on());
        assert_eq!(client.transport().exchanges(), 3);

        let history = client.history().await;
        assert_eq!(history.summary().receive_count, 2);
        assert!(history.last_error().unwrap().contains("10.0.1.99"));
    }

    #[tokio::test]
    async fn test_local_socket_failure_is_not_retried() {
        let client = client(10);
        client.transport().push_reply(Err(Error::socket(
            "bind",
            std::io::Error::from(std::io::ErrorKind::AddrInUse),
        )));
        client.transport().push_reply(status_reply(1, 50));

        let result = client.get_device_state().await;
        assert!(matches!(result, Err(Error::Socket { .. })));
        assert_eq!(client.transport().exchanges(), 1);
        assert!(client.history().await.last_error().unwrap().contains("bind"));
    }

    #[tokio::test]
    async fn test_check_connection() {
        let client = client(8);
        assert!(!client.check_connection().await);

        client.transport().push_reply(status_reply(1, 100));
        assert!(client.check_connection().await);
    }

    #[tokio::test]
    async fn test_diagnostics() {
        let client = client(9);
        client.turn_on().await.unwrap();

        let diag = client.diagnostics().await;
        assert_eq!(diag["address"], "10.0.1.9");
        assert_eq!(diag["history"]["send_count"], 1);
        assert!(diag["status"]["error"].is_string());
    }

    #[test]
    fn test_clients_for_same_device_share_lock() {
        let ip = Ipv4Addr::new(10, 0, 2, 1);
        assert!(Arc::ptr_eq(&device_lock(ip), &device_lock(ip)));
        assert!(!Arc::ptr_eq(
            &device_lock(ip),
            &device_lock(Ipv4Addr::new(10, 0, 2, 2))
        ));
    }

    #[test]
    fn test_lock_registry_forgets_dropped_devices() {
        let gone = Ipv4Addr::new(10, 0, 2, 3);
        drop(device_lock(gone));

        let _kept = device_lock(Ipv4Addr::new(10, 0, 2, 4));
        let locks = lock_registry().lock().unwrap();
        assert!(!locks.contains_key(&gone));
        assert!(locks.contains_key(&Ipv4Addr::new(10, 0, 2, 4)));
    }

    #[test]
    fn test_parse_device_address() {
        assert_eq!(
            parse_device_address("10.0.0.5\n").unwrap(),
            Ipv4Addr::new(10, 0, 0, 5)
        );
        assert!(matches!(
            parse_device_address("not an ip"),
            Err(Error::InvalidAddress(_))
        ));
    }
}
