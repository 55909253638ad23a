//! Single-datagram UDP exchanges with one device.
//!
//! Govee devices listen for commands on one port and answer status queries
//! on a different, fixed port, so a request/response exchange binds the
//! reply port before sending instead of reading from the sending socket.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use log::{debug, warn};
use serde_json::Value;

use crate::errors::Error;
use crate::runtime::{self, AsyncUdpSocket, UdpSocket};

type Result<T> = std::result::Result<T, Error>;

/// Sends JSON datagrams to one device.
///
/// [`UdpTransport`] is the real implementation; the trait is the seam the
/// device client is generic over.
pub trait Transport: Send + Sync {
    /// The device this transport talks to.
    fn address(&self) -> Ipv4Addr;

    /// Fire-and-forget send. Failures are logged and swallowed since the
    /// protocol offers no delivery guarantee anyway.
    fn send(
        &self,
        message: &Value,
        target_port: u16,
        timeout: Duration,
    ) -> impl Future<Output = ()> + Send;

    /// Bind `listen_port`, send to `target_port`, and wait up to `timeout`
    /// for a single reply from the device.
    fn send_and_receive(
        &self,
        message: &Value,
        target_port: u16,
        listen_port: u16,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value>> + Send;
}

/// UDP transport bound to a single device address.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    ip: Ipv4Addr,
    buffer_size: usize,
}

impl UdpTransport {
    pub fn new(ip: Ipv4Addr, buffer_size: usize) -> Self {
        UdpTransport { ip, buffer_size }
    }

    async fn try_send(&self, bytes: &[u8], target_port: u16, timeout: Duration) -> Result<()> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| Error::socket("bind", e))?;

        runtime::timeout(timeout, socket.send_to(bytes, &self.target(target_port)))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|e| Error::socket("send_to", e))?;
        Ok(())
    }

    fn target(&self, port: u16) -> String {
        format!("{}:{}", self.ip, port)
    }
}

impl Transport for UdpTransport {
    fn address(&self) -> Ipv4Addr {
        self.ip
    }

    async fn send(&self, message: &Value, target_port: u16, timeout: Duration) {
        let bytes = match serde_json::to_vec(message) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode message for {}: {}", self.ip, e);
                return;
            }
        };

        debug!("Sending to {}:{}: {}", self.ip, target_port, message);
        if let Err(e) = self.try_send(&bytes, target_port, timeout).await {
            warn!("Failed to send to {}:{}: {}", self.ip, target_port, e);
        }
    }

    async fn send_and_receive(
        &self,
        message: &Value,
        target_port: u16,
        listen_port: u16,
        timeout: Duration,
    ) -> Result<Value> {
        let bytes = serde_json::to_vec(message).map_err(Error::JsonDump)?;

        let listen = SocketAddr::from((Ipv4Addr::UNSPECIFIED, listen_port));
        let socket = runtime::bind_reusable(listen).map_err(|e| Error::socket("bind", e))?;

        debug!(
            "Sending to {}:{} (reply on {}): {}",
            self.ip, target_port, listen_port, message
        );
        runtime::timeout(timeout, socket.send_to(&bytes, &self.target(target_port)))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|e| Error::socket("send_to", e))?;

        let mut buffer = vec![0u8; self.buffer_size];
        let (size, sender) = runtime::timeout(timeout, socket.recv_from(&mut buffer))
            .await
            .map_err(|_| {
                debug!("Timeout waiting for reply from {}", self.ip);
                Error::Timeout
            })?
            .map_err(|e| Error::socket("receive", e))?;

        if sender.ip() != IpAddr::V4(self.ip) {
            debug!("Ignoring reply from {} (expected {})", sender.ip(), self.ip);
            return Err(Error::address_mismatch(&self.ip, sender.ip()));
        }

        let response = String::from_utf8(buffer[..size].to_vec()).map_err(Error::Utf8Decode)?;
        let value = serde_json::from_str(&response).map_err(Error::JsonLoad)?;
        debug!("Received from {}: {}", self.ip, value);
        Ok(value)
    }
}
