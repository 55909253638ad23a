//! Periodic state polling with a local-state fallback.
//!
//! Some Govee models never answer `devStatus`. The coordinator finds this out
//! on the first poll that gets no answer, stops querying for good, and from
//! then on reports the state implied by the commands it has sent.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::client::DeviceClient;
use crate::errors::Error;
use crate::runtime::{self, JoinHandle, Mutex};
use crate::state::{DeviceState, StateUpdate};
use crate::transport::{Transport, UdpTransport};
use crate::types::{Brightness, Color, Kelvin, PowerMode};

type Result<T> = std::result::Result<T, Error>;

pub type StateCallback = Box<dyn Fn(&DeviceState) + Send + Sync + 'static>;

/// Handle returned by [`Coordinator::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Whether the device answers status queries.
///
/// `Unsupported` is final: it is never probed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StatusSupport {
    Unknown,
    Supported,
    Unsupported,
}

/// Attributes for [`Coordinator::apply`]. Color wins over color temperature
/// when both are set.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightRequest {
    pub brightness: Option<Brightness>,
    pub color: Option<Color>,
    pub color_temp: Option<Kelvin>,
}

impl LightRequest {
    pub fn is_empty(&self) -> bool {
        self.brightness.is_none() && self.color.is_none() && self.color_temp.is_none()
    }
}

#[derive(Debug, Clone, Copy)]
struct Tracked {
    state: DeviceState,
    available: bool,
    status_support: StatusSupport,
}

/// Polls one device and publishes its state.
///
/// Cloning is cheap; clones share the same state and poll task.
///
/// ```ignore
/// let coordinator = Coordinator::new(Arc::new(DeviceClient::new(ip)));
/// coordinator.subscribe(|state| println!("{state:?}"));
/// coordinator.start();
/// coordinator.set_brightness(40).await?;
/// ```
pub struct Coordinator<T: Transport = UdpTransport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for Coordinator<T> {
    fn clone(&self) -> Self {
        Coordinator {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T: Transport> {
    client: Arc<DeviceClient<T>>,
    poll_interval: Duration,
    tracked: RwLock<Tracked>,
    // Poll cycles never overlap, whether scheduled or requested.
    refresh_lock: Mutex<()>,
    subscribers: StdMutex<Vec<(SubscriptionId, StateCallback)>>,
    next_subscription: AtomicU64,
    running: AtomicBool,
    // Bumped on every start; a poll loop from an earlier start exits on
    // its next wake-up even where the runtime cannot abort it.
    generation: AtomicU64,
    poll_task: StdMutex<Option<JoinHandle>>,
}

impl<T: Transport> Coordinator<T> {
    pub fn new(client: Arc<DeviceClient<T>>) -> Self {
        let poll_interval = client.config().poll_interval;
        Coordinator {
            inner: Arc::new(Inner {
                client,
                poll_interval,
                tracked: RwLock::new(Tracked {
                    state: DeviceState::default(),
                    available: false,
                    status_support: StatusSupport::Unknown,
                }),
                refresh_lock: Mutex::new(()),
                subscribers: StdMutex::new(Vec::new()),
                next_subscription: AtomicU64::new(0),
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                poll_task: StdMutex::new(None),
            }),
        }
    }

    pub fn client(&self) -> &Arc<DeviceClient<T>> {
        &self.inner.client
    }

    /// Latest known state: the device's own report when it answers status
    /// queries, otherwise the locally tracked state.
    pub fn current_state(&self) -> DeviceState {
        self.inner.read().state
    }

    /// False until the first poll cycle completes, then true for good.
    pub fn is_available(&self) -> bool {
        self.inner.read().available
    }

    pub fn status_support(&self) -> StatusSupport {
        self.inner.read().status_support
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Register a callback invoked with every published state.
    ///
    /// Callbacks run on the polling task and must not subscribe or
    /// unsubscribe from within.
    pub fn subscribe<F: Fn(&DeviceState) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::SeqCst));
        self.inner
            .subscribers()
            .push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.subscribers().retain(|(sub, _)| *sub != id);
    }

    /// Run one poll cycle now.
    pub async fn refresh(&self) {
        self.inner.refresh().await
    }

    /// Initial refresh performed when a host sets the device up.
    pub async fn first_refresh(&self) {
        self.refresh().await
    }

    /// Publish fresh state out of schedule.
    ///
    /// For devices that do not answer status queries the local state is
    /// republished without touching the network.
    pub async fn request_immediate_refresh(&self) {
        if self.status_support() == StatusSupport::Unsupported {
            let state = self.current_state();
            self.inner.publish(&state);
        } else {
            self.refresh().await;
        }
    }

    /// Record the intended effect of a command that was just sent.
    ///
    /// Setting a color clears the tracked temperature and vice versa.
    pub fn update_local_state(&self, update: &StateUpdate) {
        self.inner.write().state.apply(update);
    }

    pub async fn turn_on(&self) -> Result<()> {
        self.set_power(PowerMode::On).await
    }

    pub async fn turn_off(&self) -> Result<()> {
        self.set_power(PowerMode::Off).await
    }

    pub async fn set_power(&self, power: PowerMode) -> Result<()> {
        self.inner.client.set_power(power).await?;
        self.commit(&StateUpdate::from(&power)).await;
        Ok(())
    }

    pub async fn set_brightness(&self, value: i64) -> Result<Brightness> {
        let brightness = self.inner.client.set_brightness(value).await?;
        self.commit(&StateUpdate::from(&brightness)).await;
        Ok(brightness)
    }

    pub async fn set_color(&self, red: i64, green: i64, blue: i64) -> Result<Color> {
        let color = self.inner.client.set_color(red, green, blue).await?;
        self.commit(&StateUpdate::from(&color)).await;
        Ok(color)
    }

    pub async fn set_color_temp(&self, kelvin: i64) -> Result<Kelvin> {
        let kelvin = self.inner.client.set_color_temp(kelvin).await?;
        self.commit(&StateUpdate::from(&kelvin)).await;
        Ok(kelvin)
    }

    /// Turn the light on with optional attributes.
    ///
    /// Brightness is sent first, then color or temperature. The light is
    /// switched on when no attribute was given or when it is currently off.
    pub async fn apply(&self, request: &LightRequest) -> Result<()> {
        let client = &self.inner.client;
        let mut update = StateUpdate::new();

        if let Some(brightness) = request.brightness {
            update.brightness(&client.set_brightness(brightness.value().into()).await?);
        }

        if let Some(color) = request.color {
            let sent = client
                .set_color(color.red().into(), color.green().into(), color.blue().into())
                .await?;
            update.color(&sent);
        } else if let Some(kelvin) = request.color_temp {
            update.color_temp(&client.set_color_temp(kelvin.kelvin().into()).await?);
        }

        if request.is_empty() || !self.current_state().on() {
            client.turn_on().await?;
            update.power(&PowerMode::On);
        }

        self.commit(&update).await;
        Ok(())
    }

    async fn commit(&self, update: &StateUpdate) {
        self.update_local_state(update);
        self.request_immediate_refresh().await;
    }
}

impl<T: Transport + 'static> Coordinator<T> {
    /// Start the background poll task: one cycle immediately, then one per
    /// `poll_interval`. Does nothing if already running.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = runtime::spawn(poll_loop(
            Arc::downgrade(&self.inner),
            self.inner.poll_interval,
            generation,
        ));
        *self.inner.poll_task() = Some(handle);
    }

    /// Stop the background poll task.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.inner.poll_task().take() {
            handle.abort();
        }
    }
}

async fn poll_loop<T: Transport>(weak: Weak<Inner<T>>, interval: Duration, generation: u64) {
    loop {
        let Some(inner) = weak.upgrade() else { break };
        if !inner.running.load(Ordering::SeqCst)
            || inner.generation.load(Ordering::SeqCst) != generation
        {
            break;
        }
        inner.refresh().await;
        drop(inner);
        runtime::sleep(interval).await;
    }
    debug!("Poll loop stopped");
}

impl<T: Transport> Inner<T> {
    fn read(&self) -> RwLockReadGuard<'_, Tracked> {
        self.tracked.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tracked> {
        self.tracked.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribers(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, StateCallback)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn poll_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle>> {
        self.poll_task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn refresh(&self) {
        let _cycle = self.refresh_lock.lock().await;

        let unsupported = self.read().status_support == StatusSupport::Unsupported;
        let state = if unsupported {
            self.settle(None)
        } else {
            let result = self.client.get_device_state().await;
            self.settle(Some(result))
        };

        self.publish(&state);
    }

    /// Fold one poll outcome into the tracked state. `None` means no query
    /// was made.
    fn settle(&self, result: Option<Result<DeviceState>>) -> DeviceState {
        let address = self.client.address();
        let mut tracked = self.write();
        tracked.available = true;

        match result {
            None => {}
            Some(Ok(state)) => {
                if tracked.status_support == StatusSupport::Unknown {
                    info!("Device {} answers status queries", address);
                }
                tracked.status_support = StatusSupport::Supported;
                tracked.state = state;
            }
            Some(Err(Error::StatusUnavailable { attempts })) => {
                info!(
                    "Device {} did not answer {} status queries, using local state tracking",
                    address, attempts
                );
                tracked.status_support = StatusSupport::Unsupported;
            }
            Some(Err(e)) => debug!("Error updating {}: {}", address, e),
        }

        tracked.state
    }

    fn publish(&self, state: &DeviceState) {
        for (_, callback) in self.subscribers().iter() {
            callback(state);
        }
    }
}

impl<T: Transport> Drop for Inner<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.poll_task().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::config::ProtocolConfig;
    use crate::transport::mock::MockTransport;
    use serde_json::{Value, json};

    fn coordinator(last_octet: u8) -> Coordinator<MockTransport> {
        let ip = Ipv4Addr::new(10, 0, 3, last_octet);
        let client = DeviceClient::with_transport(MockTransport::new(ip), ProtocolConfig::default());
        Coordinator::new(Arc::new(client))
    }

    fn transport(coordinator: &Coordinator<MockTransport>) -> &MockTransport {
        coordinator.client().transport()
    }

    fn status_reply(on: u8, brightness: u8) -> Result<Value> {
        Ok(json!({"msg": {"cmd": "devStatus", "data": {
            "onOff": on, "brightness": brightness,
            "color": {"r": 9, "g": 8, "b": 7}, "colorTemInKelvin": 0
        }}}))
    }

    #[tokio::test]
    async fn test_unavailable_until_first_poll() {
        let coordinator = coordinator(1);
        assert!(!coordinator.is_available());
        assert_eq!(coordinator.status_support(), StatusSupport::Unknown);
        assert_eq!(coordinator.current_state(), DeviceState::default());
    }

    #[tokio::test]
    async fn test_successful_poll_is_authoritative() {
        let coordinator = coordinator(2);
        transport(&coordinator).push_reply(status_reply(1, 55));

        coordinator.first_refresh().await;

        assert!(coordinator.is_available());
        assert_eq!(coordinator.status_support(), StatusSupport::Supported);
        let state = coordinator.current_state();
        assert!(state.on());
        assert_eq!(state.brightness().value(), 55);
        assert_eq!(state.color(), Color::rgb(9, 8, 7));
    }

    #[tokio::test]
    async fn test_latch_stops_further_queries() {
        let coordinator = coordinator(3);
        coordinator.refresh().await;

        assert_eq!(coordinator.status_support(), StatusSupport::Unsupported);
        assert!(coordinator.is_available());
        assert_eq!(transport(&coordinator).exchanges(), 3);

        // The device would answer now, but is never asked again.
        transport(&coordinator).push_reply(status_reply(1, 20));
        coordinator.refresh().await;
        coordinator.refresh().await;
        coordinator.request_immediate_refresh().await;

        assert_eq!(transport(&coordinator).exchanges(), 3);
        assert_eq!(coordinator.status_support(), StatusSupport::Unsupported);
        assert!(coordinator.is_available());
        assert_eq!(coordinator.current_state(), DeviceState::default());
        assert!(coordinator.client().get_device_state().await.is_ok());
    }

    #[tokio::test]
    async fn test_supported_device_that_goes_quiet_is_latched() {
        let coordinator = coordinator(4);
        transport(&coordinator).push_reply(status_reply(1, 80));
        coordinator.refresh().await;
        coordinator.refresh().await;

        assert_eq!(coordinator.status_support(), StatusSupport::Unsupported);
        assert!(coordinator.is_available());
        assert_eq!(coordinator.current_state().brightness().value(), 80);
    }

    #[tokio::test]
    async fn test_other_errors_do_not_latch() {
        let coordinator = coordinator(5);
        coordinator.inner.settle(Some(Err(Error::Timeout)));

        assert_eq!(coordinator.status_support(), StatusSupport::Unknown);
        assert!(coordinator.is_available());
    }

    #[tokio::test]
    async fn test_local_state_tracks_commands_while_latched() {
        let coordinator = coordinator(6);
        coordinator.refresh().await;

        let published = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&published);
        coordinator.subscribe(move |state| sink.lock().unwrap().push(*state));

        coordinator.turn_on().await.unwrap();
        coordinator.set_color(300, 10, -4).await.unwrap();
        let state = coordinator.current_state();
        assert!(state.on());
        assert_eq!(state.color(), Color::rgb(255, 10, 0));
        assert_eq!(state.color_temp_kelvin(), 0);

        coordinator.set_color_temp(4500).await.unwrap();
        let state = coordinator.current_state();
        assert_eq!(state.color(), Color::BLACK);
        assert_eq!(state.color_temp(), Some(4500));

        assert_eq!(transport(&coordinator).exchanges(), 3);
        let published = published.lock().unwrap();
        assert_eq!(published.len(), 3);
        assert_eq!(published[2], state);
    }

    #[tokio::test]
    async fn test_immediate_refresh_polls_supported_device() {
        let coordinator = coordinator(7);
        transport(&coordinator).push_reply(status_reply(0, 100));
        coordinator.refresh().await;

        transport(&coordinator).push_reply(status_reply(1, 30));
        coordinator.set_brightness(30).await.unwrap();

        assert_eq!(transport(&coordinator).exchanges(), 2);
        assert_eq!(coordinator.current_state().brightness().value(), 30);
        assert!(coordinator.current_state().on());
    }

    #[tokio::test]
    async fn test_apply_turns_on_only_when_needed() {
        let coordinator = coordinator(8);
        coordinator.refresh().await;
        let sends = |c: &Coordinator<MockTransport>| -> Vec<String> {
            transport(c)
                .calls()
                .iter()
                .filter(|call| call.listen_port.is_none())
                .map(|call| call.message["msg"]["cmd"].as_str().unwrap().to_string())
                .collect()
        };

        coordinator
            .apply(&LightRequest {
                brightness: Brightness::create(30),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(sends(&coordinator), vec!["brightness", "turn"]);

        coordinator
            .apply(&LightRequest {
                color: Some(Color::rgb(1, 2, 3)),
                color_temp: Kelvin::create(3000),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(sends(&coordinator), vec!["brightness", "turn", "colorwc"]);

        let state = coordinator.current_state();
        assert!(state.on());
        assert_eq!(state.brightness().value(), 30);
        assert_eq!(state.color(), Color::rgb(1, 2, 3));
        assert_eq!(state.color_temp(), None);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let coordinator = coordinator(9);
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let id = coordinator.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        coordinator.refresh().await;
        coordinator.unsubscribe(id);
        coordinator.refresh().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_polling_follows_interval() {
        let coordinator = coordinator(10);
        for _ in 0..6 {
            transport(&coordinator).push_reply(status_reply(1, 50));
        }

        coordinator.start();
        coordinator.start();
        assert!(coordinator.is_running());

        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(transport(&coordinator).exchanges(), 3);

        coordinator.stop();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport(&coordinator).exchanges(), 3);
        assert!(!coordinator.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_last_handle_ends_polling() {
        let coordinator = coordinator(11);
        for _ in 0..6 {
            transport(&coordinator).push_reply(status_reply(1, 50));
        }
        let client = Arc::clone(coordinator.client());

        coordinator.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(client.transport().exchanges(), 1);

        drop(coordinator);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(client.transport().exchanges(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_loop_from_earlier_start_exits() {
        let coordinator = coordinator(12);
        for _ in 0..6 {
            transport(&coordinator).push_reply(status_reply(1, 50));
        }

        coordinator.start();
        coordinator.stop();
        coordinator.start();

        // A loop left over from the first start, as on runtimes that cannot
        // abort it.
        let stale = tokio::spawn(poll_loop(
            Arc::downgrade(&coordinator.inner),
            Duration::from_secs(30),
            1,
        ));

        tokio::time::sleep(Duration::from_secs(65)).await;
        assert!(stale.is_finished());
        assert_eq!(transport(&coordinator).exchanges(), 3);
        coordinator.stop();
    }

    #[tokio::test]
    async fn test_busy_listen_port_does_not_latch() {
        let device = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let control_port = device.local_addr().unwrap().port();
        // Held without SO_REUSEADDR, so the status query cannot bind it.
        let holder = std::net::UdpSocket::bind("0.0.0.0:0").unwrap();
        let listen_port = holder.local_addr().unwrap().port();

        let config = ProtocolConfig {
            control_port,
            listen_port,
            status_timeout: Duration::from_millis(500),
            ..ProtocolConfig::default()
        };
        let client = DeviceClient::with_config(Ipv4Addr::LOCALHOST, config);
        let coordinator = Coordinator::new(Arc::new(client));

        coordinator.refresh().await;
        assert_eq!(coordinator.status_support(), StatusSupport::Unknown);
        assert!(coordinator.is_available());

        drop(holder);
        let fake_device = tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let (_, from) = device.recv_from(&mut buf).await.unwrap();
            let reply = json!({"msg": {"cmd": "devStatus", "data": {"onOff": 1, "brightness": 40}}});
            device
                .send_to(reply.to_string().as_bytes(), from)
                .await
                .unwrap();
        });

        coordinator.refresh().await;
        fake_device.await.unwrap();
        assert_eq!(coordinator.status_support(), StatusSupport::Supported);
        assert_eq!(coordinator.current_state().brightness().value(), 40);
    }
}
