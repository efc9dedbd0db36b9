//! Virtual learning bridge.
//!
//! A user-space bridge that forwards Ethernet frames between attached
//! virtual interfaces ("slaves"). Source addresses are learned per slave;
//! frames to a learned address are unicast to its owner and everything
//! else is flooded to every slave except the one it arrived on.
//!
//! Each slave gets a receive task that feeds [`VirtualBridge::input`], and
//! an aging task periodically expires idle learning entries.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use olan_common::{OlanError, OlanResult};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::Level;

use crate::clock::{Clock, SystemClock};
use crate::config::BridgeConfig;
use crate::device::{VirtualInterface, same_interface};
use crate::frame::Frame;
use crate::learner::{Learned, LearnerInfo, LearnerTable};
use crate::provision::{DeviceFactory, IpRoute2, LinkProvisioner};
use crate::registry::InterfaceRegistry;

/// Tenant of management interfaces created by [`VirtualBridge::open`].
const MANAGEMENT_TENANT: &str = "default";

/// Kind of bridge implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeKind {
    /// Kernel bridge device.
    Linux,
    /// User-space learning bridge.
    Virtual,
}

impl fmt::Display for BridgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linux => write!(f, "linux"),
            Self::Virtual => write!(f, "virtual"),
        }
    }
}

/// Bridge lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeState {
    /// Configured, not yet opened.
    Created,
    /// Opening: management interface being provisioned.
    Opened,
    /// Forwarding and aging.
    Running,
    /// Shut down. Terminal.
    Closed,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Opened => write!(f, "opened"),
            Self::Running => write!(f, "running"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Why a frame was not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Shorter than an Ethernet header.
    Runt,
    /// Destination is learned on the interface the frame came from.
    SelfLoop,
}

/// Outcome of forwarding one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Sent to the learned owner of the destination.
    Unicast {
        /// Target interface.
        interface: String,
        /// Whether the send succeeded.
        delivered: bool,
    },
    /// Sent to every slave except the source.
    Flood {
        /// Successful sends.
        delivered: usize,
        /// Failed sends.
        failed: usize,
    },
    /// Not sent anywhere.
    Dropped(DropReason),
}

/// Why a slave receive task ended.
#[derive(Debug, Error)]
pub enum RecvExit {
    /// The interface returned a zero-length read.
    #[error("end of stream")]
    EndOfStream,
    /// The interface returned an error.
    #[error("receive failed: {0}")]
    Failed(#[from] io::Error),
    /// The bridge was closed.
    #[error("bridge closed")]
    Cancelled,
}

/// Common contract of bridge implementations.
#[async_trait]
pub trait Bridger: Send + Sync + fmt::Debug {
    /// Implementation kind.
    fn kind(&self) -> BridgeKind;

    /// Bridge name.
    fn name(&self) -> &str;

    /// Bridge MTU.
    fn mtu(&self) -> usize;

    /// Start the bridge, optionally with a management address.
    async fn open(&self, address: Option<&str>) -> OlanResult<()>;

    /// Stop the bridge.
    async fn close(&self) -> OlanResult<()>;

    /// Attach a registered interface.
    async fn add_slave(&self, name: &str) -> OlanResult<()>;

    /// Detach an interface.
    async fn del_slave(&self, name: &str) -> OlanResult<()>;

    /// Learn from and forward a received frame.
    async fn input(&self, frame: Frame) -> OlanResult<Delivery>;

    /// Set the learning timeout in seconds.
    fn set_timeout(&self, seconds: u64);

    /// Enable or disable spanning tree.
    fn stp(&self, enable: bool) -> OlanResult<()>;

    /// Set the forward delay in seconds.
    fn delay(&self, seconds: u32) -> OlanResult<()>;
}

/// Forwarding state shared with the background tasks.
#[derive(Debug)]
struct BridgeCore {
    name: String,
    mtu: usize,
    timeout: AtomicU64,
    clock: Arc<dyn Clock>,
    slaves: RwLock<HashMap<String, Arc<dyn VirtualInterface>>>,
    learners: LearnerTable,
}

impl BridgeCore {
    fn timeout(&self) -> i64 {
        i64::try_from(self.timeout.load(Ordering::Relaxed)).unwrap_or(i64::MAX)
    }

    fn is_slave(&self, device: &Arc<dyn VirtualInterface>) -> bool {
        self.slaves
            .read()
            .get(device.name())
            .is_some_and(|slave| same_interface(slave, device))
    }

    async fn input(&self, frame: &Frame) -> Delivery {
        if !frame.has_header() {
            tracing::debug!(bridge = %self.name, source = %frame.source().name(), len = frame.len(), "Dropping runt frame");
            return Delivery::Dropped(DropReason::Runt);
        }
        self.learn(frame);
        self.forward(frame).await
    }

    fn learn(&self, frame: &Frame) {
        let Some(mac) = frame.source_mac() else {
            return;
        };
        if self.learners.learn(mac, frame.source(), self.clock.now()) == Learned::Created {
            tracing::info!(bridge = %self.name, %mac, interface = %frame.source().name(), "Learned address");
        }
    }

    async fn forward(&self, frame: &Frame) -> Delivery {
        match self.unicast(frame).await {
            Some(delivery) => delivery,
            None => self.flood(frame).await,
        }
    }

    /// Send to the learned owner of the destination.
    ///
    /// Returns `None` when the destination is unknown or its owner is no
    /// longer attached.
    async fn unicast(&self, frame: &Frame) -> Option<Delivery> {
        let dest = frame.destination_mac()?;
        let owner = self.learners.owner(&dest)?;
        let source = frame.source();

        if same_interface(&owner, source) {
            tracing::debug!(bridge = %self.name, %dest, interface = %source.name(), "Destination on source interface");
            return Some(Delivery::Dropped(DropReason::SelfLoop));
        }
        if !self.is_slave(&owner) {
            return None;
        }

        if tracing::enabled!(Level::DEBUG) {
            tracing::debug!(bridge = %self.name, source = %source.name(), target = %owner.name(), head = %frame.head(), "Unicast");
        }
        let delivered = send_to(&self.name, &owner, frame.data()).await;
        Some(Delivery::Unicast {
            interface: owner.name().to_string(),
            delivered,
        })
    }

    async fn flood(&self, frame: &Frame) -> Delivery {
        let source = frame.source();
        let targets: Vec<Arc<dyn VirtualInterface>> = self
            .slaves
            .read()
            .values()
            .filter(|slave| !same_interface(slave, source))
            .cloned()
            .collect();

        if tracing::enabled!(Level::DEBUG) {
            tracing::debug!(bridge = %self.name, source = %source.name(), targets = targets.len(), head = %frame.head(), "Flood");
        }

        let mut delivered = 0;
        let mut failed = 0;
        for target in &targets {
            if send_to(&self.name, target, frame.data()).await {
                delivered += 1;
            } else {
                failed += 1;
            }
        }
        Delivery::Flood { delivered, failed }
    }

    fn expire(&self) -> usize {
        let removed = self.learners.expire(self.clock.now(), self.timeout());
        tracing::debug!(bridge = %self.name, count = removed.len(), "Expire");
        for mac in &removed {
            tracing::info!(bridge = %self.name, %mac, "Expired address");
        }
        removed.len()
    }
}

/// Send one frame, logging a failure instead of returning it.
async fn send_to(bridge: &str, target: &Arc<dyn VirtualInterface>, data: &Bytes) -> bool {
    match target.send(data).await {
        Ok(_) => true,
        Err(source) => {
            let err = OlanError::SendFailed {
                interface: target.name().to_string(),
                source,
            };
            tracing::warn!(bridge, error = %err, "Forwarding failed");
            false
        }
    }
}

async fn receive_loop(
    core: Arc<BridgeCore>,
    device: Arc<dyn VirtualInterface>,
    shutdown: CancellationToken,
) -> RecvExit {
    let mut buf = vec![0u8; core.mtu];
    loop {
        let n = tokio::select! {
            biased;

            () = shutdown.cancelled() => return RecvExit::Cancelled,

            read = device.recv(&mut buf) => match read {
                Ok(0) => return RecvExit::EndOfStream,
                Ok(n) => n,
                Err(e) => return RecvExit::Failed(e),
            },
        };

        let Some(data) = buf.get(..n) else {
            return RecvExit::Failed(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("recv reported {n} bytes into a {} byte buffer", buf.len()),
            ));
        };
        let frame = Frame::new(Bytes::copy_from_slice(data), device.clone());
        core.input(&frame).await;
    }
}

async fn aging_loop(core: Arc<BridgeCore>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => break,

            _ = ticker.tick() => {
                tracing::trace!(bridge = %core.name, "Aging tick");
                core.expire();
            }
        }
    }
    tracing::debug!(bridge = %core.name, "Aging task stopped");
}

#[derive(Debug)]
struct Management {
    device: Arc<dyn VirtualInterface>,
    address: String,
}

#[derive(Debug, Default)]
struct Receivers {
    tasks: JoinSet<()>,
    running: HashMap<String, (Arc<dyn VirtualInterface>, AbortHandle)>,
}

/// Builder for [`VirtualBridge`].
#[derive(Debug)]
pub struct VirtualBridgeBuilder {
    config: BridgeConfig,
    registry: Arc<InterfaceRegistry>,
    clock: Arc<dyn Clock>,
    provisioner: Arc<dyn LinkProvisioner>,
    factory: Option<Arc<dyn DeviceFactory>>,
}

impl VirtualBridgeBuilder {
    /// Use `clock` for learning timestamps.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use `provisioner` to configure the management interface.
    #[must_use]
    pub fn provisioner(mut self, provisioner: Arc<dyn LinkProvisioner>) -> Self {
        self.provisioner = provisioner;
        self
    }

    /// Use `factory` to create the management interface on open.
    #[must_use]
    pub fn device_factory(mut self, factory: Arc<dyn DeviceFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Build the bridge.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> OlanResult<VirtualBridge> {
        self.config.validate()?;

        let core = Arc::new(BridgeCore {
            name: self.config.name.clone(),
            mtu: self.config.mtu,
            timeout: AtomicU64::new(self.config.timeout),
            clock: self.clock,
            slaves: RwLock::new(HashMap::new()),
            learners: LearnerTable::new(),
        });

        tracing::debug!(bridge = %core.name, mtu = core.mtu, timeout = self.config.timeout, "Created virtual bridge");

        Ok(VirtualBridge {
            core,
            config: self.config,
            registry: self.registry,
            provisioner: self.provisioner,
            factory: self.factory,
            state: Mutex::new(BridgeState::Created),
            management: Mutex::new(None),
            shutdown: CancellationToken::new(),
            aging: Mutex::new(None),
            receivers: Mutex::new(Receivers::default()),
        })
    }
}

/// User-space learning bridge.
#[derive(Debug)]
pub struct VirtualBridge {
    core: Arc<BridgeCore>,
    config: BridgeConfig,
    registry: Arc<InterfaceRegistry>,
    provisioner: Arc<dyn LinkProvisioner>,
    factory: Option<Arc<dyn DeviceFactory>>,
    state: Mutex<BridgeState>,
    management: Mutex<Option<Management>>,
    shutdown: CancellationToken,
    aging: Mutex<Option<JoinHandle<()>>>,
    receivers: Mutex<Receivers>,
}

impl VirtualBridge {
    /// Create a bridge with the system clock and the `ip` provisioner.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: BridgeConfig, registry: Arc<InterfaceRegistry>) -> OlanResult<Self> {
        Self::builder(config, registry).build()
    }

    /// Start building a bridge.
    #[must_use]
    pub fn builder(config: BridgeConfig, registry: Arc<InterfaceRegistry>) -> VirtualBridgeBuilder {
        VirtualBridgeBuilder {
            config,
            registry,
            clock: Arc::new(SystemClock),
            provisioner: Arc::new(IpRoute2),
            factory: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> BridgeState {
        *self.state.lock()
    }

    /// Current learning timeout in seconds.
    #[must_use]
    pub fn timeout(&self) -> u64 {
        self.core.timeout.load(Ordering::Relaxed)
    }

    /// Names of attached slaves, sorted.
    #[must_use]
    pub fn slaves(&self) -> Vec<String> {
        let mut names: Vec<String> = self.core.slaves.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of the learning table.
    #[must_use]
    pub fn learners(&self) -> Vec<LearnerInfo> {
        self.core.learners.snapshot()
    }

    /// Number of receive tasks still running.
    #[must_use]
    pub fn active_receivers(&self) -> usize {
        let mut receivers = self.receivers.lock();
        while receivers.tasks.try_join_next().is_some() {}
        receivers.tasks.len()
    }

    /// Remove learning entries idle past the timeout.
    ///
    /// Called by the aging task; returns the number of removed entries.
    pub fn expire(&self) -> usize {
        self.core.expire()
    }

    /// Send a frame to its explicit output interface.
    ///
    /// Frames without an output interface are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`OlanError::SendFailed`] if the send fails.
    pub async fn output(&self, frame: &Frame) -> OlanResult<()> {
        let Some(device) = frame.output() else {
            return Ok(());
        };
        if tracing::enabled!(Level::DEBUG) {
            tracing::debug!(bridge = %self.core.name, target = %device.name(), head = %frame.head(), "Output");
        }
        device
            .send(frame.data())
            .await
            .map(|_| ())
            .map_err(|source| OlanError::SendFailed {
                interface: device.name().to_string(),
                source,
            })
    }

    fn invalid_state(&self, state: BridgeState) -> OlanError {
        OlanError::InvalidState {
            bridge: self.core.name.clone(),
            state: state.to_string(),
        }
    }

    fn spawn_receiver(&self, device: Arc<dyn VirtualInterface>) {
        let mut receivers = self.receivers.lock();
        while receivers.tasks.try_join_next().is_some() {}
        receivers.running.retain(|_, (_, handle)| !handle.is_finished());

        let name = device.name().to_string();
        if let Some((running, handle)) = receivers.running.get(&name) {
            if same_interface(running, &device) && !handle.is_finished() {
                tracing::debug!(bridge = %self.core.name, interface = %name, "Receive task already running");
                return;
            }
        }

        let core = self.core.clone();
        let shutdown = self.shutdown.clone();
        let reader = device.clone();
        let handle = receivers.tasks.spawn(async move {
            let exit = receive_loop(core.clone(), reader.clone(), shutdown).await;
            match exit {
                RecvExit::Cancelled => {
                    tracing::debug!(bridge = %core.name, interface = %reader.name(), "Receive task cancelled");
                }
                exit => {
                    tracing::info!(bridge = %core.name, interface = %reader.name(), reason = %exit, "Receive task ended");
                }
            }
        });
        receivers.running.insert(name, (device, handle));
    }

    fn detach(&self, name: &str) -> bool {
        let removed = self.core.slaves.write().remove(name).is_some();
        if removed {
            tracing::info!(bridge = %self.core.name, interface = %name, "Detached slave");
        }
        removed
    }

    async fn open_management(&self, factory: &Arc<dyn DeviceFactory>, address: &str) {
        let device = match factory.create(&self.registry, MANAGEMENT_TENANT).await {
            Ok(device) => device,
            Err(e) => {
                tracing::error!(bridge = %self.core.name, error = %e, "Failed to create management interface");
                return;
            }
        };
        let name = device.name().to_string();

        if let Err(e) = self.provisioner.link_up(&name).await {
            tracing::error!(bridge = %self.core.name, interface = %name, error = %e, "Failed to bring management interface up");
        }
        device.up();
        if let Err(e) = self.provisioner.addr_add(&name, address).await {
            tracing::error!(bridge = %self.core.name, interface = %name, address, error = %e, "Failed to assign management address");
        }

        *self.management.lock() = Some(Management {
            device,
            address: address.to_string(),
        });
        if let Err(e) = self.add_slave(&name).await {
            tracing::error!(bridge = %self.core.name, interface = %name, error = %e, "Failed to attach management interface");
            return;
        }
        tracing::info!(bridge = %self.core.name, interface = %name, address, "Management interface ready");
    }

    async fn close_management(&self) {
        let management = self.management.lock().take();
        let Some(Management { device, address }) = management else {
            return;
        };
        let name = device.name().to_string();

        if let Err(e) = self.provisioner.addr_del(&name, &address).await {
            tracing::error!(bridge = %self.core.name, interface = %name, address = %address, error = %e, "Failed to remove management address");
        }
        self.detach(&name);
        self.registry.deregister(&name);
        device.down();
        if let Err(e) = device.close().await {
            tracing::warn!(bridge = %self.core.name, interface = %name, error = %e, "Failed to close management interface");
        }
    }
}

#[async_trait]
impl Bridger for VirtualBridge {
    fn kind(&self) -> BridgeKind {
        BridgeKind::Virtual
    }

    fn name(&self) -> &str {
        &self.core.name
    }

    fn mtu(&self) -> usize {
        self.core.mtu
    }

    async fn open(&self, address: Option<&str>) -> OlanResult<()> {
        {
            let mut state = self.state.lock();
            if *state != BridgeState::Created {
                return Err(self.invalid_state(*state));
            }
            *state = BridgeState::Opened;
        }
        tracing::info!(bridge = %self.core.name, address = ?address, "Opening virtual bridge");

        match (address, &self.factory) {
            (Some(address), Some(factory)) => self.open_management(factory, address).await,
            (Some(address), None) => {
                tracing::warn!(bridge = %self.core.name, address, "No management device factory, address ignored");
            }
            (None, _) => {
                tracing::warn!(bridge = %self.core.name, "No management address");
            }
        }

        let state = {
            let mut state = self.state.lock();
            if *state == BridgeState::Opened {
                let task = tokio::spawn(aging_loop(
                    self.core.clone(),
                    self.config.expire_period(),
                    self.shutdown.clone(),
                ));
                *self.aging.lock() = Some(task);
                *state = BridgeState::Running;
            }
            *state
        };
        if state != BridgeState::Running {
            tracing::warn!(bridge = %self.core.name, state = %state, "Bridge closed while opening");
            self.close_management().await;
            return Err(self.invalid_state(state));
        }
        Ok(())
    }

    async fn close(&self) -> OlanResult<()> {
        {
            let mut state = self.state.lock();
            if *state == BridgeState::Closed {
                return Err(self.invalid_state(*state));
            }
            *state = BridgeState::Closed;
        }
        tracing::info!(bridge = %self.core.name, "Closing virtual bridge");

        self.shutdown.cancel();
        let aging = self.aging.lock().take();
        if let Some(task) = aging {
            if let Err(e) = task.await {
                tracing::warn!(bridge = %self.core.name, error = %e, "Aging task failed");
            }
        }

        self.close_management().await;

        let mut receivers = std::mem::take(&mut *self.receivers.lock());
        while let Some(result) = receivers.tasks.join_next().await {
            if let Err(e) = result {
                tracing::warn!(bridge = %self.core.name, error = %e, "Receive task failed");
            }
        }

        tracing::info!(bridge = %self.core.name, "Virtual bridge closed");
        Ok(())
    }

    async fn add_slave(&self, name: &str) -> OlanResult<()> {
        let state = self.state();
        if state == BridgeState::Closed {
            return Err(self.invalid_state(state));
        }

        let device = self
            .registry
            .lookup(name)
            .ok_or_else(|| OlanError::InterfaceNotFound {
                name: name.to_string(),
            })?;

        self.core
            .slaves
            .write()
            .insert(name.to_string(), device.clone());
        tracing::info!(bridge = %self.core.name, interface = %name, "Attached slave");

        self.spawn_receiver(device);
        Ok(())
    }

    async fn del_slave(&self, name: &str) -> OlanResult<()> {
        self.detach(name);
        Ok(())
    }

    async fn input(&self, frame: Frame) -> OlanResult<Delivery> {
        Ok(self.core.input(&frame).await)
    }

    fn set_timeout(&self, seconds: u64) {
        tracing::debug!(bridge = %self.core.name, seconds, "Setting learning timeout");
        self.core.timeout.store(seconds, Ordering::Relaxed);
    }

    fn stp(&self, _enable: bool) -> OlanResult<()> {
        Err(OlanError::not_supported(&self.core.name, "stp"))
    }

    fn delay(&self, _seconds: u32) -> OlanResult<()> {
        Err(OlanError::not_supported(&self.core.name, "forward delay"))
    }
}
