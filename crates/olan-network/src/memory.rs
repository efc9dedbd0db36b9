//! In-memory virtual interface.
//!
//! [`MemoryInterface`] is a user-space endpoint backed by tokio channels.
//! Frames injected with [`MemoryInterface::inject`] are returned by `recv`
//! to the bridge; frames the bridge sends are recorded and can be inspected.
//! It is used for simulations and tests.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use olan_common::OlanResult;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::device::{InterfaceKind, VirtualInterface};
use crate::provision::DeviceFactory;
use crate::registry::InterfaceRegistry;

/// Default MTU of in-memory interfaces.
const DEFAULT_MTU: usize = 1500;

/// Channel-backed virtual interface.
#[derive(Debug)]
pub struct MemoryInterface {
    name: String,
    tenant: String,
    kind: InterfaceKind,
    mtu: AtomicUsize,
    inbound_tx: mpsc::UnboundedSender<Bytes>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
    sent: Mutex<Vec<Bytes>>,
    sent_count: watch::Sender<usize>,
    fail_sends: AtomicBool,
    up: AtomicBool,
    master: Mutex<Option<String>>,
    closed: CancellationToken,
}

impl MemoryInterface {
    /// Create an unregistered interface.
    #[must_use]
    pub fn new(name: &str, tenant: &str, kind: InterfaceKind) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (sent_count, _) = watch::channel(0);
        Arc::new(Self {
            name: name.to_string(),
            tenant: tenant.to_string(),
            kind,
            mtu: AtomicUsize::new(DEFAULT_MTU),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            sent: Mutex::new(Vec::new()),
            sent_count,
            fail_sends: AtomicBool::new(false),
            up: AtomicBool::new(false),
            master: Mutex::new(None),
            closed: CancellationToken::new(),
        })
    }

    /// Create an interface with a generated name and register it.
    pub fn create(registry: &InterfaceRegistry, tenant: &str, kind: InterfaceKind) -> Arc<Self> {
        let device = Self::new(&registry.generate_name(), tenant, kind);
        registry.register(device.clone());
        device
    }

    /// Queue a frame to be returned by the next `recv`.
    ///
    /// Returns `false` if the interface is closed.
    pub fn inject(&self, data: impl Into<Bytes>) -> bool {
        if self.closed.is_cancelled() {
            return false;
        }
        self.inbound_tx.send(data.into()).is_ok()
    }

    /// Frames sent to this interface so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    /// Drain the recorded frames.
    pub fn take_sent(&self) -> Vec<Bytes> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Number of frames sent to this interface since creation.
    #[must_use]
    pub fn sent_count(&self) -> usize {
        *self.sent_count.borrow()
    }

    /// Wait until at least `count` frames were sent, or `timeout` elapses.
    ///
    /// Returns whether the count was reached.
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> bool {
        let mut rx = self.sent_count.subscribe();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|n| *n >= count)).await,
            Ok(Ok(_))
        )
    }

    /// Make every following `send` fail.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Whether the interface is up.
    #[must_use]
    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    /// Bridge this interface was attached to.
    #[must_use]
    pub fn master(&self) -> Option<String> {
        self.master.lock().clone()
    }

    /// Whether `close` was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[async_trait]
impl VirtualInterface for MemoryInterface {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> InterfaceKind {
        self.kind
    }

    fn tenant(&self) -> &str {
        &self.tenant
    }

    fn mtu(&self) -> usize {
        self.mtu.load(Ordering::Relaxed)
    }

    fn set_mtu(&self, mtu: usize) {
        self.mtu.store(mtu, Ordering::Relaxed);
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut rx = self.inbound_rx.lock().await;
        tokio::select! {
            biased;

            () = self.closed.cancelled() => Ok(0),

            frame = rx.recv() => match frame {
                Some(data) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    Ok(n)
                }
                None => Ok(0),
            },
        }
    }

    async fn send(&self, data: &[u8]) -> io::Result<usize> {
        if self.closed.is_cancelled() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("{} is closed", self.name),
            ));
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(io::Error::other(format!("{} rejected frame", self.name)));
        }

        self.sent.lock().push(Bytes::copy_from_slice(data));
        self.sent_count.send_modify(|n| *n += 1);
        Ok(data.len())
    }

    async fn close(&self) -> io::Result<()> {
        tracing::debug!(interface = %self.name, "Closing memory interface");
        self.closed.cancel();
        self.up.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn attach(&self, bridge: &str) {
        *self.master.lock() = Some(bridge.to_string());
    }

    fn up(&self) {
        self.up.store(true, Ordering::SeqCst);
    }

    fn down(&self) {
        self.up.store(false, Ordering::SeqCst);
    }
}

/// Creates [`MemoryInterface`] tap devices for bridge management ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryDeviceFactory;

#[async_trait]
impl DeviceFactory for MemoryDeviceFactory {
    async fn create(
        &self,
        registry: &InterfaceRegistry,
        tenant: &str,
    ) -> OlanResult<Arc<dyn VirtualInterface>> {
        let device: Arc<dyn VirtualInterface> =
            MemoryInterface::create(registry, tenant, InterfaceKind::Tap);
        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inject_then_recv() {
        let dev = MemoryInterface::new("vir1", "default", InterfaceKind::Tap);
        assert!(dev.inject(vec![1u8, 2, 3]));

        let mut buf = [0u8; 16];
        let n = dev.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);
    }

    #[tokio::test]
    async fn recv_truncates_to_buffer() {
        let dev = MemoryInterface::new("vir1", "default", InterfaceKind::Tap);
        dev.inject(vec![7u8; 32]);

        let mut buf = [0u8; 8];
        assert_eq!(dev.recv(&mut buf).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn close_ends_recv() {
        let dev = MemoryInterface::new("vir1", "default", InterfaceKind::Tap);
        let reader = dev.clone();
        let task = tokio::spawn(async move {
            let mut buf = [0u8; 16];
            reader.recv(&mut buf).await
        });

        dev.close().await.unwrap();
        assert_eq!(task.await.unwrap().unwrap(), 0);
        assert!(!dev.inject(vec![1u8]));
        assert!(dev.send(&[1, 2]).await.is_err());
    }

    #[tokio::test]
    async fn send_records_and_fails_on_demand() {
        let dev = MemoryInterface::new("vir1", "default", InterfaceKind::Tap);
        assert_eq!(dev.send(&[1, 2, 3]).await.unwrap(), 3);
        assert_eq!(dev.sent_count(), 1);
        assert!(dev.wait_for_sent(1, Duration::from_millis(10)).await);

        dev.set_fail_sends(true);
        assert!(dev.send(&[4]).await.is_err());
        assert_eq!(dev.take_sent(), vec![Bytes::from_static(&[1, 2, 3])]);
        assert!(dev.sent().is_empty());
    }

    #[test]
    fn lifecycle_hooks() {
        let dev = MemoryInterface::new("vir1", "tenant-a", InterfaceKind::Tun);
        assert!(dev.is_tun());
        assert!(!dev.is_tap());
        assert_eq!(dev.tenant(), "tenant-a");

        dev.up();
        assert!(dev.is_up());
        dev.down();
        assert!(!dev.is_up());

        dev.set_mtu(9000);
        assert_eq!(dev.mtu(), 9000);

        dev.attach("br0");
        assert_eq!(dev.master().as_deref(), Some("br0"));
    }

    #[test]
    fn create_registers() {
        let registry = InterfaceRegistry::new();
        let dev = MemoryInterface::create(&registry, "default", InterfaceKind::Tap);
        assert_eq!(dev.name(), "vir1");
        assert!(registry.contains("vir1"));
    }
}
