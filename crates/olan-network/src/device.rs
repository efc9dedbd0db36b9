//! Virtual interface contract.
//!
//! Every endpoint a bridge can attach (kernel tap/tun devices, user-space
//! tunnels, in-memory test devices) implements [`VirtualInterface`].

use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Kind of virtual interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    /// Layer 3 device, carries IP packets.
    Tun,
    /// Layer 2 device, carries Ethernet frames.
    Tap,
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tun => write!(f, "tun"),
            Self::Tap => write!(f, "tap"),
        }
    }
}

/// An attachable network endpoint.
///
/// Bridges only call [`name`](Self::name), [`recv`](Self::recv) and
/// [`send`](Self::send). The lifecycle hooks exist for the driver that owns
/// the device.
#[async_trait]
pub trait VirtualInterface: Send + Sync + fmt::Debug {
    /// Unique name of the interface within its registry.
    fn name(&self) -> &str;

    /// Tun or tap.
    fn kind(&self) -> InterfaceKind;

    /// Whether this is a tun device.
    fn is_tun(&self) -> bool {
        self.kind() == InterfaceKind::Tun
    }

    /// Whether this is a tap device.
    fn is_tap(&self) -> bool {
        self.kind() == InterfaceKind::Tap
    }

    /// Tenant label, opaque to the bridge.
    fn tenant(&self) -> &str;

    /// Current MTU.
    fn mtu(&self) -> usize;

    /// Change the MTU.
    fn set_mtu(&self, mtu: usize);

    /// Receive one frame destined for the bridge into `buf`.
    ///
    /// Returns the number of bytes written. `Ok(0)` means end of stream.
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Send one frame from the bridge to this interface.
    ///
    /// Implementations must not block indefinitely: a stalled send stalls
    /// the forwarding path of the sending bridge.
    async fn send(&self, data: &[u8]) -> io::Result<usize>;

    /// Close the interface. Pending and later `recv` calls end.
    async fn close(&self) -> io::Result<()>;

    /// Record the bridge this interface is enslaved to.
    fn attach(&self, bridge: &str);

    /// Bring the interface up.
    fn up(&self);

    /// Bring the interface down.
    fn down(&self);
}

/// Whether two handles point at the same interface instance.
#[must_use]
pub fn same_interface(a: &Arc<dyn VirtualInterface>, b: &Arc<dyn VirtualInterface>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
