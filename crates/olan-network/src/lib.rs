//! # olan-network
//!
//! Data plane of the olan overlay: a user-space learning bridge that
//! forwards Ethernet frames between virtual interfaces.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use olan_network::{
//!     BridgeConfig, Bridger, InterfaceKind, InterfaceRegistry, MemoryInterface, VirtualBridge,
//!     VirtualInterface,
//! };
//!
//! # async fn example() -> olan_common::OlanResult<()> {
//! let registry = Arc::new(InterfaceRegistry::new());
//! let a = MemoryInterface::create(&registry, "default", InterfaceKind::Tap);
//! let b = MemoryInterface::create(&registry, "default", InterfaceKind::Tap);
//!
//! let bridge = VirtualBridge::new(BridgeConfig::new("br0"), registry)?;
//! bridge.open(None).await?;
//! bridge.add_slave(a.name()).await?;
//! bridge.add_slave(b.name()).await?;
//!
//! // ... frames injected on `a` now reach `b` ...
//!
//! bridge.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod bridge;
pub mod clock;
pub mod config;
pub mod device;
pub mod frame;
pub mod learner;
pub mod memory;
pub mod provision;
pub mod registry;

pub use bridge::{BridgeKind, BridgeState, Bridger, Delivery, DropReason, RecvExit, VirtualBridge};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::BridgeConfig;
pub use device::{InterfaceKind, VirtualInterface};
pub use frame::Frame;
pub use learner::{LearnerInfo, LearnerTable};
pub use memory::{MemoryDeviceFactory, MemoryInterface};
pub use provision::{DeviceFactory, IpRoute2, LinkProvisioner};
pub use registry::InterfaceRegistry;
