//! OS provisioning boundary.
//!
//! The virtual bridge can own a management interface that gives the host
//! an address on the bridged segment. Creating that device and configuring
//! it in the kernel is delegated to the traits in this module.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use olan_common::{OlanError, OlanResult};
use tokio::process::Command;

use crate::device::VirtualInterface;
use crate::registry::InterfaceRegistry;

/// Brings links up and manages their addresses.
#[async_trait]
pub trait LinkProvisioner: Send + Sync + fmt::Debug {
    /// Set the link administratively up.
    async fn link_up(&self, device: &str) -> OlanResult<()>;

    /// Assign `address` (CIDR notation) to the link.
    async fn addr_add(&self, device: &str, address: &str) -> OlanResult<()>;

    /// Remove `address` from the link.
    async fn addr_del(&self, device: &str, address: &str) -> OlanResult<()>;
}

/// Creates the management interface of a bridge.
#[async_trait]
pub trait DeviceFactory: Send + Sync + fmt::Debug {
    /// Create a device for `tenant` and register it in `registry`.
    async fn create(
        &self,
        registry: &InterfaceRegistry,
        tenant: &str,
    ) -> OlanResult<Arc<dyn VirtualInterface>>;
}

/// [`LinkProvisioner`] backed by the iproute2 `ip` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpRoute2;

impl IpRoute2 {
    async fn run(args: &[&str]) -> OlanResult<()> {
        exec("ip", args).await
    }
}

/// Run `program` and map a non-zero exit to [`OlanError::Provision`].
///
/// Failing to start the program at all is an [`OlanError::Io`].
async fn exec(program: &str, args: &[&str]) -> OlanResult<()> {
    let command = args.join(" ");
    tracing::debug!(program, %command, "Running command");

    let output = Command::new(program).args(args).output().await?;

    if !output.status.success() {
        return Err(OlanError::Provision {
            message: format!(
                "{program} {command} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    Ok(())
}

#[async_trait]
impl LinkProvisioner for IpRoute2 {
    async fn link_up(&self, device: &str) -> OlanResult<()> {
        Self::run(&["link", "set", device, "up"]).await
    }

    async fn addr_add(&self, device: &str, address: &str) -> OlanResult<()> {
        Self::run(&["addr", "add", address, "dev", device]).await
    }

    async fn addr_del(&self, device: &str, address: &str) -> OlanResult<()> {
        Self::run(&["addr", "del", address, "dev", device]).await
    }
}
