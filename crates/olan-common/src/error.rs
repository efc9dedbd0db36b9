//! Common error types for the olan virtual network.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`OlanError`].
pub type OlanResult<T> = Result<T, OlanError>;

/// Common errors across the olan crates.
#[derive(Error, Diagnostic, Debug)]
pub enum OlanError {
    /// Interface not present in the registry.
    #[error("Interface not found: {name}")]
    #[diagnostic(
        code(olan::interface::not_found),
        help("Register the interface before attaching it to a bridge")
    )]
    InterfaceNotFound {
        /// The interface name that was looked up.
        name: String,
    },

    /// Operation not supported by this bridge kind.
    #[error("Operation not supported on bridge {bridge}: {operation}")]
    #[diagnostic(
        code(olan::bridge::not_supported),
        help("Spanning tree and forward delay require a kernel bridge")
    )]
    NotSupported {
        /// The bridge the operation was invoked on.
        bridge: String,
        /// The unsupported operation.
        operation: String,
    },

    /// Sending a frame to an interface failed.
    #[error("Failed to send frame to {interface}: {source}")]
    #[diagnostic(code(olan::interface::send))]
    SendFailed {
        /// The target interface.
        interface: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Operation invoked in the wrong lifecycle state.
    #[error("Bridge {bridge} is {state}")]
    #[diagnostic(code(olan::bridge::invalid_state))]
    InvalidState {
        /// The bridge name.
        bridge: String,
        /// The state the bridge was in.
        state: String,
    },

    /// Invalid MAC address text.
    #[error("Invalid MAC address: {value}")]
    #[diagnostic(
        code(olan::mac::invalid),
        help("Use formats like 'aa:bb:cc:dd:ee:ff', 'aa-bb-cc-dd-ee-ff' or 'aabbccddeeff'")
    )]
    InvalidMac {
        /// The invalid value.
        value: String,
    },

    /// OS link or address provisioning failed.
    #[error("Provisioning failed: {message}")]
    #[diagnostic(
        code(olan::provision),
        help("Try running with elevated privileges (sudo)")
    )]
    Provision {
        /// The error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(olan::io))]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(olan::config))]
    Config {
        /// The error message.
        message: String,
    },
}

impl OlanError {
    /// Build a [`OlanError::NotSupported`] for `operation` on `bridge`.
    pub fn not_supported(bridge: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::NotSupported {
            bridge: bridge.into(),
            operation: operation.into(),
        }
    }
}
