//! # olan-common
//!
//! Shared utilities and types for the olan virtual network.
//!
//! This crate provides common functionality used across all olan crates:
//! - Ethernet MAC address parsing and classification
//! - Common error types

#![warn(missing_docs)]

pub mod error;
pub mod mac;

pub use error::{OlanError, OlanResult};
pub use mac::MacAddr;
