//! Ethernet frame envelope.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use olan_common::MacAddr;

use crate::device::VirtualInterface;

/// Length of an Ethernet II header (destination, source, ethertype).
pub const ETHERNET_HEADER_LEN: usize = 14;

/// Number of leading bytes included in debug dumps.
const DUMP_LEN: usize = 20;

/// A raw Ethernet frame and the interface it came from.
#[derive(Clone)]
pub struct Frame {
    data: Bytes,
    source: Arc<dyn VirtualInterface>,
    output: Option<Arc<dyn VirtualInterface>>,
}

impl Frame {
    /// Wrap a payload received on `source`.
    pub fn new(data: impl Into<Bytes>, source: Arc<dyn VirtualInterface>) -> Self {
        Self {
            data: data.into(),
            source,
            output: None,
        }
    }

    /// Set an explicit output interface.
    #[must_use]
    pub fn with_output(mut self, output: Arc<dyn VirtualInterface>) -> Self {
        self.output = Some(output);
        self
    }

    /// Raw frame bytes.
    #[must_use]
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Interface the frame arrived on.
    #[must_use]
    pub const fn source(&self) -> &Arc<dyn VirtualInterface> {
        &self.source
    }

    /// Explicit output interface, if any.
    #[must_use]
    pub const fn output(&self) -> Option<&Arc<dyn VirtualInterface>> {
        self.output.as_ref()
    }

    /// Frame length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Destination MAC (bytes 0..6).
    #[must_use]
    pub fn destination_mac(&self) -> Option<MacAddr> {
        MacAddr::from_slice(&self.data)
    }

    /// Source MAC (bytes 6..12).
    #[must_use]
    pub fn source_mac(&self) -> Option<MacAddr> {
        MacAddr::from_slice(self.data.get(MacAddr::LEN..)?)
    }

    /// Whether the frame carries a complete Ethernet header.
    #[must_use]
    pub fn has_header(&self) -> bool {
        self.data.len() >= ETHERNET_HEADER_LEN
    }

    /// Hex dump of the leading header bytes, for debug logs.
    #[must_use]
    pub fn head(&self) -> String {
        hex::encode(&self.data[..self.data.len().min(DUMP_LEN)])
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("len", &self.data.len())
            .field("source", &self.source.name())
            .field("output", &self.output.as_ref().map(|o| o.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::InterfaceKind;
    use crate::memory::MemoryInterface;

    #[test]
    fn header_fields() {
        let src = MemoryInterface::new("a", "default", InterfaceKind::Tap);
        let mut data = vec![0xff; 6];
        data.extend_from_slice(&[0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0x01]);
        data.extend_from_slice(&[0x08, 0x00, 0x45]);

        let frame = Frame::new(data, src);
        assert!(frame.has_header());
        assert_eq!(frame.destination_mac(), Some(MacAddr::BROADCAST));
        assert_eq!(
            frame.source_mac(),
            Some(MacAddr::parse("aa:aa:aa:aa:aa:01").unwrap())
        );
        assert_eq!(frame.source().name(), "a");
        assert!(frame.output().is_none());
        assert_eq!(frame.head(), "ffffffffffffaaaaaaaaaa01080045");
    }

    #[test]
    fn runt_frame() {
        let src = MemoryInterface::new("a", "default", InterfaceKind::Tap);
        let frame = Frame::new(vec![0u8; 8], src);
        assert!(!frame.has_header());
        assert!(frame.destination_mac().is_some());
        assert!(frame.source_mac().is_none());
    }

    #[test]
    fn explicit_output() {
        let src = MemoryInterface::new("a", "default", InterfaceKind::Tap);
        let dst = MemoryInterface::new("b", "default", InterfaceKind::Tap);
        let frame = Frame::new(vec![0u8; 14], src).with_output(dst);
        assert_eq!(frame.output().unwrap().name(), "b");
    }
}
