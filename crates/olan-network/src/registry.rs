//! Interface registry.
//!
//! A catalog of live virtual interfaces keyed by name. Drivers register
//! devices when they create them; bridges resolve slave names through it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::device::VirtualInterface;

/// Prefix of generated interface names.
const NAME_PREFIX: &str = "vir";

#[derive(Debug, Default)]
struct RegistryInner {
    index: u64,
    devices: HashMap<String, Arc<dyn VirtualInterface>>,
}

/// Thread-safe catalog of virtual interfaces.
///
/// Every operation takes the lock for its own duration only.
#[derive(Debug, Default)]
pub struct InterfaceRegistry {
    inner: RwLock<RegistryInner>,
}

impl InterfaceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh interface name (`vir1`, `vir2`, ...).
    ///
    /// Names are never reused for the lifetime of the registry.
    pub fn generate_name(&self) -> String {
        let mut inner = self.inner.write();
        inner.index += 1;
        format!("{NAME_PREFIX}{}", inner.index)
    }

    /// Register an interface under its own name, replacing any previous one.
    pub fn register(&self, device: Arc<dyn VirtualInterface>) {
        let name = device.name().to_string();
        tracing::debug!(interface = %name, "Registering interface");
        if self.inner.write().devices.insert(name.clone(), device).is_some() {
            tracing::debug!(interface = %name, "Replaced existing interface");
        }
    }

    /// Look up an interface by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn VirtualInterface>> {
        self.inner.read().devices.get(name).cloned()
    }

    /// Whether an interface is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().devices.contains_key(name)
    }

    /// Remove an interface. No-op if absent.
    pub fn deregister(&self, name: &str) -> Option<Arc<dyn VirtualInterface>> {
        let removed = self.inner.write().devices.remove(name);
        if removed.is_some() {
            tracing::debug!(interface = %name, "Deregistered interface");
        }
        removed
    }

    /// Snapshot of all registered interfaces.
    ///
    /// Later registrations are not observed by the returned list.
    #[must_use]
    pub fn enumerate(&self) -> Vec<Arc<dyn VirtualInterface>> {
        self.inner.read().devices.values().cloned().collect()
    }

    /// Number of registered interfaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().devices.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::device::InterfaceKind;
    use crate::memory::MemoryInterface;

    fn device(name: &str) -> Arc<dyn VirtualInterface> {
        MemoryInterface::new(name, "default", InterfaceKind::Tap)
    }

    #[test]
    fn generated_names_increase() {
        let registry = InterfaceRegistry::new();
        assert_eq!(registry.generate_name(), "vir1");
        assert_eq!(registry.generate_name(), "vir2");
        assert_eq!(registry.generate_name(), "vir3");
    }

    #[test]
    fn register_lookup_deregister() {
        let registry = InterfaceRegistry::new();
        assert!(registry.is_empty());

        registry.register(device("vir1"));
        assert!(registry.contains("vir1"));
        assert_eq!(registry.lookup("vir1").unwrap().name(), "vir1");
        assert!(registry.lookup("vir2").is_none());

        assert!(registry.deregister("vir1").is_some());
        assert!(registry.deregister("vir1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn register_overwrites_same_name() {
        let registry = InterfaceRegistry::new();
        let first = device("tap0");
        let second = device("tap0");
        registry.register(first.clone());
        registry.register(second.clone());

        assert_eq!(registry.len(), 1);
        let found = registry.lookup("tap0").unwrap();
        assert!(crate::device::same_interface(&found, &second));
        assert!(!crate::device::same_interface(&found, &first));
    }

    #[test]
    fn enumerate_is_a_snapshot() {
        let registry = InterfaceRegistry::new();
        registry.register(device("a"));
        registry.register(device("b"));

        let snapshot = registry.enumerate();
        registry.register(device("c"));
        registry.deregister("a");

        let names: HashSet<_> = snapshot.iter().map(|d| d.name().to_string()).collect();
        assert_eq!(names, HashSet::from(["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn concurrent_name_generation_is_unique() {
        let registry = Arc::new(InterfaceRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    (0..100).map(|_| registry.generate_name()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut names = HashSet::new();
        for handle in handles {
            for name in handle.join().unwrap() {
                assert!(names.insert(name));
            }
        }
        assert_eq!(names.len(), 800);
    }
}
