//! Arrival-ordered registry of the devices seen during one discovery window.

use std::collections::HashMap;

use tracing::debug;

use crate::model::{DeviceId, DeviceRecord};

/// Devices accumulated during a single discovery window, in the order their
/// advertisements were first observed.
///
/// Network arrival order is the only meaningful signal available for
/// selection, so it is preserved explicitly rather than left to iteration
/// order over an unordered map. A re-advertisement of a known device
/// replaces its record in place and keeps its original arrival rank.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    arrival: Vec<DeviceId>,
    devices: HashMap<DeviceId, DeviceRecord>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or refreshes a device record.
    pub fn push(&mut self, record: DeviceRecord) {
        if self.devices.contains_key(&record.id) {
            debug!(id = %record.id, "Device re-advertised, refreshing record");
        } else {
            debug!(id = %record.id, name = %record.friendly_name, "New device discovered");
            self.arrival.push(record.id.clone());
        }
        self.devices.insert(record.id.clone(), record);
    }

    /// Deterministic selection: the device whose advertisement was observed
    /// earliest, or `None` for an empty window.
    pub fn select_first(&self) -> Option<&DeviceRecord> {
        self.arrival.first().and_then(|id| self.devices.get(id))
    }

    /// Selection with an optional friendly-name filter: the earliest
    /// observed device whose friendly name matches exactly, or
    /// `select_first` when no filter is given.
    pub fn select(&self, friendly_name: Option<&str>) -> Option<&DeviceRecord> {
        match friendly_name {
            None => self.select_first(),
            Some(wanted) => self
                .iter()
                .find(|record| record.friendly_name == wanted),
        }
    }

    /// Devices in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.arrival.iter().filter_map(|id| self.devices.get(id))
    }

    pub fn len(&self) -> usize {
        self.arrival.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrival.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn record(id: &str, name: &str, host: &str) -> DeviceRecord {
        DeviceRecord {
            id: DeviceId(id.to_string()),
            friendly_name: name.to_string(),
            model_name: "Chromecast".to_string(),
            host: host.to_string(),
            port: 8009,
            discovered_at: SystemTime::now(),
        }
    }

    #[test]
    fn test_select_first_is_earliest_observed() {
        let mut registry = DeviceRegistry::new();
        registry.push(record("uuid:b", "Bedroom", "192.168.1.11"));
        registry.push(record("uuid:a", "Attic", "192.168.1.10"));
        registry.push(record("uuid:c", "Cellar", "192.168.1.12"));

        // "Bedroom" sorts after "Attic" by name; arrival order must win.
        let selected = registry.select_first().unwrap();
        assert_eq!(selected.friendly_name, "Bedroom");
    }

    #[test]
    fn test_selection_is_stable_across_calls() {
        let mut registry = DeviceRegistry::new();
        registry.push(record("uuid:x", "First", "192.168.1.20"));
        registry.push(record("uuid:y", "Second", "192.168.1.21"));

        for _ in 0..10 {
            assert_eq!(registry.select_first().unwrap().id, DeviceId("uuid:x".into()));
        }
    }

    #[test]
    fn test_readvertisement_replaces_without_duplicating() {
        let mut registry = DeviceRegistry::new();
        registry.push(record("uuid:x", "First", "192.168.1.20"));
        registry.push(record("uuid:y", "Second", "192.168.1.21"));
        registry.push(record("uuid:x", "First (renamed)", "192.168.1.30"));

        assert_eq!(registry.len(), 2);
        let selected = registry.select_first().unwrap();
        assert_eq!(selected.friendly_name, "First (renamed)");
        assert_eq!(selected.host, "192.168.1.30");
    }

    #[test]
    fn test_empty_registry_selects_none() {
        let registry = DeviceRegistry::new();
        assert!(registry.select_first().is_none());
        assert!(registry.select(None).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_select_by_friendly_name() {
        let mut registry = DeviceRegistry::new();
        registry.push(record("uuid:x", "Kitchen", "192.168.1.20"));
        registry.push(record("uuid:y", "Living Room TV", "192.168.1.21"));

        let selected = registry.select(Some("Living Room TV")).unwrap();
        assert_eq!(selected.id, DeviceId("uuid:y".into()));
        assert!(registry.select(Some("Garage")).is_none());
        assert_eq!(registry.select(None).unwrap().friendly_name, "Kitchen");
    }
}
