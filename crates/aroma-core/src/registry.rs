//! Registry of peripherals discovered during the current scan.

use std::sync::RwLock;

use indexmap::IndexMap;

use aroma_types::Peripheral;

/// Discovered peripherals keyed by id, in first-seen order.
///
/// Each call takes the lock once, so readers always see whole entries.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<IndexMap<String, Peripheral>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new peripheral or update the entry with the same id in place.
    ///
    /// Returns the stored entry after the update.
    pub fn upsert(&self, peripheral: Peripheral) -> Peripheral {
        let mut devices = self.devices.write().expect("registry lock poisoned");
        match devices.get_mut(&peripheral.id) {
            Some(existing) => {
                existing.merge(peripheral);
                existing.clone()
            }
            None => {
                devices.insert(peripheral.id.clone(), peripheral.clone());
                peripheral
            }
        }
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.devices.write().expect("registry lock poisoned").clear();
    }

    /// Look up a peripheral by id.
    pub fn get(&self, id: &str) -> Option<Peripheral> {
        self.devices
            .read()
            .expect("registry lock poisoned")
            .get(id)
            .cloned()
    }

    /// All peripherals in first-seen order.
    pub fn values(&self) -> Vec<Peripheral> {
        self.devices
            .read()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peripheral(id: &str, name: Option<&str>, rssi: i16) -> Peripheral {
        Peripheral::new(id, name.map(String::from), Some(rssi))
    }

    #[test]
    fn test_upsert_appends_new_ids() {
        let registry = DeviceRegistry::new();
        registry.upsert(peripheral("A", Some("One"), -50));
        registry.upsert(peripheral("B", Some("Two"), -60));
        let ids: Vec<_> = registry.values().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn test_upsert_updates_in_place() {
        let registry = DeviceRegistry::new();
        registry.upsert(peripheral("A", Some("One"), -50));
        registry.upsert(peripheral("B", None, -60));
        let updated = registry.upsert(peripheral("A", Some("Renamed"), -40));

        assert_eq!(updated.display_name(), "Renamed");
        assert_eq!(registry.len(), 2);
        let first = &registry.values()[0];
        assert_eq!(first.id, "A");
        assert_eq!(first.rssi, Some(-40));
    }

    #[test]
    fn test_nameless_peripheral_shows_placeholder() {
        let registry = DeviceRegistry::new();
        registry.upsert(peripheral("X", None, -70));
        assert_eq!(registry.get("X").unwrap().display_name(), "Unknown Device");
    }

    #[test]
    fn test_clear() {
        let registry = DeviceRegistry::new();
        registry.upsert(peripheral("A", None, -50));
        assert!(!registry.is_empty());
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.get("A").is_none());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// The registry holds one entry per id, in first-seen order.
            #[test]
            fn one_entry_per_id_in_first_seen_order(ids in proptest::collection::vec(0u8..8, 0..64)) {
                let registry = DeviceRegistry::new();
                let mut first_seen: Vec<String> = Vec::new();
                for id in &ids {
                    let id = format!("dev-{}", id);
                    if !first_seen.contains(&id) {
                        first_seen.push(id.clone());
                    }
                    registry.upsert(Peripheral::new(id, None, None));
                }
                let stored: Vec<String> = registry.values().into_iter().map(|p| p.id).collect();
                prop_assert_eq!(stored, first_seen);
            }
        }
    }
}
