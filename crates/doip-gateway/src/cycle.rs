//! Shared response-cycling state
//!
//! The only mutable process-wide state: for every `(target address,
//! service name)` pair the index of the next response to serve. All
//! concurrent sessions share one table, so the rotation each pair observes
//! is a single monotone sequence regardless of which connection the
//! requests arrive on.

use std::collections::HashMap;

use parking_lot::Mutex;

type CycleKey = (u16, String);

/// Guarded map of per-(ECU, service) response indices. Entries are created
/// lazily on first match and advanced modulo the response count.
#[derive(Debug, Default)]
pub struct CycleTable {
    slots: Mutex<HashMap<CycleKey, usize>>,
}

impl CycleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the index to serve now and advance the stored index by one,
    /// wrapping at `len`. The read-modify-write runs under the table lock.
    ///
    /// `len` must be at least 1.
    pub fn advance(&self, target_address: u16, service: &str, len: usize) -> usize {
        debug_assert!(len >= 1);
        let mut slots = self.slots.lock();
        let slot = slots
            .entry((target_address, service.to_string()))
            .or_insert(0);
        let current = *slot % len;
        *slot = (current + 1) % len;
        current
    }

    /// Forget every cycling position.
    pub fn reset_all(&self) {
        self.slots.lock().clear();
    }

    /// Forget all positions belonging to one ECU.
    pub fn reset_ecu(&self, target_address: u16) {
        self.slots
            .lock()
            .retain(|(addr, _), _| *addr != target_address);
    }

    /// Forget a service's position on every ECU.
    pub fn reset_service(&self, service: &str) {
        self.slots.lock().retain(|(_, name), _| name != service);
    }

    /// Forget one (ECU, service) position.
    pub fn reset_entry(&self, target_address: u16, service: &str) {
        self.slots
            .lock()
            .remove(&(target_address, service.to_string()));
    }

    /// Copy of the current state, keyed readably. Debugging aid.
    pub fn snapshot(&self) -> HashMap<String, usize> {
        self.slots
            .lock()
            .iter()
            .map(|((addr, name), index)| (format!("0x{:04X}/{}", addr, name), *index))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_wraps() {
        let table = CycleTable::new();
        assert_eq!(table.advance(0x1000, "rpm", 3), 0);
        assert_eq!(table.advance(0x1000, "rpm", 3), 1);
        assert_eq!(table.advance(0x1000, "rpm", 3), 2);
        assert_eq!(table.advance(0x1000, "rpm", 3), 0);
    }

    #[test]
    fn test_single_response_still_tracked() {
        let table = CycleTable::new();
        assert_eq!(table.advance(0x1000, "vin", 1), 0);
        assert_eq!(table.advance(0x1000, "vin", 1), 0);
        assert_eq!(table.snapshot().len(), 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let table = CycleTable::new();
        table.advance(0x1000, "rpm", 3);
        table.advance(0x1000, "rpm", 3);
        assert_eq!(table.advance(0x1001, "rpm", 3), 0);
        assert_eq!(table.advance(0x1000, "vin", 2), 0);
        assert_eq!(table.advance(0x1000, "rpm", 3), 2);
    }

    #[test]
    fn test_reset_scopes() {
        let table = CycleTable::new();
        table.advance(0x1000, "rpm", 3);
        table.advance(0x1000, "vin", 2);
        table.advance(0x1001, "rpm", 3);

        table.reset_entry(0x1000, "rpm");
        assert_eq!(table.advance(0x1000, "rpm", 3), 0);
        assert_eq!(table.advance(0x1000, "vin", 2), 1);

        table.reset_ecu(0x1000);
        assert_eq!(table.advance(0x1000, "vin", 2), 0);
        assert_eq!(table.advance(0x1001, "rpm", 3), 1);

        table.reset_service("rpm");
        assert_eq!(table.advance(0x1001, "rpm", 3), 0);

        table.reset_all();
        assert!(table.snapshot().is_empty());
    }
}
