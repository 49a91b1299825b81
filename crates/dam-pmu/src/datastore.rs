use std::sync::RwLock;

use dam_core::{fatal, DamError, VirtualTime};

use crate::access::PmuBehavior;

/// A strictly time-monotonic list of writes to one cell. Reads resolve by
/// binary search to the most recent write strictly before the query time: a
/// write landing at exactly the query time is not yet visible to it.
struct EntryHistory<T> {
    entries: RwLock<Vec<(VirtualTime, T)>>,
}

impl<T: Clone> EntryHistory<T> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    fn add_entry(&self, time: VirtualTime, value: T) {
        let mut guard = self.entries.write().expect("EntryHistory lock poisoned");
        if let Some((last, _)) = guard.last() {
            if *last >= time {
                fatal(DamError::HistoryNotMonotonic {
                    last: last.to_string(),
                    new: time.to_string(),
                });
            }
        }
        guard.push((time, value));
    }

    fn read_entry(&self, time: VirtualTime, behavior: PmuBehavior, default_value: &T) -> T {
        let guard = self.entries.read().expect("EntryHistory lock poisoned");
        let idx = guard.partition_point(|(t, _)| *t < time);
        if idx == 0 {
            if behavior.use_default_value {
                return default_value.clone();
            }
            fatal(DamError::ReadBeforeWrite {
                time: time.to_string(),
            });
        }
        guard[idx - 1].1.clone()
    }

    /// Drops history entries known to be unobservable from any future read
    /// at or after `time`, keeping the single entry immediately visible.
    fn purge_before(&self, time: VirtualTime) {
        let mut guard = self.entries.write().expect("EntryHistory lock poisoned");
        let idx = guard.partition_point(|(t, _)| *t < time);
        let keep_from = idx.saturating_sub(1);
        guard.drain(0..keep_from);
    }
}

/// The PMU's backing store: `capacity` independently-locked cells, each an
/// [`EntryHistory`].
pub struct PmuDataStore<T> {
    cells: Vec<EntryHistory<T>>,
    capacity: i64,
    behavior: PmuBehavior,
    default_value: T,
}

impl<T: Clone> PmuDataStore<T> {
    /// `default_value` is only ever consulted when `behavior.use_default_value`
    /// is set and a cell is read before its first write.
    pub fn new(capacity: i64, behavior: PmuBehavior, default_value: T) -> Self {
        let cells = (0..capacity).map(|_| EntryHistory::new()).collect();
        Self {
            cells,
            capacity,
            behavior,
            default_value,
        }
    }

    pub fn capacity(&self) -> i64 {
        self.capacity
    }

    fn map_index(&self, index: i64) -> usize {
        if !self.behavior.no_mod_address {
            return (index.rem_euclid(self.capacity)) as usize;
        }
        if index < 0 || index >= self.capacity {
            fatal(DamError::OutOfBounds {
                index,
                capacity: self.capacity,
            });
        }
        index as usize
    }

    pub fn write(&self, index: i64, value: T, time: VirtualTime) {
        let cell = self.map_index(index);
        self.cells[cell].add_entry(time, value);
    }

    pub fn read(&self, index: i64, time: VirtualTime) -> T {
        let cell = self.map_index(index);
        self.cells[cell].read_entry(time, self.behavior, &self.default_value)
    }

    pub fn purge_before(&self, index: i64, time: VirtualTime) {
        let cell = self.map_index(index);
        self.cells[cell].purge_before(time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_sees_the_latest_write_strictly_before_the_query_time() {
        let store: PmuDataStore<u64> = PmuDataStore::new(4, PmuBehavior::default(), 0);
        store.write(0, 10, VirtualTime::new(2));
        store.write(0, 20, VirtualTime::new(5));
        assert_eq!(store.read(0, VirtualTime::new(3)), 10);
        assert_eq!(store.read(0, VirtualTime::new(4)), 10);
        // A read at exactly the write's time does not yet see that write.
        assert_eq!(store.read(0, VirtualTime::new(5)), 10);
        assert_eq!(store.read(0, VirtualTime::new(6)), 20);
        assert_eq!(store.read(0, VirtualTime::new(100)), 20);
    }

    #[test]
    #[should_panic]
    fn read_before_any_write_is_fatal_by_default() {
        let store: PmuDataStore<u64> = PmuDataStore::new(4, PmuBehavior::default(), 0);
        store.read(0, VirtualTime::new(1));
    }

    #[test]
    fn read_before_any_write_returns_default_when_opted_in() {
        let behavior = PmuBehavior {
            use_default_value: true,
            ..PmuBehavior::default()
        };
        let store: PmuDataStore<u64> = PmuDataStore::new(4, behavior, 0);
        assert_eq!(store.read(0, VirtualTime::new(1)), 0);
    }

    #[test]
    #[should_panic]
    fn out_of_order_write_is_fatal() {
        let store: PmuDataStore<u64> = PmuDataStore::new(4, PmuBehavior::default(), 0);
        store.write(0, 1, VirtualTime::new(5));
        store.write(0, 2, VirtualTime::new(5));
    }

    #[test]
    fn addresses_wrap_modulo_capacity_by_default() {
        let store: PmuDataStore<u64> = PmuDataStore::new(4, PmuBehavior::default(), 0);
        store.write(6, 42, VirtualTime::new(1));
        assert_eq!(store.read(2, VirtualTime::new(2)), 42);
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_is_fatal_under_no_mod_address() {
        let behavior = PmuBehavior {
            no_mod_address: true,
            ..PmuBehavior::default()
        };
        let store: PmuDataStore<u64> = PmuDataStore::new(4, behavior, 0);
        store.write(10, 42, VirtualTime::new(1));
    }
}
