use std::sync::{Condvar, Mutex};

use dam_channel::TimeView;
use dam_core::VirtualTime;

/// A node's local virtual clock: a `Mutex`-guarded cycle count plus a
/// `Condvar` every waiter blocks on. Every mutation (`incr_cycles`,
/// `advance_to`, `set_infinite`) wakes all waiters so `block_until` never
/// needs its own signal registry — it simply loops on `wait_while` under the
/// same lock, re-testing the deadline on every wakeup.
pub struct Clock {
    state: Mutex<VirtualTime>,
    cv: Condvar,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VirtualTime::ZERO),
            cv: Condvar::new(),
        }
    }

    pub fn current(&self) -> VirtualTime {
        *self.state.lock().unwrap()
    }

    /// `current ← current + delta`, saturating at `Infinite`.
    pub fn incr_cycles(&self, delta: u64) {
        if delta == 0 {
            return;
        }
        let mut guard = self.state.lock().unwrap();
        *guard = guard.saturating_add_ticks(delta);
        drop(guard);
        self.cv.notify_all();
    }

    /// `current ← max(current, t)`.
    pub fn advance_to(&self, t: VirtualTime) {
        let mut guard = self.state.lock().unwrap();
        let advanced = guard.max(t);
        if advanced != *guard {
            *guard = advanced;
            drop(guard);
            self.cv.notify_all();
        }
    }

    /// Cleanup step 1 (§4.2): wake every waiter with Infinity before the
    /// node's outputs are closed.
    pub fn set_infinite(&self) {
        let mut guard = self.state.lock().unwrap();
        *guard = VirtualTime::infinite();
        drop(guard);
        self.cv.notify_all();
    }
}

impl TimeView for Clock {
    fn tick_lower_bound(&self) -> VirtualTime {
        self.current()
    }

    fn block_until(&self, deadline: VirtualTime) -> VirtualTime {
        let guard = self.state.lock().unwrap();
        let guard = self.cv.wait_while(guard, |t| *t < deadline).unwrap();
        *guard
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn block_until_returns_immediately_when_already_past_deadline() {
        let clock = Clock::new();
        clock.advance_to(VirtualTime::new(10));
        assert_eq!(clock.block_until(VirtualTime::new(5)), VirtualTime::new(10));
    }

    #[test]
    fn block_until_wakes_on_advance() {
        let clock = Arc::new(Clock::new());
        let waiter = Arc::clone(&clock);
        let handle = thread::spawn(move || waiter.block_until(VirtualTime::new(7)));
        thread::sleep(Duration::from_millis(20));
        clock.advance_to(VirtualTime::new(7));
        assert_eq!(handle.join().unwrap(), VirtualTime::new(7));
    }

    #[test]
    fn set_infinite_wakes_every_waiter() {
        let clock = Arc::new(Clock::new());
        let waiter = Arc::clone(&clock);
        let handle = thread::spawn(move || waiter.block_until(VirtualTime::new(1_000)));
        thread::sleep(Duration::from_millis(20));
        clock.set_infinite();
        assert_eq!(handle.join().unwrap(), VirtualTime::infinite());
    }

    #[test]
    fn incr_cycles_zero_is_observably_a_no_op() {
        let clock = Clock::new();
        clock.advance_to(VirtualTime::new(4));
        clock.incr_cycles(0);
        assert_eq!(clock.current(), VirtualTime::new(4));
    }
}
