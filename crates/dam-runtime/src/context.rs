use std::sync::{Arc, Mutex, OnceLock};
use std::thread;

use dam_channel::TimeView;
use dam_core::{fatal, DamError, VirtualTime};

use crate::node::NodeRuntime;

/// Everything a node in the graph is, from the scheduler's point of view:
/// a clock-bearing, nameable thing with an `Init`/`Run`/`Cleanup` lifecycle.
/// Small and fully object-safe — `Box<dyn Context>`/`Arc<dyn Context>` are
/// the currency [`CompositeContext`] passes around its children.
pub trait Context: TimeView {
    fn name(&self) -> &str;
    fn init(&self);
    fn run(&self);
    fn cleanup(&self);
    /// Assigns this context's locally-unique id within its parent. Fatal if
    /// called twice — a context may belong to exactly one parent.
    fn assign_parent(&self, id: usize);
}

/// A leaf node: one user-written body running on one logical thread.
pub struct LeafContext {
    runtime: Arc<NodeRuntime>,
    run_func: Mutex<Option<Box<dyn FnMut(&NodeRuntime) + Send>>>,
    parent_id: OnceLock<usize>,
}

impl LeafContext {
    pub fn new(name: impl Into<String>, run_func: impl FnMut(&NodeRuntime) + Send + 'static) -> Self {
        Self {
            runtime: Arc::new(NodeRuntime::new(name)),
            run_func: Mutex::new(Some(Box::new(run_func))),
            parent_id: OnceLock::new(),
        }
    }

    pub fn runtime(&self) -> Arc<NodeRuntime> {
        Arc::clone(&self.runtime)
    }
}

impl TimeView for LeafContext {
    fn tick_lower_bound(&self) -> VirtualTime {
        self.runtime.tick_lower_bound()
    }

    fn block_until(&self, deadline: VirtualTime) -> VirtualTime {
        self.runtime.block_until(deadline)
    }
}

impl Context for LeafContext {
    fn name(&self) -> &str {
        self.runtime.name()
    }

    fn init(&self) {
        tracing::debug!(name = self.name(), "init");
    }

    fn run(&self) {
        let span = tracing::info_span!("context", name = %self.name());
        let _enter = span.enter();
        let body = self.run_func.lock().unwrap().take();
        if let Some(mut body) = body {
            body(&self.runtime);
        }
        // The leaf's own Run thread performs its cleanup inline, the instant
        // its body returns, rather than waiting on a parent to do it later.
        self.runtime.finish();
    }

    fn cleanup(&self) {
        // Intentionally empty: see `run` above.
    }

    fn assign_parent(&self, id: usize) {
        if self.parent_id.set(id).is_err() {
            fatal(DamError::DoubleParent);
        }
    }
}

/// A composite: owns an ordered list of children, has no clock of its own.
pub struct CompositeContext {
    name: String,
    children: Vec<Arc<dyn Context>>,
    parent_id: OnceLock<usize>,
}

impl CompositeContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            parent_id: OnceLock::new(),
        }
    }

    /// Hands `child` a locally-unique id and adopts it.
    pub fn add_child(&mut self, child: Arc<dyn Context>) {
        let id = self.children.len();
        child.assign_parent(id);
        self.children.push(child);
    }

    pub fn children(&self) -> &[Arc<dyn Context>] {
        &self.children
    }
}

impl TimeView for CompositeContext {
    /// The min over non-finished children's clocks; `Infinite` once every
    /// child is done (or if there are no children at all).
    fn tick_lower_bound(&self) -> VirtualTime {
        self.children
            .iter()
            .map(|c| c.tick_lower_bound())
            .min()
            .unwrap_or_else(VirtualTime::infinite)
    }

    fn block_until(&self, deadline: VirtualTime) -> VirtualTime {
        self.children
            .iter()
            .map(|c| c.block_until(deadline))
            .min()
            .unwrap_or_else(VirtualTime::infinite)
    }
}

impl Context for CompositeContext {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self) {
        let span = tracing::info_span!("context", name = %self.name);
        let _enter = span.enter();
        thread::scope(|scope| {
            for child in &self.children {
                let child = Arc::clone(child);
                scope.spawn(move || child.init());
            }
        });
    }

    fn run(&self) {
        let span = tracing::info_span!("context", name = %self.name);
        let _enter = span.enter();
        // `thread::scope` joins every spawned thread before returning and
        // re-panics here if any of them panicked, which is exactly the
        // "re-panic after joining all children" behavior this crate needs.
        thread::scope(|scope| {
            for child in &self.children {
                let child = Arc::clone(child);
                scope.spawn(move || {
                    child.run();
                    child.cleanup();
                });
            }
        });
    }

    fn cleanup(&self) {
        // Intentionally empty: each child already cleaned itself up inside
        // its own Run thread (§4.3), so finished children release waiters
        // as early as possible instead of waiting on the whole composite.
    }

    fn assign_parent(&self, id: usize) {
        if self.parent_id.set(id).is_err() {
            fatal(DamError::DoubleParent);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[test]
    fn leaf_context_reaches_infinity_after_run() {
        let leaf = LeafContext::new("a", |rt| rt.incr_cycles(5));
        leaf.init();
        leaf.run();
        assert!(leaf.tick_lower_bound().is_infinite());
    }

    #[test]
    fn composite_tick_lower_bound_is_min_of_children() {
        let mut composite = CompositeContext::new("root");
        let fast = Arc::new(LeafContext::new("fast", |rt| rt.advance_to(VirtualTime::new(100))));
        let slow = Arc::new(LeafContext::new("slow", |_rt| {
            // Never advances; stays at time zero until the whole composite finishes.
        }));
        composite.add_child(fast.clone());
        composite.add_child(slow.clone());

        fast.init();
        fast.run();
        // `slow` never ran, so it's still sitting at VirtualTime::ZERO.
        assert_eq!(composite.tick_lower_bound(), VirtualTime::ZERO);
    }

    #[test]
    fn double_parenting_is_fatal() {
        let leaf = LeafContext::new("x", |_| {});
        leaf.assign_parent(0);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| leaf.assign_parent(1)));
        assert!(result.is_err());
    }

    #[test]
    fn composite_run_joins_all_children() {
        let counter = Arc::new(AtomicU64::new(0));
        let mut composite = CompositeContext::new("root");
        for _ in 0..4 {
            let counter = Arc::clone(&counter);
            composite.add_child(Arc::new(LeafContext::new("child", move |_rt| {
                counter.fetch_add(1, Ordering::SeqCst);
            })));
        }
        composite.init();
        composite.run();
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}
