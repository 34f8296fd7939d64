//! Listener registry.
//!
//! Maps event names to an ordered list of callbacks. Registration order is
//! dispatch order, there is no de-duplication, and a listener registered
//! twice runs twice per matching event.
//!
//! Every invocation is isolated: a listener returning `Err` or panicking is
//! logged and skipped, and the remaining listeners still run.

// Rust guideline compliant 2026-02

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;

use super::frame::Frame;

type ListenerFn = dyn Fn(&[Value]) -> anyhow::Result<()> + Send + Sync;
type FrameListenerFn = dyn Fn(&Frame) -> anyhow::Result<()> + Send + Sync;

/// Shareable callback handle for a named event.
///
/// Cloning is cheap; registering the same handle twice makes it run twice.
#[derive(Clone)]
pub struct Listener(Arc<ListenerFn>);

impl Listener {
    /// Wrap a callback receiving the event's positional arguments.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Listener").finish()
    }
}

/// Identifier returned by every registration, used with [`ListenerRegistry::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Event name -> ordered callbacks, plus catch-all frame observers.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: HashMap<String, Vec<(ListenerId, Listener)>>,
    catch_all: Vec<(ListenerId, Arc<FrameListenerFn>)>,
    next_id: u64,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("event_count", &self.listeners.len())
            .field("total_listeners", &self.listener_count())
            .field("catch_all", &self.catch_all.len())
            .finish()
    }
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Append `callback` to the list for `event`.
    pub fn on<F>(&mut self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_listener(event, Listener::new(callback))
    }

    /// Append an existing listener handle to the list for `event`.
    pub fn on_listener(&mut self, event: &str, listener: Listener) -> ListenerId {
        let id = self.allocate_id();
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push((id, listener));
        log::debug!("Registered listener {:?} for '{}'", id, event);
        id
    }

    /// Register an observer that sees every dispatched frame, after the
    /// named listeners for that frame have run.
    pub fn on_any<F>(&mut self, callback: F) -> ListenerId
    where
        F: Fn(&Frame) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.catch_all.push((id, Arc::new(callback)));
        id
    }

    /// Remove one registration. Returns `false` if `id` is unknown.
    pub fn off(&mut self, id: ListenerId) -> bool {
        for list in self.listeners.values_mut() {
            if let Some(idx) = list.iter().position(|(lid, _)| *lid == id) {
                list.remove(idx);
                return true;
            }
        }
        if let Some(idx) = self.catch_all.iter().position(|(lid, _)| *lid == id) {
            self.catch_all.remove(idx);
            return true;
        }
        false
    }

    /// Invoke every listener registered for `event`, in registration order.
    ///
    /// Returns the number of listeners that completed without error.
    pub fn emit(&self, event: &str, args: &[Value]) -> usize {
        let Some(list) = self.listeners.get(event) else {
            return 0;
        };
        let mut ok = 0;
        for (id, listener) in list {
            if invoke_isolated(event, *id, || (listener.0)(args)) {
                ok += 1;
            }
        }
        ok
    }

    /// Dispatch a decoded frame: named listeners first, then catch-all observers.
    pub fn dispatch(&self, frame: &Frame) -> usize {
        let mut ok = self.emit(&frame.name, &frame.args);
        for (id, observer) in &self.catch_all {
            if invoke_isolated(&frame.name, *id, || observer(frame)) {
                ok += 1;
            }
        }
        ok
    }

    /// Check if any named listeners are registered for an event.
    #[must_use]
    pub fn has_listeners(&self, event: &str) -> bool {
        self.listeners.get(event).is_some_and(|v| !v.is_empty())
    }

    /// Total number of named registrations across all events.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }
}

/// Run one listener, containing both returned errors and panics.
fn invoke_isolated<F>(event: &str, id: ListenerId, call: F) -> bool
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::warn!("Listener {:?} for '{}' failed: {:#}", id, event, e);
            false
        }
        Err(panic_info) => {
            let msg = panic_info
                .downcast_ref::<String>()
                .map(String::as_str)
                .or_else(|| panic_info.downcast_ref::<&str>().copied())
                .unwrap_or("unknown panic");
            log::error!("Listener {:?} for '{}' panicked: {}", id, event, msg);
            false
        }
    }
}
