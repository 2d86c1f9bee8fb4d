//! Instance readiness slot
//!
//! The single process-wide cell naming the current module instance.
//! The lifecycle manager is the only writer; request routing reads it
//! lock-free through a watch channel and suspends until an instance is
//! Ready. Each publish replaces the whole state, so a consumer that
//! starts waiting after a swap only ever observes the replacement.

use std::sync::Arc;
use tokio::sync::watch;

use crate::module::instance::ModuleInstance;

/// Lifecycle state of the current instance slot.
#[derive(Clone)]
pub enum SlotState {
    /// No install has been attempted yet
    Empty,
    /// An install is in progress; any previous instance was displaced
    Installing,
    /// An instance is installed and serving
    Ready(Arc<ModuleInstance>),
    /// The most recent install attempt failed
    Failed(String),
}

impl SlotState {
    /// The installed instance, if this state is Ready.
    pub fn instance(&self) -> Option<&Arc<ModuleInstance>> {
        match self {
            SlotState::Ready(instance) => Some(instance),
            _ => None,
        }
    }
}

impl std::fmt::Debug for SlotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotState::Empty => write!(f, "Empty"),
            SlotState::Installing => write!(f, "Installing"),
            SlotState::Ready(_) => write!(f, "Ready"),
            SlotState::Failed(reason) => write!(f, "Failed({reason})"),
        }
    }
}

/// The replaceable cell holding the current instance and its state.
#[derive(Debug)]
pub struct InstanceSlot {
    tx: watch::Sender<SlotState>,
}

impl InstanceSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SlotState::Empty);
        Self { tx }
    }

    /// Replace the slot state. Waiters observe the new state.
    pub fn publish(&self, state: SlotState) {
        self.tx.send_replace(state);
    }

    /// Snapshot of the current state.
    pub fn current(&self) -> SlotState {
        self.tx.borrow().clone()
    }

    /// Subscribe to state replacements.
    pub fn subscribe(&self) -> watch::Receiver<SlotState> {
        self.tx.subscribe()
    }

    /// Wait until an instance is Ready and return a handle to it.
    ///
    /// Waits through Installing and Failed states: a failed install
    /// leaves waiters pending until a later attempt succeeds. Returns
    /// `None` only if the slot is dropped while waiting (shutdown).
    pub async fn ready(&self) -> Option<Arc<ModuleInstance>> {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(instance) = rx.borrow_and_update().instance() {
                return Some(Arc::clone(instance));
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }
}

impl Default for InstanceSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wasmtime::Engine;

    const MINIMAL_MODULE: &str = r#"
        (module
          (memory (export "memory") 1)
          (func (export "allocate_request") (param i32) (result i32) (i32.const 0))
          (func (export "fetch") (result i32) (i32.const 0))
          (func (export "response_ptr") (result i32) (i32.const 0))
          (func (export "response_len") (result i32) (i32.const 0))
          (func (export "stop")))
    "#;

    fn test_instance() -> Arc<ModuleInstance> {
        let engine = Engine::default();
        Arc::new(ModuleInstance::instantiate(&engine, MINIMAL_MODULE.as_bytes()).unwrap())
    }

    #[tokio::test]
    async fn ready_waits_for_first_install() {
        let slot = Arc::new(InstanceSlot::new());

        let waiter = {
            let slot = Arc::clone(&slot);
            tokio::spawn(async move { slot.ready().await })
        };

        // Still empty: the waiter must be pending
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        slot.publish(SlotState::Ready(test_instance()));
        let resolved = waiter.await.unwrap();
        assert!(resolved.is_some());
    }

    #[tokio::test]
    async fn ready_waits_through_failed_generations() {
        let slot = Arc::new(InstanceSlot::new());
        slot.publish(SlotState::Installing);
        slot.publish(SlotState::Failed("instantiate failed".to_string()));

        let waiter = {
            let slot = Arc::clone(&slot);
            tokio::spawn(async move { slot.ready().await })
        };

        // A failed install must not error the waiter out permanently
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        slot.publish(SlotState::Ready(test_instance()));
        assert!(waiter.await.unwrap().is_some());
    }

    #[tokio::test]
    async fn dropping_the_slot_releases_waiters() {
        let slot = InstanceSlot::new();
        let mut rx = slot.subscribe();
        drop(slot);
        assert!(rx.changed().await.is_err());
    }
}
