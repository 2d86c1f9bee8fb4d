//! Instance lifecycle manager
//!
//! Owns the single current module instance and keeps it up to date:
//! fetch the source image, compare its version tag against the last
//! installed one, and on change swap the slot to a fresh generation,
//! signal shutdown on the displaced instance, and install the new one.
//! The whole fetch-compare-install sequence runs under one exclusive
//! lock; concurrent triggers collapse into no-ops.

use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use wasmtime::Engine;

use crate::module::error::ModuleError;
use crate::module::fetch::ModuleFetcher;
use crate::module::instance::ModuleInstance;
use crate::module::slot::{InstanceSlot, SlotState};

/// Why a revalidation was triggered. Logged only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevalidateTrigger {
    /// Process startup
    Startup,
    /// Process (re)activation
    Activate,
    /// A new consumer attached to the gateway
    ClientAttached,
    /// Periodic timer fired
    Interval,
}

impl fmt::Display for RevalidateTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevalidateTrigger::Startup => write!(f, "startup"),
            RevalidateTrigger::Activate => write!(f, "activate"),
            RevalidateTrigger::ClientAttached => write!(f, "clientattached"),
            RevalidateTrigger::Interval => write!(f, "interval"),
        }
    }
}

/// Manages the fetch-compare-install-retire cycle for the single
/// current module instance.
pub struct InstanceLifecycleManager {
    engine: Engine,
    fetcher: Arc<dyn ModuleFetcher>,
    slot: InstanceSlot,
    /// Install lock doubling as the recorded version tag of the most
    /// recently installed image. `try_lock` failure means another
    /// revalidation holds the whole sequence.
    install_lock: Mutex<Option<String>>,
}

impl InstanceLifecycleManager {
    /// Create a manager with an empty slot and no recorded tag.
    pub fn new(fetcher: Arc<dyn ModuleFetcher>) -> Self {
        Self {
            engine: Engine::default(),
            fetcher,
            slot: InstanceSlot::new(),
            install_lock: Mutex::new(None),
        }
    }

    /// The instance slot, for consumers that await readiness.
    pub fn slot(&self) -> &InstanceSlot {
        &self.slot
    }

    /// Check for a new module image and install it if it changed.
    ///
    /// Safe to call concurrently from any trigger: if another
    /// revalidation is in flight this returns immediately without
    /// effect. A fetch or install failure is returned to the caller
    /// but leaves the manager usable; retry policy belongs to the
    /// scheduler's cadence.
    pub async fn revalidate(&self, trigger: RevalidateTrigger) -> Result<(), ModuleError> {
        let mut recorded_tag = match self.install_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(%trigger, "skipped redundant module check, revalidation in flight");
                return Ok(());
            }
        };

        let fetched = match self.fetcher.fetch_module().await {
            Ok(fetched) => fetched,
            Err(e) => {
                error!(%trigger, error = %e, "module source fetch failed");
                return Err(e);
            }
        };

        // Skip reinstalling when the image is unchanged; a missing tag
        // always installs.
        if let (Some(new_tag), Some(current)) = (&fetched.version_tag, recorded_tag.as_ref()) {
            if new_tag == current {
                debug!(%trigger, tag = %new_tag, "skipped reinstall, version tag unchanged");
                return Ok(());
            }
        }

        // Repoint the slot before stopping the displaced instance, so
        // consumers that start waiting now wait for the replacement.
        // In-flight holders of the old handle drain against it.
        let previous = self.slot.current().instance().cloned();
        self.slot.publish(SlotState::Installing);
        if let Some(old) = previous {
            info!(%trigger, old_tag = recorded_tag.as_deref().unwrap_or("<none>"),
                "stopping displaced module instance");
            old.stop().await;
        }

        info!(%trigger, tag = fetched.version_tag.as_deref().unwrap_or("<none>"),
            "installing module instance");
        match ModuleInstance::instantiate(&self.engine, &fetched.bytes) {
            Ok(instance) => {
                self.slot.publish(SlotState::Ready(Arc::new(instance)));
                *recorded_tag = fetched.version_tag;
                Ok(())
            }
            Err(e) => {
                error!(%trigger, error = %e, "module install failed");
                self.slot.publish(SlotState::Failed(e.to_string()));
                // Tag stays unchanged: the next attempt re-fetches and
                // retries the install from scratch.
                Err(e)
            }
        }
    }
}
