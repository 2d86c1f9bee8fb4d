//! Loaded module instances
//!
//! Wraps a wasmtime instance together with its store and the resolved
//! export contract. Every entry point the gateway depends on is
//! resolved and type-checked once, at instantiation time, so a module
//! missing any export fails fast as an install error instead of
//! surfacing mid-request.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use wasmtime::{Engine, Instance, Memory, Module, Store, TypedFunc};

use crate::module::error::ModuleError;

/// A loaded, sandboxed module instance.
///
/// Holds the wasmtime store behind an async mutex: the module is
/// entered synchronously, one caller at a time. Handles are shared as
/// `Arc<ModuleInstance>`; a retired instance stays callable for
/// whoever already holds a reference and frees when the last clone
/// drops. `stop` is advisory and delivered at most once.
pub struct ModuleInstance {
    pub(super) store: Mutex<Store<()>>,
    pub(super) memory: Memory,
    pub(super) alloc_fn: TypedFunc<u32, u32>,
    pub(super) fetch_fn: TypedFunc<(), u32>,
    pub(super) response_ptr_fn: TypedFunc<(), u32>,
    pub(super) response_len_fn: TypedFunc<(), u32>,
    stop_fn: TypedFunc<(), ()>,
    stopped: AtomicBool,
}

impl ModuleInstance {
    /// Compile and instantiate a module from its source bytes,
    /// verifying the full export contract.
    pub fn instantiate(engine: &Engine, bytes: &[u8]) -> Result<Self, ModuleError> {
        let module = Module::new(engine, bytes)
            .map_err(|e| ModuleError::Install(format!("compile failed: {e}")))?;

        let mut store = Store::new(engine, ());
        let instance = Instance::new(&mut store, &module, &[])
            .map_err(|e| ModuleError::Install(format!("instantiate failed: {e}")))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| ModuleError::Install("missing export `memory`".to_string()))?;

        let alloc_fn = typed_export(&instance, &mut store, "allocate_request")?;
        let fetch_fn = typed_export(&instance, &mut store, "fetch")?;
        let response_ptr_fn = typed_export(&instance, &mut store, "response_ptr")?;
        let response_len_fn = typed_export(&instance, &mut store, "response_len")?;
        let stop_fn = typed_export(&instance, &mut store, "stop")?;

        debug!("module instance ready, memory size {} bytes", memory.data_size(&store));

        Ok(Self {
            store: Mutex::new(store),
            memory,
            alloc_fn,
            fetch_fn,
            response_ptr_fn,
            response_len_fn,
            stop_fn,
            stopped: AtomicBool::new(false),
        })
    }

    /// Signal shutdown to the module. Delivered at most once; later
    /// calls are no-ops. A trap from the stop export is logged and
    /// swallowed - stop is advisory, not a teardown of memory.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut store = self.store.lock().await;
        if let Err(e) = self.stop_fn.call(&mut *store, ()) {
            warn!("module stop export trapped: {e}");
        }
    }

    /// Whether shutdown has been signaled on this instance.
    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("stopped", &self.stopped())
            .finish_non_exhaustive()
    }
}

/// Resolve a typed export by name, mapping failure to an install error.
fn typed_export<P, R>(
    instance: &Instance,
    store: &mut Store<()>,
    name: &str,
) -> Result<TypedFunc<P, R>, ModuleError>
where
    P: wasmtime::WasmParams,
    R: wasmtime::WasmResults,
{
    instance
        .get_typed_func::<P, R>(&mut *store, name)
        .map_err(|e| ModuleError::Install(format!("missing or invalid export `{name}`: {e}")))
}
