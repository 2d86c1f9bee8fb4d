//! Sandboxed module support for the gateway
//!
//! A single WebAssembly module instance services intercepted requests.
//! This module owns its whole lifecycle:
//!
//! - **Sandbox Isolation**: the module runs inside a wasmtime instance
//!   with no imports; its only surface is the export contract
//! - **Single Instance**: exactly one instance is current at a time,
//!   published through a replaceable readiness slot
//! - **Hot Swap**: a changed source image installs a new instance and
//!   retires the old one without dropping in-flight requests
//! - **Crash Containment**: a trapping module fails one request, never
//!   the gateway

pub mod error;
pub mod fetch;
pub mod instance;
pub mod manager;
pub mod marshal;
pub mod scheduler;
pub mod slot;

pub use error::ModuleError;
pub use fetch::{FetchedModule, HttpModuleFetcher, ModuleFetcher};
pub use instance::ModuleInstance;
pub use manager::{InstanceLifecycleManager, RevalidateTrigger};
pub use marshal::{RequestEnvelope, ResponseEnvelope};
pub use scheduler::{IntervalPolicy, RevalidationScheduler, SchedulerHandle};
pub use slot::{InstanceSlot, SlotState};
