//! wasm-gateway - HTTP intermediary backed by a hot-swappable
//! WebAssembly module
//!
//! The gateway stands in front of a single origin's traffic and
//! services eligible requests from a sandboxed WebAssembly module
//! instead of letting them reach the network. It keeps exactly one
//! module instance current, periodically checks the origin for a newer
//! image, and swaps instances without dropping in-flight or queued
//! requests.
//!
//! ## Architecture
//!
//! - [`module::InstanceLifecycleManager`] - fetches, validates,
//!   installs, and retires module instances under mutual exclusion
//! - [`module::marshal`] - encodes a request into bytes, transfers it
//!   through module linear memory, and decodes the response
//! - [`module::RevalidationScheduler`] - periodic and event-triggered
//!   revalidation with randomized cadence
//! - [`gateway::FetchInterceptionRouter`] - per-request eligibility
//!   and dispatch into the module
//! - [`gateway::GatewayServer`] - the HTTP front, proxying
//!   non-intercepted traffic to the origin
//!
//! ## Design Principles
//!
//! 1. **One instance at a time**: a single replaceable slot, never
//!    concurrent instances
//! 2. **Swap before stop**: consumers waiting after a swap only ever
//!    see the replacement; in-flight holders drain against the old one
//! 3. **Degrade to stale**: a failed check leaves the previous
//!    instance serving
//! 4. **Request-scoped failure**: a trapping module fails one request,
//!    never the process

pub mod config;
pub mod gateway;
pub mod module;

pub use config::GatewayConfig;
pub use gateway::{
    FetchInterceptionRouter, GatewayServer, InterceptPolicy, OriginAuthority, RouteOutcome,
};
pub use module::{
    InstanceLifecycleManager, IntervalPolicy, ModuleError, ModuleFetcher, RequestEnvelope,
    ResponseEnvelope, RevalidateTrigger, RevalidationScheduler,
};
