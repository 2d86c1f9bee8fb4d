//! Shared test fixtures
//!
//! Scripted module fetchers and small WAT modules exercising the
//! export contract.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

use wasm_gateway::module::{
    FetchedModule, InstanceLifecycleManager, ModuleError, ModuleFetcher, RevalidateTrigger,
};

/// Echoes the request bytes back as the response.
pub const ECHO_MODULE: &str = r#"
    (module
      (memory (export "memory") 2)
      (global $len (mut i32) (i32.const 0))
      (func (export "allocate_request") (param $n i32) (result i32)
        (global.set $len (local.get $n))
        (i32.const 1024))
      (func (export "fetch") (result i32) (i32.const 0))
      (func (export "response_ptr") (result i32) (i32.const 1024))
      (func (export "response_len") (result i32) (global.get $len))
      (func (export "stop")))
"#;

/// Responds with two ASCII digits: cumulative allocate calls, then
/// cumulative fetch calls.
pub const COUNTER_MODULE: &str = r#"
    (module
      (memory (export "memory") 1)
      (global $allocs (mut i32) (i32.const 0))
      (global $fetches (mut i32) (i32.const 0))
      (func (export "allocate_request") (param i32) (result i32)
        (global.set $allocs (i32.add (global.get $allocs) (i32.const 1)))
        (i32.const 1024))
      (func (export "fetch") (result i32)
        (global.set $fetches (i32.add (global.get $fetches) (i32.const 1)))
        (i32.store8 (i32.const 2048) (i32.add (i32.const 48) (global.get $allocs)))
        (i32.store8 (i32.const 2049) (i32.add (i32.const 48) (global.get $fetches)))
        (i32.const 0))
      (func (export "response_ptr") (result i32) (i32.const 2048))
      (func (export "response_len") (result i32) (i32.const 2))
      (func (export "stop")))
"#;

/// Traps inside the `fetch` export.
pub const TRAP_FETCH_MODULE: &str = r#"
    (module
      (memory (export "memory") 1)
      (func (export "allocate_request") (param i32) (result i32) (i32.const 1024))
      (func (export "fetch") (result i32) unreachable)
      (func (export "response_ptr") (result i32) (i32.const 0))
      (func (export "response_len") (result i32) (i32.const 0))
      (func (export "stop")))
"#;

/// Responds with bytes that are not valid UTF-8.
pub const BAD_UTF8_MODULE: &str = r#"
    (module
      (memory (export "memory") 1)
      (func (export "allocate_request") (param i32) (result i32) (i32.const 1024))
      (func (export "fetch") (result i32)
        (i32.store8 (i32.const 2048) (i32.const 0xff))
        (i32.store8 (i32.const 2049) (i32.const 0xfe))
        (i32.const 0))
      (func (export "response_ptr") (result i32) (i32.const 2048))
      (func (export "response_len") (result i32) (i32.const 2))
      (func (export "stop")))
"#;

/// Reports a response range far outside linear memory.
pub const BAD_RANGE_MODULE: &str = r#"
    (module
      (memory (export "memory") 1)
      (func (export "allocate_request") (param i32) (result i32) (i32.const 1024))
      (func (export "fetch") (result i32) (i32.const 0))
      (func (export "response_ptr") (result i32) (i32.const 0))
      (func (export "response_len") (result i32) (i32.const 0x7fffffff))
      (func (export "stop")))
"#;

/// One step of a scripted fetch sequence.
pub enum FetchStep {
    /// A successful fetch of the given WAT image
    Image {
        tag: Option<&'static str>,
        wat: &'static str,
    },
    /// A network-level fetch failure
    Fail(&'static str),
}

impl FetchStep {
    pub fn image(tag: &'static str, wat: &'static str) -> Self {
        FetchStep::Image {
            tag: Some(tag),
            wat,
        }
    }

    pub fn untagged(wat: &'static str) -> Self {
        FetchStep::Image { tag: None, wat }
    }
}

/// Fetcher that replays a fixed script and counts fetch attempts.
pub struct ScriptedFetcher {
    steps: Mutex<VecDeque<FetchStep>>,
    fetches: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(steps: Vec<FetchStep>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleFetcher for ScriptedFetcher {
    async fn fetch_module(&self) -> Result<FetchedModule, ModuleError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .lock()
            .await
            .pop_front()
            .expect("fetch script exhausted");
        match step {
            FetchStep::Image { tag, wat } => Ok(FetchedModule {
                version_tag: tag.map(String::from),
                bytes: Bytes::from_static(wat.as_bytes()),
            }),
            FetchStep::Fail(reason) => Err(ModuleError::Fetch(reason.to_string())),
        }
    }
}

/// Fetcher that blocks until released, to hold a revalidation in
/// flight.
pub struct GatedFetcher {
    gate: Semaphore,
    fetches: AtomicUsize,
}

impl GatedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            fetches: AtomicUsize::new(0),
        })
    }

    /// Allow one pending fetch to complete.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleFetcher for GatedFetcher {
    async fn fetch_module(&self) -> Result<FetchedModule, ModuleError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .expect("gate closed while fetch pending");
        permit.forget();
        Ok(FetchedModule {
            version_tag: None,
            bytes: Bytes::from_static(ECHO_MODULE.as_bytes()),
        })
    }
}

/// A manager with the given WAT module already installed.
pub async fn ready_manager(wat: &'static str) -> Arc<InstanceLifecycleManager> {
    let fetcher = ScriptedFetcher::new(vec![FetchStep::untagged(wat)]);
    let manager = Arc::new(InstanceLifecycleManager::new(fetcher));
    manager
        .revalidate(RevalidateTrigger::Startup)
        .await
        .expect("install failed");
    manager
}
