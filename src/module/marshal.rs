//! Request/response marshalling
//!
//! The wire protocol between the gateway and a module instance: the
//! request is serialized as a UTF-8 JSON object, written into module
//! linear memory at a module-allocated offset, the module's `fetch`
//! export is invoked, and the response is read back from the offset
//! and length the module reports.
//!
//! Wire format:
//! `{ "method": string, "url": string, "headers": [[name, value], ...], "body": string }`

use serde::{Deserialize, Serialize};

use crate::module::error::ModuleError;
use crate::module::instance::ModuleInstance;

/// Content type attached to every module-produced response.
pub const RESPONSE_CONTENT_TYPE: &str = "text/html";

/// An intercepted request, built fresh per interception.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// HTTP method
    pub method: String,
    /// Target URL as received
    pub url: String,
    /// Header name/value pairs in received order
    pub headers: Vec<(String, String)>,
    /// Request body decoded as text
    pub body: String,
}

impl RequestEnvelope {
    /// Create an envelope with no headers and an empty body.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: String::new(),
        }
    }
}

/// A module-produced response.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    /// Response content decoded as UTF-8 text
    pub content: String,
    /// Fixed content type (`text/html`)
    pub content_type: &'static str,
}

/// Marshal one request through a module instance.
///
/// Performs exactly one allocation and one `fetch` invocation, never
/// reads past the module-reported response length, and holds no
/// reference into module memory beyond the call (the backing storage
/// may be moved by memory growth between calls).
pub async fn invoke(
    instance: &ModuleInstance,
    request: &RequestEnvelope,
) -> Result<ResponseEnvelope, ModuleError> {
    let encoded = serde_json::to_vec(request)
        .map_err(|e| ModuleError::Invocation(format!("request encoding failed: {e}")))?;

    let bytes = {
        let mut store = instance.store.lock().await;

        let offset = instance
            .alloc_fn
            .call(&mut *store, encoded.len() as u32)
            .map_err(|e| ModuleError::Invocation(format!("allocate_request trapped: {e}")))?;

        let memory = instance.memory.data_mut(&mut *store);
        let dest = memory
            .get_mut(offset as usize..offset as usize + encoded.len())
            .ok_or_else(|| {
                ModuleError::Invocation(format!(
                    "allocated request buffer out of bounds: offset={offset}, len={}",
                    encoded.len()
                ))
            })?;
        dest.copy_from_slice(&encoded);

        instance
            .fetch_fn
            .call(&mut *store, ())
            .map_err(|e| ModuleError::Invocation(format!("fetch trapped: {e}")))?;

        let ptr = instance
            .response_ptr_fn
            .call(&mut *store, ())
            .map_err(|e| ModuleError::Invocation(format!("response_ptr trapped: {e}")))?;
        let len = instance
            .response_len_fn
            .call(&mut *store, ())
            .map_err(|e| ModuleError::Invocation(format!("response_len trapped: {e}")))?;

        let memory = instance.memory.data(&*store);
        memory
            .get(ptr as usize..ptr as usize + len as usize)
            .ok_or_else(|| {
                ModuleError::Invocation(format!(
                    "reported response range out of bounds: offset={ptr}, len={len}"
                ))
            })?
            .to_vec()
    };

    let content = String::from_utf8(bytes)?;
    Ok(ResponseEnvelope {
        content,
        content_type: RESPONSE_CONTENT_TYPE,
    })
}
