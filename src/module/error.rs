//! Module system errors
//!
//! Distinguishes failures of the revalidation cycle (fetch, install)
//! from failures scoped to a single intercepted request (invocation,
//! decode). Fetch and install errors leave any previously installed
//! instance serving; invocation and decode errors never touch the
//! instance slot.

use thiserror::Error;

/// Module system errors
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Network/IO failure while retrieving the module source bytes
    #[error("module source fetch failed: {0}")]
    Fetch(String),

    /// Module failed to compile or instantiate from fetched bytes,
    /// including a missing or ill-typed export
    #[error("module install failed: {0}")]
    Install(String),

    /// A module export trapped or failed while servicing one request
    #[error("module invocation failed: {0}")]
    Invocation(String),

    /// Response bytes read from module memory were not valid UTF-8
    #[error("module response decode failed: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ModuleError {
    fn from(e: reqwest::Error) -> Self {
        ModuleError::Fetch(e.to_string())
    }
}

impl From<std::string::FromUtf8Error> for ModuleError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        ModuleError::Decode(e.to_string())
    }
}
