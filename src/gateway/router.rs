//! Fetch interception routing
//!
//! Decides per request whether to service it from the module or defer
//! to normal network handling, and performs the module call for
//! intercepted requests. Interception is all-or-nothing: once a
//! request is deemed eligible it gets a module-produced answer, even
//! if that means suspending until the first install completes.

use std::sync::Arc;
use tracing::debug;

use crate::module::error::ModuleError;
use crate::module::manager::InstanceLifecycleManager;
use crate::module::marshal::{self, RequestEnvelope, ResponseEnvelope};

/// What to do with an incoming request.
#[derive(Debug)]
pub enum RouteOutcome {
    /// Serviced by the module; respond with this envelope
    Intercepted(ResponseEnvelope),
    /// Not eligible; defer to default network handling
    PassThrough,
}

/// Host and effective port of the fronted origin, for comparing
/// absolute-form request targets against the origin the gateway
/// fronts. Default ports are resolved from the scheme, so
/// `https://example.com` and `https://example.com:443` name the same
/// authority.
#[derive(Debug, Clone)]
pub struct OriginAuthority {
    host: String,
    port: u16,
}

impl OriginAuthority {
    /// Parse from a base URL such as `http://127.0.0.1:8080`.
    pub fn parse(origin: &str) -> Option<Self> {
        let uri = origin.parse::<http::Uri>().ok()?;
        let host = uri.host()?.to_ascii_lowercase();
        Some(Self {
            host,
            port: effective_port(&uri),
        })
    }

    /// Whether an absolute-form target names this authority.
    fn matches(&self, uri: &http::Uri) -> bool {
        match uri.host() {
            Some(host) => host.eq_ignore_ascii_case(&self.host) && effective_port(uri) == self.port,
            None => true,
        }
    }
}

/// Explicit port of the target, or the scheme's default.
fn effective_port(uri: &http::Uri) -> u16 {
    uri.port_u16().unwrap_or_else(|| match uri.scheme_str() {
        Some("https") => 443,
        _ => 80,
    })
}

/// Fixed eligibility rules for interception.
///
/// A request is intercepted only when it targets the gateway's own
/// origin, is not under the assets prefix, and is not one of the
/// excluded well-known paths (the module source itself and the bypass
/// list).
#[derive(Debug, Clone)]
pub struct InterceptPolicy {
    /// The fronted origin; absolute-form targets naming any other
    /// authority pass through. `None` skips the check.
    pub origin: Option<OriginAuthority>,
    /// Requests under this path prefix always pass through
    pub assets_prefix: String,
    /// The module's own source path, never intercepted
    pub module_source_path: String,
    /// Additional well-known paths that always pass through
    pub bypass_paths: Vec<String>,
}

impl InterceptPolicy {
    /// Whether a request for `url` should be serviced by the module.
    pub fn intercepts(&self, url: &str) -> bool {
        let Ok(uri) = url.parse::<http::Uri>() else {
            return false;
        };

        // Relative-form targets are same-origin by construction; an
        // absolute-form target must name the fronted origin, port and
        // all.
        if let Some(origin) = &self.origin {
            if !origin.matches(&uri) {
                return false;
            }
        }

        let path = uri.path();
        if path.starts_with(&self.assets_prefix) {
            return false;
        }
        if path == self.module_source_path {
            return false;
        }
        if self.bypass_paths.iter().any(|p| p == path) {
            return false;
        }

        true
    }
}

/// Top-level per-request entry point.
pub struct FetchInterceptionRouter {
    manager: Arc<InstanceLifecycleManager>,
    policy: InterceptPolicy,
}

impl FetchInterceptionRouter {
    /// Create a router over `manager` with the given eligibility rules.
    pub fn new(manager: Arc<InstanceLifecycleManager>, policy: InterceptPolicy) -> Self {
        Self { manager, policy }
    }

    /// Route one request: pass it through, or suspend until an
    /// instance is Ready and marshal it through the module.
    ///
    /// Errors are scoped to this request; they never affect the
    /// instance slot.
    pub async fn route(&self, request: RequestEnvelope) -> Result<RouteOutcome, ModuleError> {
        if !self.policy.intercepts(&request.url) {
            debug!(url = %request.url, "passing request through to origin");
            return Ok(RouteOutcome::PassThrough);
        }

        let Some(instance) = self.manager.slot().ready().await else {
            return Err(ModuleError::Invocation(
                "instance slot closed during shutdown".to_string(),
            ));
        };

        let response = marshal::invoke(&instance, &request).await?;
        Ok(RouteOutcome::Intercepted(response))
    }
}
