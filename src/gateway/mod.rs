//! HTTP front of the gateway
//!
//! The server accepts traffic addressed to the fronted origin; the
//! router decides per request between module interception and origin
//! pass-through.

pub mod router;
pub mod server;

pub use router::{FetchInterceptionRouter, InterceptPolicy, OriginAuthority, RouteOutcome};
pub use server::GatewayServer;
