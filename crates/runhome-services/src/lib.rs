//! Live service adapters behind the `runhome-core` provider traits.

pub mod backoff;
pub mod cache;
pub mod config;
pub mod context;
pub mod elevation;
pub mod endpoints;
pub mod osrm;
pub mod overpass;
pub mod transit;

pub use config::ServiceConfig;
pub use context::ServiceContext;
pub use endpoints::{EndpointPolicy, EndpointSet};
