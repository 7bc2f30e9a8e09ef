//! OData server: request normalization, dispatch, error mapping and
//! runtime debugging, served over axum.

pub mod network;
pub mod service;
pub mod telemetry;

pub use network::{NetworkConfig, NetworkModule, ODataHttpHandler};
pub use service::{ODataHandler, ServerConfig};
