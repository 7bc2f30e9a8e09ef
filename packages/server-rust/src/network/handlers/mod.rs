//! axum handlers and the state they share.

pub mod health;
pub mod odata;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use odata::odata_handler;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use super::http_handler::ODataHttpHandler;
use super::lifecycle::Lifecycle;

/// State carried through axum's `State` extractor. Cloning copies `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub odata: Arc<ODataHttpHandler>,
    pub lifecycle: Arc<Lifecycle>,
    /// Address the listener is bound to, when known.
    pub local_addr: Option<SocketAddr>,
    /// Process start time, used for uptime.
    pub start_time: Instant,
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    use crate::service::testing::metadata;
    use crate::service::{ODataHandler, ServerConfig};

    AppState {
        odata: Arc::new(ODataHttpHandler::new(ODataHandler::new(
            metadata(),
            Arc::new(ServerConfig::default()),
        ))),
        lifecycle: Arc::new(Lifecycle::new()),
        local_addr: None,
        start_time: Instant::now(),
    }
}
