//! HTTP transport: request adaptation, response materialization, routing,
//! middleware, and the server lifecycle.

pub mod config;
pub mod handlers;
pub mod http_handler;
pub mod inbound;
pub mod lifecycle;
pub mod materialize;
pub mod middleware;
pub mod module;

pub use config::NetworkConfig;
pub use handlers::AppState;
pub use http_handler::ODataHttpHandler;
pub use inbound::InboundRequest;
pub use lifecycle::{HealthState, Lifecycle, RequestGuard};
pub use materialize::{convert_to_http, copy_content, MaterializeError, COPY_BUFFER_SIZE};
pub use module::NetworkModule;
