//! Catch-all handler for everything under the service path.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::response::Response;

use super::AppState;
use crate::network::inbound::InboundRequest;

/// Hands the request to the OData pipeline and counts it as in flight
/// until the response is produced.
pub async fn odata_handler(State(state): State<AppState>, request: Request) -> Response<Body> {
    let _in_flight = state.lifecycle.track();
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let inbound = InboundRequest::from_http(
        request,
        state.odata.handler().config(),
        remote,
        state.local_addr,
    );
    state.odata.process(inbound).await
}
