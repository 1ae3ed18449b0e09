//! Request logging middleware

use axum::{
    extract::{ConnectInfo, Request},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{error, info, warn};

/// Log method, path, status, latency and client address of every request
pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let client_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string());

    let response = next.run(req).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    if response.status().is_server_error() {
        error!(status, ?latency, client_ip = %client_ip, method = %method, path = %path, "Request failed");
    } else if response.status().is_client_error() {
        warn!(status, ?latency, client_ip = %client_ip, method = %method, path = %path, "Request rejected");
    } else {
        info!(status, ?latency, client_ip = %client_ip, method = %method, path = %path, "Request completed");
    }

    response
}
