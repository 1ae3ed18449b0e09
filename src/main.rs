//! AI Bridges
//!
//! A local gateway that serves OpenAI, Claude and Gemini compatible APIs and
//! answers every request through the Gemini web application, authenticated
//! with browser session cookies.

mod api;
mod conversion;
mod core;
mod models;

use crate::api::endpoints::{AppState, create_router};
use crate::core::config::Config;
use crate::core::logging::init_logging;
use crate::core::provider_manager::ProviderManager;
use crate::core::providers::{GeminiEndpoints, GeminiWebClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Ports tried, in order, when the configured one is taken
const FALLBACK_PORTS: &[u16] = &[3001, 3002, 3003, 3004, 3005, 8080, 8081, 8082, 9000, 9001];

#[tokio::main]
async fn main() {
    if std::env::args().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return;
    }

    let config = match Config::load() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            eprintln!("Configuration Error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.server.log_level, config.server.production);
    print_startup_banner(&config);

    let providers = Arc::new(ProviderManager::new());
    match GeminiWebClient::new(&config.gemini, GeminiEndpoints::default()) {
        Ok(client) => providers.register("gemini", Arc::new(client)),
        Err(e) => error!("Failed to create Gemini client: {}", e),
    }

    providers.init_all().await;

    if let Err(e) = providers.select_provider(&config.providers.provider_type) {
        error!("Failed to select provider: {}", e);
    }
    match providers.selected_name() {
        Some(name) => info!("Using provider: {}", name),
        None => warn!("No provider selected; chat endpoints will answer 503"),
    }

    let app = create_router(AppState {
        config: config.clone(),
        providers: providers.clone(),
    });

    let Some(listener) = bind(&config.server.host, config.server.port).await else {
        error!("No available port found");
        std::process::exit(1);
    };

    if let Ok(addr) = listener.local_addr() {
        info!("Server listening on http://{}", addr);
    }

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    if let Err(e) = served {
        error!("Server error: {}", e);
    }

    info!("Shutting down server...");
    providers.close_all().await;
    info!("Server exited");
}

/// Bind the configured port, then each fallback port in turn
async fn bind(host: &str, port: u16) -> Option<TcpListener> {
    let candidates = std::iter::once(port).chain(FALLBACK_PORTS.iter().copied().filter(|p| *p != port));

    for candidate in candidates {
        let addr = format!("{}:{}", host, candidate);
        match TcpListener::bind(&addr).await {
            Ok(listener) => {
                if candidate != port {
                    warn!("Port {} is busy, using {} instead", port, candidate);
                }
                return Some(listener);
            }
            Err(e) => warn!("Failed to bind to {}: {}", addr, e),
        }
    }
    None
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn print_startup_banner(config: &Config) {
    println!("AI Bridges v{}", env!("CARGO_PKG_VERSION"));
    println!("Configuration loaded successfully");
    println!("   Provider: {}", config.providers.provider_type);
    println!("   Server: {}:{}", config.server.host, config.server.port);
    println!("   Log Level: {}", config.server.log_level);
    println!(
        "   Cookie Refresh: every {} min",
        config.gemini.refresh_interval
    );
    println!("   Cookie Cache: {}", config.gemini.cookie_cache_dir);
    println!("   Request Timeout: {}s", config.request.timeout_secs);
    println!();
}

fn print_help() {
    println!("AI Bridges v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: ai-bridges [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --help    Display this help message");
    println!();
    println!("Gemini session cookies:");
    println!("  GEMINI_1PSID - __Secure-1PSID cookie value (required)");
    println!("  GEMINI_1PSIDTS - __Secure-1PSIDTS cookie value");
    println!("  GEMINI_1PSIDCC - __Secure-1PSIDCC cookie value");
    println!("  GEMINI_COOKIES - Raw cookie header; fills any of the above left empty");
    println!("  GEMINI_REFRESH_INTERVAL - Cookie rotation interval in minutes (default: 5)");
    println!("  GEMINI_COOKIE_CACHE_DIR - Directory for rotated cookies (default: .cookies)");
    println!();
    println!("Server settings:");
    println!("  HOST - Server host (default: 0.0.0.0)");
    println!("  PORT - Server port (default: 3000)");
    println!("  LOG_LEVEL - Logging level (default: info)");
    println!("  APP_ENV - Set to 'production' for plain, uncolored logs");
    println!("  PROVIDER_TYPE - Active provider (default: gemini)");
    println!("  REQUEST_TIMEOUT - Backend request timeout in seconds (default: 300)");
    println!("  CONFIG_PATH - Optional TOML config file (default: config.toml)");
}
