pub mod auth;
pub mod connection;
pub mod error;
pub mod reconcile;
pub mod response;
pub mod routes;
pub mod state;

use anyhow::Result;
use axum::{middleware, Router};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use connection::{Connection, ConnectionRegistry, ConnectionState};
pub use error::{ApiResponse, AppError};
pub use state::AppState;

/// One TCP port per logical channel, as the EA expects.
#[derive(Debug, Clone)]
pub struct Ports {
    pub control: u16,
    pub ticks: u16,
    pub trades: u16,
    pub logs: u16,
    pub ops: u16,
}

impl Default for Ports {
    fn default() -> Self {
        Self {
            control: 9900,
            ticks: 9901,
            trades: 9902,
            logs: 9903,
            ops: 9905,
        }
    }
}

fn with_layers(router: Router<AppState>, state: &AppState) -> Router {
    router
        .layer(middleware::from_fn(auth::auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state.clone())
}

/// Bind all five channels and serve until the shutdown signal fires.
pub async fn serve_all(
    state: AppState,
    ports: Ports,
    shutdown: broadcast::Sender<()>,
) -> Result<()> {
    let channels: Vec<(u16, Router, &str)> = vec![
        (ports.control, with_layers(routes::control_router(), &state), "control"),
        (ports.ticks, with_layers(routes::tick_router(), &state), "ticks"),
        (ports.trades, with_layers(routes::trade_router(), &state), "trades"),
        (ports.logs, with_layers(routes::log_router(), &state), "logs"),
        (ports.ops, with_layers(routes::ops_router(), &state), "ops"),
    ];

    let mut tasks = Vec::new();
    for (port, router, name) in channels {
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
        tracing::info!("{} channel listening on :{}", name, port);

        let mut rx = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = rx.recv().await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!("{} channel failed: {}", name, e);
            }
        }));
    }

    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}
