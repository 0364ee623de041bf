//! HTTP server: application state, error mapping, health endpoints and the
//! router, plus graceful shutdown handling.

pub mod error;
pub mod health;
pub mod routes;
pub mod state;

pub use error::{status_for, AppError};
pub use health::health_check;
pub use routes::build_router;
pub use state::{AppServices, AppState};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

use tokio::signal;
use tracing::info;

/// Resolves when SIGINT (Ctrl+C) or SIGTERM arrives.
///
/// # Panics
///
/// Panics if the process signal handlers cannot be installed.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
