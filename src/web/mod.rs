//! HTTP front end: the HTML search page and a small JSON API.
//!
//! | Method | Path                 | Purpose                                  |
//! |--------|----------------------|------------------------------------------|
//! | GET    | `/`                  | Search page; `action=smart\|dumb` runs a search |
//! | GET    | `/api/facets`        | Discovered values per facet              |
//! | GET    | `/api/stats`         | Collection name and card count           |
//! | POST   | `/api/search/smart`  | Embedding similarity search              |
//! | POST   | `/api/search/dumb`   | Filter-only search                       |
//! | POST   | `/api/refresh`       | Reopen storage and clear cached results  |

pub mod errors;
pub mod handlers;
pub mod page;

pub use handlers::AppState;

use crate::search::CardSearcher;
use axum::Router;
use axum::routing::{get, post};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

pub fn create_router(searcher: Arc<CardSearcher>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/api/facets", get(handlers::facets))
        .route("/api/stats", get(handlers::stats))
        .route("/api/search/smart", post(handlers::smart_search))
        .route("/api/search/dumb", post(handlers::dumb_search))
        .route("/api/refresh", post(handlers::refresh))
        .with_state(AppState { searcher })
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        log::error!("failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    log::warn!("shutting down");
}

/// Serves the search UI on `bind` until Ctrl+C.
pub async fn serve(searcher: Arc<CardSearcher>, bind: SocketAddr) -> anyhow::Result<()> {
    let app = create_router(searcher);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", bind, e))?;
    log::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Builds a multi-threaded runtime and blocks on [`serve`].
pub fn start_server(searcher: Arc<CardSearcher>, bind: SocketAddr) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(serve(searcher, bind))
}
