//! HTTP layer over an encrypted store.
//!
//! Thin I/O glue around the codec crates: every handler resolves the
//! session key, calls into the chunk or name codec, and maps authentication
//! failures to a login redirect. The store itself owns all invariants.

pub mod handlers;
pub mod html;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use cipherbox_common::Result;
use cipherbox_store::Store;

/// Build the application router.
pub fn router(store: Arc<Store>) -> Router {
    Router::new()
        .route("/login", get(handlers::login_form).post(handlers::login))
        .route("/logout", get(handlers::logout))
        .route(
            "/change_password",
            get(handlers::change_password_form).post(handlers::change_password),
        )
        .route("/migrate", get(handlers::run_migration))
        .route("/save", post(handlers::save))
        .route("/", get(handlers::browse_root))
        .route("/{*path}", get(handlers::browse))
        // Uploads are whole files from a trusted session; the default 2 MiB
        // body cap does not apply.
        .layer(DefaultBodyLimit::disable())
        .with_state(store)
}

/// Serve the store on `addr` until the process is stopped.
pub async fn serve(store: Arc<Store>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "serving encrypted store");
    axum::serve(listener, router(store)).await?;
    Ok(())
}
