//! Multi-tenant voucher tracking backend.
//!
//! Branch administrators define voucher books (numeric ranges), staff record
//! voucher entries against those books, and an admin role manages branches
//! and pulls filtered reports. JSON over HTTP; all state lives in Redis.
//!
//!
//!
//! # Storage Layout
//!
//! - `admin`: credential record, seeded at startup
//! - `branches` hash: branch id -> branch JSON (books, suppliers, column prefs)
//! - `branch_usernames` hash: username -> branch id
//! - `entries:{branchId}` hash: entry id -> voucher-entry JSON
//! - `used:{branchId}:{bookId}` set: reserved voucher numbers for one book
//! - `session:{token}`: bearer-token session with TTL
//!
//! The `used` sets are the heart of the system: `SADD` gives atomic
//! add-if-absent, so no two entries can ever claim the same number in the
//! same book. Creates, slot moves, and strict bulk imports run as Lua
//! scripts that pair the registry write with the entry write; deletes
//! release the number in the same `MULTI`/`EXEC` unit that removes the
//! entry.
//!
//!
//!
//! # Roles
//!
//! - **admin**: manages branches, reads any branch's report (`branchId`
//!   query parameter)
//! - **branch**: records and edits its own entries, books, and suppliers
//!
//! `POST /login` hands out an opaque token; every other endpoint expects it
//! as `Authorization: Bearer <token>`.

use std::time::Duration;

use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, patch, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod import;
pub mod models;
pub mod report;
pub mod reservation;
pub mod routes;
pub mod state;

use routes::{branch, entries, session};
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let app = Router::new()
        .route("/login", post(session::login))
        .route(
            "/branch",
            post(branch::create)
                .get(branch::list)
                .patch(branch::apply_action),
        )
        .route(
            "/branch/columns",
            get(branch::get_columns).patch(branch::set_columns),
        )
        .route(
            "/branch/supplier/{id}",
            patch(branch::edit_supplier).delete(branch::delete_supplier),
        )
        .route(
            "/branch/{id}",
            get(branch::get_one)
                .patch(branch::update)
                .put(branch::replace),
        )
        .route(
            "/voucherEntry",
            get(entries::list)
                .post(entries::create)
                .patch(entries::update),
        )
        .route("/voucherEntry/paid", patch(entries::toggle_paid))
        .route("/voucherEntry/bulk", post(entries::import_strict))
        .route("/voucherEntry/simple", post(entries::import_simple))
        .route(
            "/voucherEntry/{id}",
            get(entries::get_one).delete(entries::delete),
        )
        .route("/voucherEntry/{id}/cancel", patch(entries::toggle_cancel))
        .layer(cors)
        .with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
