use std::time::Duration;

use anyhow::Result;
use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::actions;
use crate::db::DbPool;
use crate::dispatch::Dispatcher;

/// Shared state handed to every handler: the pool for read-only repository
/// queries, and the Dispatcher for anything that writes.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub dispatcher: Dispatcher,
}

pub fn build_router(pool: DbPool, deadline: Duration) -> Router {
    let dispatcher = Dispatcher::new(pool.clone(), deadline);
    let state = AppState { pool, dispatcher };

    Router::new()
        .route("/reservations", post(actions::create_reservation))
        .route(
            "/reservations/batch",
            post(actions::create_reservations_batch),
        )
        .route(
            "/reservations/upcoming",
            get(actions::list_upcoming_reservations),
        )
        .route("/reservations/{id}", delete(actions::cancel_reservation))
        .route("/cars/{car_number}/location", get(actions::get_car_location))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn start_web_server(bind_addr: &str, pool: DbPool, deadline: Duration) -> Result<()> {
    let app = build_router(pool, deadline);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("web server listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
