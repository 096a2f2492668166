//! REST API over a running [`Dispatcher`].
//!
//! Used by the binary and by integration tests. Create with [`create_router`].
//! Uses Extension for state so the router is `Router<()>` and works with `into_make_service()`.
//! Dispatcher calls block on a worker reply, so handlers run them on the blocking pool.
//!
//! | Route | Body / query | Reply |
//! |---|---|---|
//! | `GET /health` | | `ok` |
//! | `POST /orders` | [`OrderRequest`] | [`crate::Execution`] |
//! | `POST /orders/cancel` | `{"order_id"}` | [`crate::CancelAck`] |
//! | `POST /orders/modify` | `{"order_id", "quantity", "price"?}` | [`crate::ModifyAck`] |
//! | `GET /book/:symbol` | `?detail=true` | [`crate::BookSnapshot`] |
//!
//! Rejections are 400, unknown orders 404, a draining dispatcher 503; the body is
//! `{"error": "..."}`.

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::warn;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::{Dispatcher, Error, OrderId, OrderRequest, Symbol};

#[derive(Clone)]
pub struct AppState {
    pub(crate) dispatcher: Arc<Dispatcher>,
}

/// Builds the REST router. Returns `Router<()>` so you can call `.into_make_service()` for `axum::serve`.
pub fn create_router(dispatcher: Arc<Dispatcher>) -> Router<()> {
    Router::new()
        .route("/health", get(health))
        .route("/orders", post(submit_order))
        .route("/orders/cancel", post(cancel_order))
        .route("/orders/modify", post(modify_order))
        .route("/book/:symbol", get(book))
        .layer(Extension(AppState { dispatcher }))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

fn error_response(e: Error) -> Response {
    let status = match &e {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::ShuttingDown | Error::WorkerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Config(_) | Error::Spawn(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}

async fn run_blocking<T, F>(state: AppState, call: F) -> Response
where
    F: FnOnce(&Dispatcher) -> crate::Result<T> + Send + 'static,
    T: serde::Serialize + Send + 'static,
{
    match tokio::task::spawn_blocking(move || call(&state.dispatcher)).await {
        Ok(Ok(value)) => (StatusCode::OK, Json(value)).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(e) => {
            warn!("dispatcher call failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn submit_order(
    Extension(state): Extension<AppState>,
    Json(request): Json<OrderRequest>,
) -> Response {
    run_blocking(state, move |d| d.submit_and_wait(request)).await
}

#[derive(serde::Deserialize)]
struct CancelRequest {
    order_id: u64,
}

async fn cancel_order(
    Extension(state): Extension<AppState>,
    Json(body): Json<CancelRequest>,
) -> Response {
    run_blocking(state, move |d| d.cancel(OrderId(body.order_id))).await
}

#[derive(serde::Deserialize)]
struct ModifyRequest {
    order_id: u64,
    quantity: u64,
    #[serde(default)]
    price: Option<Decimal>,
}

async fn modify_order(
    Extension(state): Extension<AppState>,
    Json(body): Json<ModifyRequest>,
) -> Response {
    run_blocking(state, move |d| {
        d.modify(OrderId(body.order_id), body.quantity, body.price)
    })
    .await
}

#[derive(serde::Deserialize)]
struct BookQuery {
    #[serde(default)]
    detail: bool,
}

async fn book(
    Extension(state): Extension<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<BookQuery>,
) -> Response {
    let symbol = Symbol::from(symbol);
    run_blocking(state, move |d| d.book(&symbol, query.detail)).await
}
