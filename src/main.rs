//! HTTP server for the matching core.
//!
//! Reads `MATCHING_*` (see [`symbol_matcher::DispatcherConfig`]), `PORT` (default 8080) and
//! optionally `ORDERS_FILE`, whose orders are replayed before the server starts.
//! Ctrl-C stops the server and drains the workers.

use log::{info, warn};
use std::sync::Arc;
use symbol_matcher::{api, loader, Dispatcher, DispatcherConfig};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = env_logger::try_init();
    let config = DispatcherConfig::from_env()?;
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    let dispatcher = Arc::new(Dispatcher::start(config)?);

    if let Ok(path) = std::env::var("ORDERS_FILE") {
        let orders = loader::load_file(&path)?;
        info!("replaying {} orders from {}", orders.len(), path);
        let d = Arc::clone(&dispatcher);
        tokio::task::spawn_blocking(move || {
            for request in orders {
                let order_id = request.order_id;
                if let Err(e) = d.submit_and_wait(request) {
                    warn!("order {} from file not applied: {}", order_id, e);
                }
            }
            for symbol in d.symbols() {
                match d.book(symbol, true) {
                    Ok(snapshot) => info!("\n{}", snapshot),
                    Err(e) => warn!("no book for {}: {}", symbol, e),
                }
            }
        })
        .await?;
    }

    let app = api::create_router(Arc::clone(&dispatcher));
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!("listening on http://{}", addr);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let report = tokio::task::spawn_blocking(move || dispatcher.shutdown()).await??;
    info!(
        "stopped: {} workers drained {} commands",
        report.workers, report.commands_processed
    );
    Ok(())
}
