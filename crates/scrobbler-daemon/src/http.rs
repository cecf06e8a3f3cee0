use crate::events::{EventSender, OrchestratorEvent};
use crate::orchestrator::TabsSnapshot;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use scrobbler_proto::protocol::Command;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    event_tx: EventSender,
}

#[derive(Serialize)]
struct CommandAccepted {
    command: &'static str,
}

pub fn start_server(
    bind_address: String,
    port: u16,
    event_tx: EventSender,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(event_tx);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

pub fn router(event_tx: EventSender) -> Router {
    Router::new()
        .route("/api/tabs", get(get_tabs))
        .route("/api/command/:name", get(run_command).post(run_command))
        .layer(CorsLayer::permissive())
        .with_state(HttpState { event_tx })
}

async fn get_tabs(State(state): State<HttpState>) -> Result<Json<TabsSnapshot>, StatusCode> {
    let (tx, rx) = oneshot::channel();
    state
        .event_tx
        .send(OrchestratorEvent::Snapshot(tx))
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    rx.await
        .map(Json)
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)
}

async fn run_command(
    State(state): State<HttpState>,
    Path(name): Path<String>,
) -> Result<Json<CommandAccepted>, StatusCode> {
    let command = Command::from_id(&name).ok_or(StatusCode::NOT_FOUND)?;
    state
        .event_tx
        .send(OrchestratorEvent::Command(command))
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(CommandAccepted {
        command: command.id(),
    }))
}
