//! Device-side entry point. The poller that talks to the Nest API posts each
//! reading here and the handler queues it for the listener. The snapshot
//! store is left alone; the listener refreshes it as it takes each reading.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use lib_nest::Reading;

use crate::nest_logic::state::AppState;

pub async fn ingest_handler(State(state): State<AppState>, Json(reading): Json<Reading>) -> impl IntoResponse {
    let timestamp = reading.timestamp.to_rfc3339();
    match state.readings_tx.send(reading).await {
        Ok(()) => {
            log::debug!(param = timestamp; "Reading queued for broadcast");
            (StatusCode::ACCEPTED, "queued")
        }
        Err(_) => {
            log::error!(param = timestamp; "Listener is gone, reading dropped");
            (StatusCode::SERVICE_UNAVAILABLE, "listener stopped")
        }
    }
}
