//! Call-platform webhook ingestion endpoint.
//!
//! Contract: verify the signature against the raw body, parse, extract the
//! canonical meeting id, dedupe by the platform event id, then dispatch to
//! the lifecycle machine. Duplicates and race losses are success responses —
//! a non-2xx here encourages the platform to redeliver an event whose
//! business transition already committed.

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde_json::json;
use tracing::{debug, warn};

use super::ApiState;
use crate::api::error::ApiError;
use crate::db::events::EventLedger;
use crate::webhook::{signature, InboundEvent, ParseError};

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .with_state(state)
}

async fn handle_webhook(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, ApiError> {
    // 1. Authenticity. Bypass only when explicitly configured off.
    if state.webhook.verify_signatures {
        let header = headers
            .get(signature::SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if !signature::verify(&state.webhook.secret, body.as_bytes(), header) {
            warn!("Webhook rejected: bad or missing signature");
            return Err(ApiError::unauthorized("Unauthorized"));
        }
    }

    // 2 & 3. Parse and extract the canonical meeting id.
    let event = InboundEvent::parse(&body, &state.default_call_type).map_err(|e| match e {
        ParseError::BadJson(_) => ApiError::bad_request("Bad JSON"),
        ParseError::MissingMeetingId => ApiError::bad_request("No meeting id"),
    })?;

    debug!(
        "Webhook event {} for meeting {} (id: {:?})",
        event.type_str(),
        event.meeting_id,
        event.event_id
    );

    // 4. Dedup gate, keyed on the platform event id when one is present.
    if let Some(event_id) = event.event_id.clone() {
        let event_type = event.type_str().to_string();
        let db = state.db.clone();
        let fresh = tokio::task::spawn_blocking(move || {
            let conn = db.lock();
            EventLedger::record_if_new(&conn, &event_id, &event_type)
        })
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .map_err(ApiError::from)?;

        if !fresh {
            debug!("Duplicate delivery of event {:?}", event.event_id);
            return Ok(Json(json!({ "status": "duplicate" })).into_response());
        }
    }

    // 5. Dispatch. Race losses and unknown kinds come back as no-ops.
    let outcome = state.lifecycle.handle(event).await.map_err(ApiError::from)?;

    // 6. Success either way, but the status names what happened: "ok" for an
    // applied transition, the no-op reason for the losing side of a race.
    Ok(Json(json!({ "status": outcome.status_label() })).into_response())
}
