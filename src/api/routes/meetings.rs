//! Meeting CRUD endpoints. The webhook path owns the lifecycle fields; these
//! routes only create, read, and cancel.

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

use super::ApiState;
use crate::api::error::{ApiError, ApiResult};
use crate::db::agents::AgentRepository;
use crate::db::meetings::{MeetingRecord, MeetingRepository, NewMeeting};

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/meetings", post(create_meeting).get(list_meetings))
        .route("/meetings/:id", get(get_meeting))
        .route("/meetings/:id/cancel", post(cancel_meeting))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CreateMeetingRequest {
    owner_user_id: String,
    agent_id: String,
    name: String,
}

async fn create_meeting(
    State(state): State<ApiState>,
    Json(req): Json<CreateMeetingRequest>,
) -> ApiResult<Json<Value>> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("Meeting name must not be empty"));
    }

    let id = Uuid::new_v4().to_string();
    let db = state.db.clone();
    {
        let id = id.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock();
            if AgentRepository::get(&conn, &req.agent_id)?.is_none() {
                anyhow::bail!("Unknown agent: {}", req.agent_id);
            }
            MeetingRepository::insert(
                &conn,
                &NewMeeting {
                    id,
                    owner_user_id: req.owner_user_id,
                    agent_id: req.agent_id,
                    name: req.name,
                },
            )
        })
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    }

    Ok(Json(json!({ "id": id, "status": "upcoming" })))
}

fn meeting_json(m: &MeetingRecord) -> Value {
    json!({
        "id": m.id,
        "owner_user_id": m.owner_user_id,
        "agent_id": m.agent_id,
        "name": m.name,
        "status": m.status.as_str(),
        "started_at": m.started_at,
        "ended_at": m.ended_at,
        "transcript_url": m.transcript_url,
        "recording_url": m.recording_url,
        "transcript_processed": m.transcript_processed,
        "summary": m.summary,
        "created_at": m.created_at,
        "updated_at": m.updated_at,
    })
}

async fn list_meetings(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Value>> {
    let owner = params
        .get("owner")
        .cloned()
        .ok_or_else(|| ApiError::bad_request("Missing 'owner' query parameter"))?;
    let limit: usize = params
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(50);

    let db = state.db.clone();
    let meetings = tokio::task::spawn_blocking(move || {
        let conn = db.lock();
        MeetingRepository::list_for_owner(&conn, &owner, limit)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    let entries: Vec<Value> = meetings.iter().map(meeting_json).collect();
    Ok(Json(json!({ "meetings": entries })))
}

async fn get_meeting(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Value>> {
    let db = state.db.clone();
    let meeting = tokio::task::spawn_blocking(move || {
        let conn = db.lock();
        MeetingRepository::get(&conn, &id)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    match meeting {
        Some(m) => Ok(Json(meeting_json(&m))),
        None => Err(ApiError::not_found("Meeting not found")),
    }
}

async fn cancel_meeting(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Value>> {
    let db = state.db.clone();
    let cancelled = tokio::task::spawn_blocking(move || {
        let conn = db.lock();
        MeetingRepository::cancel_if_upcoming(&conn, &id)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    // A started meeting cannot be cancelled; the webhook path owns it now
    Ok(Json(json!({ "cancelled": cancelled })))
}
