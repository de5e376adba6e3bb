//! Agent CRUD endpoints. Thin plumbing over the repository; owner scoping is
//! a plain `owner_user_id` match.

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

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/agents", post(create_agent).get(list_agents))
        .route(
            "/agents/:id",
            get(get_agent).patch(update_agent).delete(delete_agent),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CreateAgentRequest {
    owner_user_id: String,
    name: String,
    #[serde(default)]
    instructions: String,
}

async fn create_agent(
    State(state): State<ApiState>,
    Json(req): Json<CreateAgentRequest>,
) -> ApiResult<Json<Value>> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("Agent name must not be empty"));
    }

    let id = Uuid::new_v4().to_string();
    let db = state.db.clone();
    {
        let id = id.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock();
            AgentRepository::insert(&conn, &id, &req.owner_user_id, &req.name, &req.instructions)
        })
        .await
        .map_err(|e| ApiError::internal(e.to_string()))??;
    }

    Ok(Json(json!({ "id": id })))
}

async fn list_agents(
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
    let agents = tokio::task::spawn_blocking(move || {
        let conn = db.lock();
        AgentRepository::list_for_owner(&conn, &owner, limit)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    let entries: Vec<Value> = agents
        .iter()
        .map(|a| {
            json!({
                "id": a.id,
                "owner_user_id": a.owner_user_id,
                "name": a.name,
                "instructions": a.instructions,
                "created_at": a.created_at,
            })
        })
        .collect();

    Ok(Json(json!({ "agents": entries })))
}

async fn get_agent(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Value>> {
    let db = state.db.clone();
    let agent = tokio::task::spawn_blocking(move || {
        let conn = db.lock();
        AgentRepository::get(&conn, &id)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    match agent {
        Some(a) => Ok(Json(json!({
            "id": a.id,
            "owner_user_id": a.owner_user_id,
            "name": a.name,
            "instructions": a.instructions,
            "created_at": a.created_at,
            "updated_at": a.updated_at,
        }))),
        None => Err(ApiError::not_found("Agent not found")),
    }
}

#[derive(Debug, Deserialize)]
struct UpdateAgentRequest {
    instructions: String,
}

async fn update_agent(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Json(req): Json<UpdateAgentRequest>,
) -> ApiResult<Json<Value>> {
    let db = state.db.clone();
    let updated = tokio::task::spawn_blocking(move || {
        let conn = db.lock();
        AgentRepository::update_instructions(&conn, &id, &req.instructions)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    if !updated {
        return Err(ApiError::not_found("Agent not found"));
    }
    Ok(Json(json!({ "updated": true })))
}

async fn delete_agent(
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Value>> {
    let owner = params
        .get("owner")
        .cloned()
        .ok_or_else(|| ApiError::bad_request("Missing 'owner' query parameter"))?;

    let db = state.db.clone();
    let deleted = tokio::task::spawn_blocking(move || {
        let conn = db.lock();
        AgentRepository::delete(&conn, &id, &owner)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    if !deleted {
        return Err(ApiError::not_found("Agent not found"));
    }
    Ok(Json(json!({ "deleted": true })))
}
