//! # API Endpoint Handlers
//!
//! Reads take the core's read lock; writes go through [`AppState::transact`],
//! so each request is one core transaction.

use super::{
    AppState, CLIENT_ID_HEADER,
    types::{ApiError, ChildrenQuery, HealthResponse, RelatedQuery, StatusResponse},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use dmx_core::{DmxError, ObjectId, PlayerRef, TopicModel, TypeKind, TypeModel};
use serde_json::Value;

type JsonResult = Result<Json<Value>, ApiError>;

/// The requesting client's push connection, if it named one.
fn origin(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Counts of the objects and types readable to the server.
pub async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let core = state.core.read().await;
    let topic_count = core.all_topics().try_fold(0usize, |n, t| t.map(|_| n.saturating_add(1)))?;
    let assoc_count = core.all_assocs().try_fold(0usize, |n, a| a.map(|_| n.saturating_add(1)))?;
    Ok(Json(StatusResponse {
        topic_count,
        assoc_count,
        topic_type_count: core.get_topic_types().len(),
        assoc_type_count: core.get_assoc_types().len(),
        connections: state.connections.len(),
    }))
}

// =============================================================================
// TOPICS
// =============================================================================

pub async fn get_topic_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(query): Query<ChildrenQuery>,
) -> JsonResult {
    let core = state.core.read().await;
    Ok(Json(core.get_topic(ObjectId(id), query.children)?.to_json()))
}

pub async fn get_topic_by_uri_handler(
    State(state): State<AppState>,
    Path(uri): Path<String>,
    Query(query): Query<ChildrenQuery>,
) -> JsonResult {
    let core = state.core.read().await;
    Ok(Json(core.get_topic_by_uri(&uri, query.children)?.to_json()))
}

pub async fn related_topics_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(query): Query<RelatedQuery>,
) -> JsonResult {
    let core = state.core.read().await;
    let related = core.get_related_topics(PlayerRef::Topic(ObjectId(id)), &query.to_filter())?;
    Ok(Json(Value::Array(related.iter().map(|r| r.to_json()).collect())))
}

pub async fn topics_by_type_handler(State(state): State<AppState>, Path(type_uri): Path<String>) -> JsonResult {
    let core = state.core.read().await;
    let topics = core.get_topics_by_type(&type_uri)?;
    Ok(Json(Value::Array(topics.iter().map(TopicModel::to_json).collect())))
}

pub async fn create_topic_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let topic = TopicModel::from_json(&body)?;
    let origin = origin(&headers);
    let topic = state
        .transact("create topic", origin.as_deref(), |core, ctx| core.create_topic(ctx, topic))
        .await?;
    Ok((StatusCode::CREATED, Json(topic.to_json())))
}

/// The body's `id`, if present, must match the path.
pub async fn update_topic_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> JsonResult {
    let obj = body
        .as_object_mut()
        .ok_or_else(|| DmxError::SerializationError("topic must be a JSON object".to_string()))?;
    match obj.get("id").and_then(Value::as_u64) {
        Some(body_id) if body_id != id => {
            return Err(DmxError::InvalidState(format!(
                "body id {} doesn't match path id {}",
                body_id, id
            ))
            .into());
        }
        _ => {
            obj.insert("id".into(), id.into());
        }
    }
    let update = TopicModel::from_json(&body)?;
    let origin = origin(&headers);
    let topic = state
        .transact("update topic", origin.as_deref(), |core, ctx| core.update_topic(ctx, update))
        .await?;
    Ok(Json(topic.to_json()))
}

pub async fn delete_topic_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> JsonResult {
    let origin = origin(&headers);
    let topic = state
        .transact("delete topic", origin.as_deref(), |core, ctx| core.delete_topic(ctx, ObjectId(id)))
        .await?;
    Ok(Json(topic.to_json()))
}

// =============================================================================
// ASSOCIATIONS
// =============================================================================

pub async fn get_assoc_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(query): Query<ChildrenQuery>,
) -> JsonResult {
    let core = state.core.read().await;
    Ok(Json(core.get_assoc(ObjectId(id), query.children)?.to_json()))
}

// =============================================================================
// TYPES
// =============================================================================

pub async fn topic_type_handler(State(state): State<AppState>, Path(uri): Path<String>) -> JsonResult {
    let core = state.core.read().await;
    Ok(Json(core.get_topic_type(&uri)?.to_json()))
}

pub async fn assoc_type_handler(State(state): State<AppState>, Path(uri): Path<String>) -> JsonResult {
    let core = state.core.read().await;
    Ok(Json(core.get_assoc_type(&uri)?.to_json()))
}

/// Create a topic type or association type, as told by the body's `typeUri`.
pub async fn create_type_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let model = TypeModel::from_json(&body)?;
    let origin = origin(&headers);
    let view = state
        .transact("create type", origin.as_deref(), |core, ctx| match model.type_kind() {
            TypeKind::TopicType => core.create_topic_type(ctx, model),
            TypeKind::AssocType => core.create_assoc_type(ctx, model),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(view.to_json())))
}
