//! Request handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

use crate::graph::GraphAccess;
use crate::news::NewsRecord;
use crate::pipeline::progress::ProgressTracker;
use crate::pipeline::queue::WorkQueue;
use crate::store::{KvTable, Settings};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub progress: ProgressTracker,
    pub access: Arc<GraphAccess>,
    pub settings: Settings,
    pub news_queue: Arc<WorkQueue>,
    pub news_table: KvTable,
}

/// GET /status — all progress records, most recent first, with derived
/// percentage and status label.
pub async fn get_status(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let data = state.progress.list();
    (
        StatusCode::OK,
        Json(json!({ "success": true, "data": data })),
    )
}

/// DELETE /status — clear every progress record.
pub async fn delete_status(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let deleted = state.progress.clear();
    let message = if deleted == 0 {
        "No records to delete".to_string()
    } else {
        format!("Successfully deleted {deleted} processing records")
    };
    (
        StatusCode::OK,
        Json(json!({ "success": true, "message": message, "deleted_count": deleted })),
    )
}

/// GET /entities — every vertex with its INTERESTED flag.
pub async fn get_entities(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.access.get_entities().await {
        Ok(entities) => (StatusCode::OK, Json(json!(entities))),
        Err(e) => {
            error!("entities listing failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

#[derive(Deserialize)]
pub struct UpdateInterestedRequest {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "INTERESTED")]
    pub interested: String,
}

/// POST /entities — update one vertex's INTERESTED flag.
pub async fn update_entity(
    State(state): State<AppState>,
    Json(request): Json<UpdateInterestedRequest>,
) -> (StatusCode, Json<Value>) {
    match state
        .access
        .update_interested(&request.id, &request.interested)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "message": "INTERESTED flag updated successfully" })),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("Invalid request body - {e}") })),
        ),
    }
}

/// GET /n — the news-path hop radius.
pub async fn get_n(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "N": state.settings.get_n() })))
}

#[derive(Deserialize)]
pub struct UpdateNRequest {
    #[serde(rename = "N")]
    pub n: u32,
}

/// POST /n — update the hop radius.
pub async fn set_n(
    State(state): State<AppState>,
    Json(request): Json<UpdateNRequest>,
) -> (StatusCode, Json<Value>) {
    state.settings.set_n(request.n);
    (
        StatusCode::OK,
        Json(json!({ "message": "N value updated successfully" })),
    )
}

/// DELETE /entities — drop the whole graph. Destructive.
pub async fn purge_entities(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.access.purge().await {
        Ok((0, 0)) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "No entities or relationships to purge",
                "deleted_vertices": 0,
                "deleted_edges": 0,
            })),
        ),
        Ok((vertices, edges)) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Successfully purged all entities and relationships from knowledge graph",
                "deleted_vertices": vertices,
                "deleted_edges": edges,
            })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": format!("Failed to purge entities: {e}") })),
        ),
    }
}

/// GET /news — processed news records, hidden (in-flight reprocess) ones
/// excluded.
pub async fn get_news(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let mut records: Vec<NewsRecord> = state
        .news_table
        .scan()
        .into_iter()
        .filter_map(|(_, value)| serde_json::from_value(value).ok())
        .filter(|record: &NewsRecord| record.hide_news.as_deref() != Some("TRUE"))
        .collect();
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    (StatusCode::OK, Json(json!(records)))
}

/// DELETE /news — remove every stored news record.
pub async fn purge_news(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let deleted = state.news_table.clear();
    (
        StatusCode::OK,
        Json(json!({ "success": true, "deleted_count": deleted })),
    )
}

#[derive(Deserialize, Default)]
pub struct ReprocessNewsRequest {
    #[serde(default)]
    pub id: Option<String>,
}

/// POST /reprocess-news — enqueue one news id (or every stored record) for
/// reprocessing, hiding the records while they are in flight.
pub async fn reprocess_news(
    State(state): State<AppState>,
    Json(request): Json<ReprocessNewsRequest>,
) -> (StatusCode, Json<Value>) {
    match request.id {
        Some(id) => {
            let Ok(mut record) = state.news_table.get_typed::<NewsRecord>(&id) else {
                return (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "error": "News item not found" })),
                );
            };
            state.news_queue.send(id.clone(), None);
            record.hide_news = Some("TRUE".to_string());
            let _ = state.news_table.put(&id, &record, None);
            (
                StatusCode::OK,
                Json(json!({ "message": format!("News item {id} queued for reprocessing") })),
            )
        }
        None => {
            let mut queued = 0usize;
            for (id, value) in state.news_table.scan() {
                state.news_queue.send(id.clone(), None);
                if let Ok(mut record) = serde_json::from_value::<NewsRecord>(value) {
                    record.hide_news = Some("TRUE".to_string());
                    let _ = state.news_table.put(&id, &record, None);
                }
                queued += 1;
            }
            (
                StatusCode::OK,
                Json(json!({ "message": format!("All {queued} news items queued for reprocessing") })),
            )
        }
    }
}
