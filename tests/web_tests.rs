//! Status and curation API behavior, exercised at the handler level.

mod common;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use common::{harness_with, ScriptedLlm};
use docgraph::pipeline::progress::ProgressTracker;
use docgraph::store::{Settings, TABLE_NEWS};
use docgraph::web::handlers::{
    delete_status, get_entities, get_n, get_news, get_status, purge_entities, purge_news,
    reprocess_news, set_n, update_entity, ReprocessNewsRequest, UpdateInterestedRequest,
    UpdateNRequest,
};
use docgraph::web::AppState;

fn app_state(harness: &common::Harness) -> AppState {
    AppState {
        progress: ProgressTracker::new(&harness.store),
        access: harness.access.clone(),
        settings: Settings::new(&harness.store),
        news_queue: harness.news_queue.clone(),
        news_table: harness.store.table(TABLE_NEWS),
    }
}

#[tokio::test]
async fn status_lists_and_clears_records() {
    let harness = harness_with(ScriptedLlm::default());
    let state = app_state(&harness);
    let tracker = ProgressTracker::new(&harness.store);
    let id = tracker.create("acme_10K.pdf", "financial_document", 4).unwrap();
    tracker.increment(&id, false);

    let (code, Json(body)) = get_status(State(state.clone())).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["success"], true);
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["status"], "processing");
    assert_eq!(data[0]["progress_percentage"], 25);

    let (code, Json(body)) = delete_status(State(state.clone())).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["deleted_count"], 1);

    let (_, Json(body)) = get_status(State(state)).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn entities_round_trip_interested_flag() {
    let harness = harness_with(ScriptedLlm::default());
    let state = app_state(&harness);
    let id = harness
        .access
        .get_or_create_id("COMPANY", "ACME", &[], &[])
        .await
        .unwrap();

    let (code, Json(body)) = get_entities(State(state.clone())).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body[0]["NAME"], "ACME");
    assert_eq!(body[0]["INTERESTED"], "NO");

    let (code, _) = update_entity(
        State(state.clone()),
        Json(UpdateInterestedRequest {
            id: id.clone(),
            interested: "YES".to_string(),
        }),
    )
    .await;
    assert_eq!(code, StatusCode::OK);

    let (_, Json(body)) = get_entities(State(state)).await;
    assert_eq!(body[0]["INTERESTED"], "YES");
}

#[tokio::test]
async fn hop_radius_setting_round_trips() {
    let harness = harness_with(ScriptedLlm::default());
    let state = app_state(&harness);

    let (_, Json(body)) = get_n(State(state.clone())).await;
    assert_eq!(body["N"], 2);

    let (code, _) = set_n(State(state.clone()), Json(UpdateNRequest { n: 3 })).await;
    assert_eq!(code, StatusCode::OK);

    let (_, Json(body)) = get_n(State(state)).await;
    assert_eq!(body["N"], 3);
}

#[tokio::test]
async fn purge_entities_reports_deleted_counts() {
    let harness = harness_with(ScriptedLlm::default());
    let state = app_state(&harness);

    let (_, Json(body)) = purge_entities(State(state.clone())).await;
    assert_eq!(body["deleted_vertices"], 0);
    assert_eq!(body["message"], "No entities or relationships to purge");

    let a = harness
        .access
        .get_or_create_id("COMPANY", "ACME", &[], &[])
        .await
        .unwrap();
    let b = harness
        .access
        .get_or_create_id("COMPANY", "GLOBEX", &[], &[])
        .await
        .unwrap();
    harness
        .access
        .add_or_update_edge(&a, "is a customer of", &b, &Default::default())
        .await
        .unwrap();

    let (code, Json(body)) = purge_entities(State(state.clone())).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["deleted_vertices"], 2);
    assert_eq!(body["deleted_edges"], 1);

    let (_, Json(body)) = get_entities(State(state)).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn news_listing_skips_hidden_and_purges() {
    let harness = harness_with(ScriptedLlm::default());
    let state = app_state(&harness);
    let table = harness.store.table(TABLE_NEWS);
    let mut visible = docgraph::news::NewsRecord {
        id: "n1".to_string(),
        date: "2024-01-01".to_string(),
        title: "visible".to_string(),
        text: "x".to_string(),
        url: String::new(),
        timestamp: "2024-01-01 09:00".to_string(),
        interested: "NO".to_string(),
        paths: vec![],
        interested_entities: vec![],
        hide_news: None,
    };
    table.put("n1", &visible, None).unwrap();
    visible.id = "n2".to_string();
    visible.title = "hidden".to_string();
    visible.hide_news = Some("TRUE".to_string());
    table.put("n2", &visible, None).unwrap();

    let (_, Json(body)) = get_news(State(state.clone())).await;
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["title"], "visible");

    let (_, Json(body)) = purge_news(State(state.clone())).await;
    assert_eq!(body["deleted_count"], 2);
    let (_, Json(body)) = get_news(State(state)).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn reprocess_news_enqueues_and_hides() {
    let harness = harness_with(ScriptedLlm::default());
    let state = app_state(&harness);
    let record = docgraph::news::NewsRecord {
        id: "news-1".to_string(),
        date: String::new(),
        title: "t".to_string(),
        text: "x".to_string(),
        url: String::new(),
        timestamp: String::new(),
        interested: "NO".to_string(),
        paths: vec![],
        interested_entities: vec![],
        hide_news: None,
    };
    harness
        .store
        .table(TABLE_NEWS)
        .put("news-1", &record, None)
        .unwrap();

    let (code, _) = reprocess_news(
        State(state.clone()),
        Json(ReprocessNewsRequest {
            id: Some("news-1".to_string()),
        }),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(harness.news_queue.pending(), 1);
    let stored = harness.store.table(TABLE_NEWS).get("news-1").unwrap();
    assert_eq!(stored["hide_news"], "TRUE");

    let (code, _) = reprocess_news(
        State(state),
        Json(ReprocessNewsRequest {
            id: Some("missing".to_string()),
        }),
    )
    .await;
    assert_eq!(code, StatusCode::NOT_FOUND);
}
