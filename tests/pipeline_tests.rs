//! End-to-end document ingestion scenarios over the scripted model and the
//! in-process graph.

mod common;

use common::{enqueue_document, harness_on_graph, harness_with, ScriptedLlm};
use docgraph::graph::{GraphBackend, MemoryGraph};
use docgraph::store::BlobStore;
use std::collections::BTreeMap;
use std::sync::Arc;

#[tokio::test]
async fn ingestion_builds_graph_and_completes_progress() {
    let harness = harness_with(ScriptedLlm::default());
    enqueue_document(&harness, "reports/acme_10K.pdf").await;

    assert!(harness.orchestrator.poll_once().await.unwrap());

    // One COMPANY hub plus the four leaves and the director's association.
    let vertices = harness.backend.all_vertices().await.unwrap();
    let names: Vec<&str> = vertices.iter().map(|v| v.name.as_str()).collect();
    assert!(names.contains(&"ACME CORP"));
    assert!(names.contains(&"GLOBEX"));
    assert!(names.contains(&"INITRODE"));
    assert!(names.contains(&"INITECH"));
    assert!(names.contains(&"JANE DOE"));
    assert!(names.contains(&"UMBRELLA"));
    assert_eq!(vertices.len(), 6);

    let jane = vertices.iter().find(|v| v.name == "JANE DOE").unwrap();
    assert_eq!(jane.label, "PERSON");

    let edges = harness.backend.all_edges().await.unwrap();
    let labels: Vec<&str> = edges.iter().map(|e| e.label.as_str()).collect();
    assert!(labels.contains(&"is a customer of"));
    assert!(labels.contains(&"is a supplier/partner of"));
    assert!(labels.contains(&"is a competitor of"));
    assert!(labels.contains(&"is a director of"));
    assert!(labels.contains(&"is an employee/director of"));
    assert_eq!(edges.len(), 5);

    let customer_edge = edges.iter().find(|e| e.label == "is a customer of").unwrap();
    assert_eq!(customer_edge.properties["PRODUCTS_USED"], "WIDGET CLOUD");

    // Progress reached 4/4 and the message and blob are gone.
    let progress = harness.orchestrator.progress().list();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].status, "completed");
    assert_eq!(progress[0].progress_percentage, 100);
    assert_eq!(harness.document_queue.pending(), 0);
    assert!(harness
        .blob
        .get("documents", "reports/acme_10K.pdf")
        .await
        .is_err());
}

#[tokio::test]
async fn hallucinated_records_never_reach_the_graph() {
    // The extraction includes "the team"; the filter keeps only GLOBEX.
    let harness = harness_with(ScriptedLlm::default());
    enqueue_document(&harness, "reports/acme_10K.pdf").await;
    harness.orchestrator.poll_once().await.unwrap();

    let vertices = harness.backend.all_vertices().await.unwrap();
    assert!(vertices.iter().all(|v| v.name != "THE TEAM"));
    assert!(vertices.iter().all(|v| v.name != "the team"));
}

#[tokio::test]
async fn reingesting_the_same_document_changes_nothing() {
    let harness = harness_with(ScriptedLlm::default());
    enqueue_document(&harness, "reports/acme_10K.pdf").await;
    harness.orchestrator.poll_once().await.unwrap();

    let vertices_before = harness.backend.all_vertices().await.unwrap();
    let edges_before = harness.backend.all_edges().await.unwrap();

    // Same blob arrives again (content dedup only suppresses while the
    // first message is still pending, so a fresh send goes through).
    enqueue_document(&harness, "reports/acme_10K.pdf").await;
    harness.orchestrator.poll_once().await.unwrap();

    let vertices_after = harness.backend.all_vertices().await.unwrap();
    let edges_after = harness.backend.all_edges().await.unwrap();

    assert_eq!(vertices_before.len(), vertices_after.len());
    assert_eq!(edges_before.len(), edges_after.len());

    let props_by_name = |views: &[docgraph::graph::VertexView]| -> BTreeMap<String, BTreeMap<String, String>> {
        views
            .iter()
            .map(|v| (v.name.clone(), v.properties.clone()))
            .collect()
    };
    assert_eq!(props_by_name(&vertices_before), props_by_name(&vertices_after));

    let edge_props: Vec<_> = edges_before.iter().map(|e| &e.properties).collect();
    let edge_props_after: Vec<_> = edges_after.iter().map(|e| &e.properties).collect();
    assert_eq!(edge_props, edge_props_after);
}

#[tokio::test]
async fn failing_step_returns_message_and_marks_progress() {
    let harness = harness_with(ScriptedLlm::default());
    // No blob stored: the chunk step fails on every retry.
    let body = serde_json::json!({ "S3_BUCKET": "documents", "S3_KEY": "missing.pdf" }).to_string();
    harness
        .document_queue
        .send(body, Some(docgraph::pipeline::queue::GROUP_INGESTION));

    assert!(harness.orchestrator.poll_once().await.unwrap());

    // The failure branch reset visibility, so the message is deliverable
    // again immediately.
    assert_eq!(harness.document_queue.pending(), 1);
    let redelivered = harness.document_queue.receive().unwrap();
    assert_eq!(redelivered.receive_count, 2);

    let progress = harness.orchestrator.progress().list();
    assert_eq!(progress.len(), 1);
    assert!(progress[0].record.error_message.is_some());
    assert!(!progress[0].record.datetime_ended.is_empty());
}

#[tokio::test]
async fn second_failure_dead_letters_the_message() {
    let harness = harness_with(ScriptedLlm::default());
    let body = serde_json::json!({ "S3_BUCKET": "documents", "S3_KEY": "missing.pdf" }).to_string();
    harness
        .document_queue
        .send(body.clone(), Some(docgraph::pipeline::queue::GROUP_INGESTION));

    // Two failed executions exhaust the receive budget.
    harness.orchestrator.poll_once().await.unwrap();
    harness.orchestrator.poll_once().await.unwrap();

    assert!(!harness.orchestrator.poll_once().await.unwrap());
    assert_eq!(harness.document_queue.dead_letters(), vec![body]);
}

#[tokio::test]
async fn unrecognized_messages_are_acked_silently() {
    let harness = harness_with(ScriptedLlm::default());
    harness.document_queue.send("not json at all", None);
    assert!(harness.orchestrator.poll_once().await.unwrap());
    assert_eq!(harness.document_queue.pending(), 0);
    assert!(harness.orchestrator.progress().list().is_empty());
}

#[tokio::test]
async fn concurrent_documents_may_duplicate_a_new_entity() {
    // Two workers ingest two documents that both mention GLOBEX, racing on
    // its first creation. One or two GLOBEX vertices are both acceptable;
    // merging is eventual.
    let backend = Arc::new(MemoryGraph::new());
    let first = harness_on_graph(ScriptedLlm::default(), backend.clone());

    let second_summary = serde_json::json!({
        "MAIN_ENTITY": {
            "NAME": "ZENITH PLC",
            "ATTRIBUTES": [{ "INDUSTRY": "LOGISTICS" }]
        }
    })
    .to_string();
    let second_llm = ScriptedLlm {
        summary_json: second_summary,
        ..Default::default()
    };
    let second = harness_on_graph(second_llm, backend.clone());

    enqueue_document(&first, "reports/acme_10K.pdf").await;
    enqueue_document(&second, "reports/zenith_annual.pdf").await;

    let (a, b) = tokio::join!(first.orchestrator.poll_once(), second.orchestrator.poll_once());
    assert!(a.unwrap());
    assert!(b.unwrap());

    let globex_count = backend
        .all_vertices()
        .await
        .unwrap()
        .iter()
        .filter(|v| v.name == "GLOBEX")
        .count();
    assert!((1..=2).contains(&globex_count), "got {globex_count}");
}
