//! News-path scenarios: impact assessment along connection paths, service
//! degradation and reprocess mode.

mod common;

use common::{harness_with, ScriptedLlm};
use docgraph::news::NewsRecord;
use docgraph::store::{BlobStore, TABLE_NEWS};

const ARTICLE: &str = "\n<date>2024-03-01</date>\n<title>Chip recall</title>\n<text>AMD recalls a faulty chip line.</text>\n<url>https://news.example/amd</url>\n";

fn amd_entities() -> String {
    serde_json::json!([{
        "NAME": "AMD",
        "LABEL": "COMPANY",
        "INDUSTRY": "SEMICONDUCTORS",
        "SENTIMENT": "NEGATIVE",
        "SENTIMENT_EXPLANATION": "PRODUCT RECALL",
        "RELATIONSHIPS": []
    }])
    .to_string()
}

async fn seed_interested_amd(harness: &common::Harness) {
    let id = harness
        .access
        .get_or_create_id(
            "COMPANY",
            "ADVANCED MICRO DEVICES",
            &[("INDUSTRY".to_string(), "SEMICONDUCTORS".to_string())],
            &[],
        )
        .await
        .unwrap();
    harness.access.update_interested(&id, "YES").await.unwrap();
}

async fn enqueue_article(harness: &common::Harness, key: &str) {
    harness
        .blob
        .put("news", key, ARTICLE.as_bytes().to_vec())
        .await
        .unwrap();
    let body = serde_json::json!({
        "Records": [{ "s3": { "bucket": { "name": "news" }, "object": { "key": key } } }]
    })
    .to_string();
    harness.news_queue.send(body, None);
}

fn stored_records(harness: &common::Harness) -> Vec<NewsRecord> {
    harness
        .store
        .table(TABLE_NEWS)
        .scan()
        .into_iter()
        .filter_map(|(_, v)| serde_json::from_value(v).ok())
        .collect()
}

#[tokio::test]
async fn article_connecting_to_interested_entity_is_enriched() {
    let llm = ScriptedLlm {
        news_entities_json: amd_entities(),
        impact: "NEGATIVE".to_string(),
        ..Default::default()
    };
    let harness = harness_with(llm);
    seed_interested_amd(&harness).await;
    enqueue_article(&harness, "inbox/amd_recall.txt").await;

    assert!(harness.news.poll_once().await.unwrap());

    let records = stored_records(&harness);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.interested, "YES");
    assert_eq!(
        record.interested_entities,
        vec!["ADVANCED MICRO DEVICES".to_string()]
    );
    assert_eq!(record.title, "Chip recall");
    assert_eq!(record.paths.len(), 1);
    assert_eq!(record.paths[0].name, "AMD");
    assert_eq!(record.paths[0].sentiment, "NEGATIVE");
    assert_eq!(record.paths[0].paths[0].impact, "NEGATIVE");
    assert_eq!(
        record.paths[0].paths[0].interested_entity,
        "ADVANCED MICRO DEVICES"
    );

    // Source blob removed, message acked.
    assert!(harness.blob.get("news", "inbox/amd_recall.txt").await.is_err());
    assert_eq!(harness.news_queue.pending(), 0);

    let progress = harness.orchestrator.progress().list();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].status, "completed");
}

#[tokio::test]
async fn unconnected_article_is_persisted_without_paths() {
    let llm = ScriptedLlm {
        news_entities_json: amd_entities(),
        ..Default::default()
    };
    // No interested vertex in the graph at all.
    let harness = harness_with(llm);
    enqueue_article(&harness, "inbox/amd_recall.txt").await;

    harness.news.poll_once().await.unwrap();

    let records = stored_records(&harness);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].interested, "NO");
    assert!(records[0].paths.is_empty());
    assert!(records[0].interested_entities.is_empty());
}

#[tokio::test]
async fn model_outage_degrades_instead_of_failing() {
    let llm = ScriptedLlm {
        news_entities_json: amd_entities(),
        ..Default::default()
    };
    // Three 503s exhaust the bounded extraction retries.
    llm.failures_remaining
        .store(3, std::sync::atomic::Ordering::SeqCst);
    let harness = harness_with(llm);
    seed_interested_amd(&harness).await;
    enqueue_article(&harness, "inbox/amd_recall.txt").await;

    harness.news.poll_once().await.unwrap();

    // The article still lands, just with reduced richness.
    let records = stored_records(&harness);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].interested, "NO");
    assert!(records[0].paths.is_empty());
    assert_eq!(harness.news_queue.pending(), 0);
}

#[tokio::test]
async fn reprocess_mode_rebuilds_from_stored_record() {
    let llm = ScriptedLlm {
        news_entities_json: amd_entities(),
        ..Default::default()
    };
    let harness = harness_with(llm);
    seed_interested_amd(&harness).await;

    let original = NewsRecord {
        id: "news-1".to_string(),
        date: "2024-03-01".to_string(),
        title: "Chip recall".to_string(),
        text: "AMD recalls a faulty chip line.".to_string(),
        url: "https://news.example/amd".to_string(),
        timestamp: "2024-03-01 10:00".to_string(),
        interested: "NO".to_string(),
        paths: vec![],
        interested_entities: vec![],
        hide_news: None,
    };
    harness
        .store
        .table(TABLE_NEWS)
        .put("news-1", &original, None)
        .unwrap();

    harness.news_queue.send("news-1", None);
    harness.news.poll_once().await.unwrap();

    let records = stored_records(&harness);
    assert_eq!(records.len(), 1);
    assert_ne!(records[0].id, "news-1");
    assert_eq!(records[0].interested, "YES");
    assert_eq!(records[0].title, "Chip recall");
}

#[tokio::test]
async fn test_events_are_acked_silently() {
    let harness = harness_with(ScriptedLlm::default());
    harness
        .news_queue
        .send(r#"{"Event":"notification:TestEvent"}"#, None);
    assert!(harness.news.poll_once().await.unwrap());
    assert_eq!(harness.news_queue.pending(), 0);
    assert!(stored_records(&harness).is_empty());
}

#[tokio::test]
async fn generated_articles_flow_through_the_news_path() {
    let harness = harness_with(ScriptedLlm::default());
    seed_interested_amd(&harness).await;

    let generator = docgraph::news::NewsGenerator::new(
        harness.gateway.clone(),
        harness.access.clone(),
        harness.blob.clone(),
        harness.news_queue.clone(),
        "news",
    );
    let keys = generator.generate(3).await.unwrap();
    assert_eq!(keys.len(), 3);
    assert_eq!(harness.news_queue.pending(), 3);

    for key in &keys {
        let bytes = harness.blob.get("news", key).await.unwrap();
        let article = String::from_utf8(bytes).unwrap();
        assert!(article.contains("FICTIONAL NEWS FOR TESTING PURPOSES ONLY"));
        assert!(article.contains("<title>"));
    }

    while harness.news.poll_once().await.unwrap() {}
    assert_eq!(stored_records(&harness).len(), 3);
    // processed article blobs are cleaned up
    for key in &keys {
        assert!(harness.blob.get("news", key).await.is_err());
    }
}

#[tokio::test]
async fn missing_reprocess_id_is_acked() {
    let harness = harness_with(ScriptedLlm::default());
    harness.news_queue.send("no-such-id", None);
    assert!(harness.news.poll_once().await.unwrap());
    assert_eq!(harness.news_queue.pending(), 0);
}
