//! End-to-end tests for dataset imports against a mock bulk-data server.

mod common;

use cardkeep_server::catalog_store::CatalogStore;
use cardkeep_server::import::{trigger_initial_import, ImportError, STATUS_FAILED, STATUS_SUCCESS};
use cardkeep_server::jobs::{JobLedger, JobStatus};
use cardkeep_server::settings::{keys, SettingsStore};
use common::{card_json, set_json, FeedServer, Harness};
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn cards(n: usize) -> Vec<serde_json::Value> {
    (1..=n)
        .map(|i| card_json(&format!("card-{}", i), &format!("Card {}", i)))
        .collect()
}

#[tokio::test]
async fn test_card_import_success() {
    let feed = FeedServer::spawn(cards(25), vec![]).await;
    let harness = Harness::new(&feed);

    let job = harness.cards.create_import_job().unwrap();
    let summary = harness
        .cards
        .download_and_import(CancellationToken::new(), job.id)
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 25);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.batches, 3);
    assert_eq!(harness.catalog_store.count_cards().unwrap(), 25);

    let stored = harness.catalog_store.get_card("card-7").unwrap().unwrap();
    assert_eq!(stored.record.name, "Card 7");
    assert_eq!(stored.record.price_usd.as_deref(), Some("0.10"));

    let job = harness.ledger().get(job.id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.error.is_none());
    assert_eq!(job.metadata["phase"], "completed");
    assert_eq!(job.metadata["succeeded"], 25);
    assert_eq!(
        harness
            .settings()
            .get(&keys::last_update_status("card_data"), ""),
        STATUS_SUCCESS
    );
    assert!(harness
        .settings()
        .get_time(&keys::last_update("card_data"))
        .is_some());
}

#[tokio::test]
async fn test_reimport_is_idempotent() {
    let feed = FeedServer::spawn(cards(12), vec![]).await;
    let harness = Harness::new(&feed);

    for _ in 0..2 {
        let job = harness.cards.create_import_job().unwrap();
        harness
            .cards
            .download_and_import(CancellationToken::new(), job.id)
            .await
            .unwrap();
    }
    assert_eq!(harness.catalog_store.count_cards().unwrap(), 12);
}

#[tokio::test]
async fn test_too_many_bad_records_fails_but_keeps_good_rows() {
    let mut records = cards(3);
    records.extend((0..7).map(|i| json!({ "id": format!("bad-{}", i) })));
    let feed = FeedServer::spawn(records, vec![]).await;
    let harness = Harness::new(&feed);

    let job = harness.cards.create_import_job().unwrap();
    let result = harness
        .cards
        .download_and_import(CancellationToken::new(), job.id)
        .await;

    assert!(matches!(result, Err(ImportError::ThresholdExceeded { .. })));
    assert_eq!(harness.catalog_store.count_cards().unwrap(), 3);

    let job = harness.ledger().get(job.id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("exceeds threshold"));
    assert_eq!(job.metadata["failed"], 7);
    assert_eq!(
        harness
            .settings()
            .get(&keys::last_update_status("card_data"), ""),
        STATUS_FAILED
    );
    assert!(harness
        .settings()
        .get_time(&keys::last_update("card_data"))
        .is_none());
}

#[tokio::test]
async fn test_http_error_fails_job() {
    let feed = FeedServer::spawn(cards(3), vec![]).await;
    let harness = Harness::new(&feed);
    harness
        .settings()
        .set(&keys::dataset_type("card_data"), "broken_cards")
        .unwrap();

    let job = harness.cards.create_import_job().unwrap();
    let result = harness
        .cards
        .download_and_import(CancellationToken::new(), job.id)
        .await;

    assert!(matches!(
        result,
        Err(ImportError::HttpStatus { status: 500, .. })
    ));
    let job = harness.ledger().get(job.id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("500"));
    assert_eq!(harness.catalog_store.count_cards().unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_dataset_type_fails_job() {
    let feed = FeedServer::spawn(cards(3), vec![]).await;
    let harness = Harness::new(&feed);
    harness
        .settings()
        .set(&keys::dataset_type("card_data"), "oracle_cards")
        .unwrap();

    let job = harness.cards.create_import_job().unwrap();
    let result = harness
        .cards
        .download_and_import(CancellationToken::new(), job.id)
        .await;

    assert!(matches!(result, Err(ImportError::DatasetNotFound(_))));
    let job = harness.ledger().get(job.id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
}

#[tokio::test]
async fn test_cancellation_mid_stream_fails_job() {
    let feed = FeedServer::spawn(vec![], vec![]).await;
    let harness = Harness::with_batch_size(&feed, 5);
    harness
        .settings()
        .set(&keys::dataset_type("card_data"), "slow_cards")
        .unwrap();

    let job = harness.cards.create_import_job().unwrap();
    let token = CancellationToken::new();
    let importer = harness.cards.clone();
    let run_token = token.clone();
    let job_id = job.id;
    let run = tokio::spawn(async move { importer.download_and_import(run_token, job_id).await });

    tokio::time::sleep(Duration::from_millis(400)).await;
    token.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("import did not stop after cancellation")
        .unwrap();
    assert!(matches!(result, Err(ImportError::Cancelled)));

    let job = harness.ledger().get(job.id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.completed_at.is_some());
    // whatever was committed before cancelling stays
    let committed = harness.catalog_store.count_cards().unwrap();
    assert!(committed > 0);
    assert_eq!(committed % 5, 0);
}

#[tokio::test]
async fn test_set_import_downloads_icons() {
    let feed = FeedServer::spawn(
        vec![],
        vec![set_json("abc", "Alpha Beta"), set_json("xyz", "Ex Why")],
    )
    .await;
    let harness = Harness::new(&feed);

    let job = harness.sets.create_import_job().unwrap();
    let summary = harness
        .sets
        .download_and_import(CancellationToken::new(), job.id)
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(feed.icon_requests(), 2);
    let icon = harness.assets_dir.join("sets").join("abc.svg");
    assert!(icon.exists());
    assert!(std::fs::read_to_string(&icon).unwrap().contains("<svg"));

    let stored = harness.catalog_store.get_set("abc").unwrap().unwrap();
    assert_eq!(stored.record.name, "Alpha Beta");
    assert_eq!(
        stored.icon_path.as_deref(),
        Some(icon.to_string_lossy().as_ref())
    );

    // icons already on disk are not fetched again
    let job = harness.sets.create_import_job().unwrap();
    harness
        .sets
        .download_and_import(CancellationToken::new(), job.id)
        .await
        .unwrap();
    assert_eq!(feed.icon_requests(), 2);
}

#[tokio::test]
async fn test_initial_import_only_when_empty() {
    let feed = FeedServer::spawn(cards(4), vec![]).await;
    let harness = Harness::new(&feed);

    let job_id = trigger_initial_import(harness.cards.clone(), CancellationToken::new())
        .unwrap()
        .expect("empty catalog should trigger an import");

    let mut status = JobStatus::Pending;
    for _ in 0..100 {
        status = harness.ledger().get(job_id).unwrap().unwrap().status;
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, JobStatus::Completed);
    assert_eq!(harness.catalog_store.count_cards().unwrap(), 4);

    let again = trigger_initial_import(harness.cards.clone(), CancellationToken::new()).unwrap();
    assert_eq!(again, None);
}
