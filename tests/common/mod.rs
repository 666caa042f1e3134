//! Job store scenarios shared by every backend's integration tests.

#![allow(dead_code)]

use serde_json::json;
use styling_jobs::scheduler::{EnrichmentJobStatus, Job, JobStore, JobStoreError};

pub async fn lower_priority_pops_first(store: &dyn JobStore) {
    store.enqueue_enrichment("P2", 100).await.unwrap();
    store.enqueue_enrichment("P1", 50).await.unwrap();

    assert_eq!(store.next_job().await.unwrap(), Some(Job::enrich("P1")));
    assert_eq!(store.next_job().await.unwrap(), Some(Job::enrich("P2")));
    assert_eq!(store.next_job().await.unwrap(), None);
}

pub async fn negative_priority_jumps_the_queue(store: &dyn JobStore) {
    store.enqueue_enrichment("P0", 0).await.unwrap();
    store.enqueue_enrichment("P50", 50).await.unwrap();
    store.enqueue_enrichment("Pneg", -1).await.unwrap();

    assert_eq!(store.next_enrichment_job().await.unwrap().as_deref(), Some("Pneg"));
    assert_eq!(store.next_enrichment_job().await.unwrap().as_deref(), Some("P0"));
    assert_eq!(store.next_enrichment_job().await.unwrap().as_deref(), Some("P50"));
}

pub async fn ties_follow_insertion_order(store: &dyn JobStore) {
    for id in ["Pc", "Pa", "Pb"] {
        store.enqueue_enrichment(id, 100).await.unwrap();
    }

    let mut popped = Vec::new();
    while let Some(id) = store.next_enrichment_job().await.unwrap() {
        popped.push(id);
    }
    assert_eq!(popped, vec!["Pc", "Pa", "Pb"]);
}

pub async fn double_enqueue_keeps_one_entry(store: &dyn JobStore) {
    store.enqueue_enrichment("P1", 100).await.unwrap();
    store.mark_enrichment_processing("P1").await.unwrap();
    store.enqueue_enrichment("P1", 100).await.unwrap();

    assert_eq!(store.enrichment_stats().await.pending, 1);
    assert_eq!(store.enrichment_attempts("P1").await.unwrap(), 0);
    assert_eq!(
        store.enrichment_status("P1").await.unwrap(),
        EnrichmentJobStatus::Pending
    );
}

/// A failure with attempts equal to the cap is still retryable; only the
/// claim past the cap is terminal. Run against a store capped at 3.
pub async fn failure_at_cap_is_retryable_past_cap_is_terminal(store: &dyn JobStore) {
    store.enqueue_enrichment("P1", 100).await.unwrap();
    store.next_enrichment_job().await.unwrap();

    for expected in 1..=3 {
        assert_eq!(
            store.mark_enrichment_processing("P1").await.unwrap(),
            expected
        );
    }
    assert_eq!(store.enrichment_attempts("P1").await.unwrap(), 3);
    assert!(store.mark_enrichment_failed("P1", "x").await.unwrap());

    store.mark_enrichment_processing("P1").await.unwrap();
    assert!(!store.mark_enrichment_failed("P1", "x").await.unwrap());

    // Terminal failures are recorded but never re-queued.
    assert_eq!(store.next_enrichment_job().await.unwrap(), None);
    assert_eq!(
        store.enrichment_status("P1").await.unwrap(),
        EnrichmentJobStatus::Failed
    );
    let failure = store.enrichment_failure("P1").await.unwrap().expect("failure record");
    assert_eq!(failure.error, "x");
    assert_eq!(failure.attempts, 4);
}

pub async fn status_follows_lifecycle(store: &dyn JobStore) {
    assert_eq!(
        store.enrichment_status("P1").await.unwrap(),
        EnrichmentJobStatus::Unknown
    );

    store.enqueue_enrichment("P1", 100).await.unwrap();
    assert_eq!(
        store.enrichment_status("P1").await.unwrap(),
        EnrichmentJobStatus::Pending
    );

    store.next_enrichment_job().await.unwrap();
    store.mark_enrichment_processing("P1").await.unwrap();
    assert_eq!(
        store.enrichment_status("P1").await.unwrap(),
        EnrichmentJobStatus::Processing
    );

    store.mark_enrichment_failed("P1", "boom").await.unwrap();
    assert_eq!(
        store.enrichment_status("P1").await.unwrap(),
        EnrichmentJobStatus::Failed
    );

    store.enqueue_enrichment("P1", 50).await.unwrap();
    assert_eq!(store.enrichment_failure("P1").await.unwrap(), None);
    store.next_enrichment_job().await.unwrap();
    store.mark_enrichment_processing("P1").await.unwrap();
    store.mark_enrichment_completed("P1").await.unwrap();
    assert_eq!(
        store.enrichment_status("P1").await.unwrap(),
        EnrichmentJobStatus::Completed
    );

    // A later run replaces the earlier completion.
    store.enqueue_enrichment("P1", 50).await.unwrap();
    assert_eq!(
        store.enrichment_status("P1").await.unwrap(),
        EnrichmentJobStatus::Pending
    );
    store.next_enrichment_job().await.unwrap();
    store.mark_enrichment_processing("P1").await.unwrap();
    store.mark_enrichment_failed("P1", "boom").await.unwrap();
    assert_eq!(
        store.enrichment_status("P1").await.unwrap(),
        EnrichmentJobStatus::Failed
    );
}

/// Run against a store capped at 2: the third claim's failure is terminal.
pub async fn lower_cap_makes_third_claim_terminal(store: &dyn JobStore) {
    store.enqueue_enrichment("P1", 100).await.unwrap();
    store.next_enrichment_job().await.unwrap();

    assert_eq!(store.mark_enrichment_processing("P1").await.unwrap(), 1);
    assert!(store.mark_enrichment_failed("P1", "x").await.unwrap());
    assert_eq!(store.mark_enrichment_processing("P1").await.unwrap(), 2);
    assert!(store.mark_enrichment_failed("P1", "x").await.unwrap());
    assert_eq!(store.mark_enrichment_processing("P1").await.unwrap(), 3);
    assert!(!store.mark_enrichment_failed("P1", "x").await.unwrap());

    assert_eq!(store.next_enrichment_job().await.unwrap(), None);
    let failure = store.enrichment_failure("P1").await.unwrap().expect("failure record");
    assert_eq!(failure.attempts, 3);
}

pub async fn enrichment_drains_before_sync(store: &dyn JobStore) {
    store.enqueue_sync_shopify("B1", "tok").await.unwrap();
    store.enqueue_enrichment("P1", 100).await.unwrap();
    store.enqueue_enrichment("P2", 100).await.unwrap();

    assert_eq!(store.next_job().await.unwrap(), Some(Job::enrich("P1")));
    assert_eq!(store.next_job().await.unwrap(), Some(Job::enrich("P2")));
    assert_eq!(store.next_job().await.unwrap(), Some(Job::sync("B1", "tok")));
    assert_eq!(store.next_job().await.unwrap(), None);
}

pub async fn sync_job_shape(store: &dyn JobStore) {
    store.enqueue_sync_shopify("B1", "tok").await.unwrap();
    assert_eq!(store.sync_pending().await.unwrap(), 1);

    let job = store.next_job().await.unwrap().expect("sync job");
    assert_eq!(
        serde_json::to_value(&job).unwrap(),
        json!({"kind": "sync-shopify", "payload": {"brandId": "B1", "accessToken": "tok"}})
    );
    assert_eq!(store.sync_pending().await.unwrap(), 0);
}

pub async fn sync_queue_is_fifo_without_dedup(store: &dyn JobStore) {
    store.enqueue_sync_shopify("B1", "a").await.unwrap();
    store.enqueue_sync_shopify("B2", "b").await.unwrap();
    store.enqueue_sync_shopify("B1", "a").await.unwrap();

    assert_eq!(store.next_sync_job().await.unwrap().unwrap().brand_id, "B1");
    assert_eq!(store.next_sync_job().await.unwrap().unwrap().brand_id, "B2");
    assert_eq!(store.next_sync_job().await.unwrap().unwrap().brand_id, "B1");
    assert_eq!(store.next_sync_job().await.unwrap(), None);
}

pub async fn stats_after_mixed_outcomes(store: &dyn JobStore) {
    store.enqueue_enrichment("P1", 100).await.unwrap();
    store.enqueue_enrichment("P2", 100).await.unwrap();

    let first = store.next_enrichment_job().await.unwrap().unwrap();
    store.mark_enrichment_processing(&first).await.unwrap();
    store.mark_enrichment_completed(&first).await.unwrap();

    let second = store.next_enrichment_job().await.unwrap().unwrap();
    store.mark_enrichment_processing(&second).await.unwrap();
    store.mark_enrichment_failed(&second, "bad json").await.unwrap();

    let stats = store.enrichment_stats().await;
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.processing, 0);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 1);
}

pub async fn placeholder_ids_are_rejected(store: &dyn JobStore) {
    for bad in ["", "   ", "undefined", "null"] {
        let err = store.enqueue_enrichment(bad, 100).await.unwrap_err();
        assert!(matches!(err, JobStoreError::InvalidProductId(_)), "{bad:?}");

        let err = store.enqueue_sync_shopify(bad, "tok").await.unwrap_err();
        assert!(matches!(err, JobStoreError::InvalidBrandId(_)), "{bad:?}");
    }
    assert_eq!(store.enrichment_stats().await.pending, 0);
    assert_eq!(store.sync_pending().await.unwrap(), 0);
}
