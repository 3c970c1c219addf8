use case_core::capabilities::testing::{mock_capabilities, MockTransport};
use case_core::capabilities::HttpMethod;
use case_core::{CaseEntity, CaseNo, CaseStore, ScoreData, StoreConfig};
use serde_json::json;
use std::sync::Arc;

async fn bootstrapped_store() -> (CaseStore, Arc<MockTransport>) {
    let (caps, http, _) = mock_capabilities();
    let store = CaseStore::new(caps, StoreConfig::default()).unwrap();
    http.expect(
        HttpMethod::Get,
        "/api/cases",
        200,
        json!({"allCases": [{"caseNo": 1, "case_name": "test case", "lastTry": 4, "owned": true}]}),
    );
    http.expect(HttpMethod::Get, "/api/dropdown/cases", 200, json!({"allCases": []}));
    store.bootstrap().await.unwrap();
    (store, http)
}

#[tokio::test]
async fn archive_browse_and_restore() {
    let (store, http) = bootstrapped_store().await;

    // 1. Archive the only live case
    http.expect(HttpMethod::Put, "/api/cases/1", 200, json!({}));
    store.get_case_by_no(CaseNo(1)).unwrap().archive().await.unwrap();
    assert!(store.all_cases().is_empty());

    // 2. Server archive list replaces ours
    http.expect(
        HttpMethod::Get,
        "/api/cases?archived=true",
        200,
        json!({"allCases": [
            {"caseNo": 1, "case_name": "test case", "last_try_number": 4},
            {"caseNo": 6, "case_name": "old case", "last_try_number": 2}
        ]}),
    );
    let archived = store.fetch_archived().await.unwrap();
    assert_eq!(archived.len(), 2);

    // 3. Restore one; the other stays archived
    http.expect(
        HttpMethod::Put,
        "/api/cases/6",
        200,
        json!({"caseNo": 6, "case_name": "old case", "lastTry": 2, "owned": true}),
    );
    let restored = store
        .get_archived_case_by_no(CaseNo(6))
        .unwrap()
        .restore()
        .await
        .unwrap();

    assert_eq!(restored.last_try().unwrap(), 2);
    assert_eq!(store.archived().len(), 1);
    assert_eq!(store.all_cases().len(), 1);
    assert!(store.get_case_by_no(CaseNo(1)).is_none());
    http.verify_no_outstanding_expectation();
}

#[tokio::test]
async fn scores_round_trip_through_store() {
    let (store, http) = bootstrapped_store().await;

    let data: ScoreData = serde_json::from_value(json!({
        "score": 90,
        "all_rated": false,
        "case_id": 1,
        "try_id": 4,
        "queries": {"1": 50, "2": 0, "3": null}
    }))
    .unwrap();

    http.expect_matching(
        HttpMethod::Put,
        "/api/cases/1/scores",
        |body| body["queries"]["3"] == "" && body["queries"]["2"] == 0,
        200,
        json!(""),
    );
    let tracked = store.track_last_score(data).await.unwrap().unwrap();
    assert_eq!(tracked.score, 90.0);
    assert!(tracked.created_at.is_none());

    http.expect(
        HttpMethod::Get,
        "/api/cases/1/scores",
        200,
        json!({"score": 90, "created_at": "2026-10-17T09:00:00Z", "queries": {}}),
    );
    let handle = store.get_case_by_no(CaseNo(1)).unwrap();
    let fetched = handle.fetch_case_score().await.unwrap().unwrap();
    assert_eq!(fetched.created_at.as_deref(), Some("2026-10-17T09:00:00Z"));
    assert_eq!(handle.last_score().unwrap(), Some(fetched));
    http.verify_no_outstanding_expectation();
}
