use case_core::capabilities::testing::mock_capabilities;
use case_core::capabilities::HttpMethod;
use case_core::{CaseEntity, CaseNo, CaseStore, CloneOptions, ErrorKind, NewCase, StoreConfig};
use serde_json::json;

fn listed() -> serde_json::Value {
    json!({"allCases": [
        {"caseNo": 1, "case_name": "test case", "lastTry": 4, "owned": true},
        {"caseNo": 2, "case_name": "one more test case", "lastTry": 1, "owned": true},
        {"caseNo": 3, "case_name": "shared case", "lastTry": 2, "owned": false}
    ]})
}

#[tokio::test]
async fn full_session_from_bootstrap_to_delete() {
    let (caps, http, nav) = mock_capabilities();
    let store = CaseStore::new(caps, StoreConfig::default()).unwrap();

    // 1. Bootstrap
    http.expect(HttpMethod::Get, "/api/cases", 200, listed());
    http.expect(
        HttpMethod::Get,
        "/api/dropdown/cases",
        200,
        json!({"allCases": [{"caseNo": 2, "case_name": "one more test case"}]}),
    );
    store.bootstrap().await.unwrap();
    assert_eq!(store.all_cases().len(), 3);

    let owned = CaseStore::filter_cases(&store.all_cases(), true);
    assert_eq!(owned.len(), 2);

    // 2. Select and view; routing stays with the shell
    assert!(store.select_case(CaseNo(3)));
    assert!(nav.navigations().is_empty());
    http.expect(HttpMethod::Put, "/api/cases/3/metadata", 200, json!({}));
    store
        .selected_case()
        .unwrap()
        .track_last_viewed_at()
        .await
        .unwrap();

    // 3. Create
    http.expect(
        HttpMethod::Post,
        "/api/cases",
        200,
        json!({"lastTry": 1, "caseNo": 5, "case_name": "new case"}),
    );
    let created = store.create_case(NewCase::named("new case")).await.unwrap();
    assert_eq!(created.case_no(), CaseNo(5));
    assert_eq!(store.all_cases().len(), 4);

    // 4. Rename
    http.expect(HttpMethod::Put, "/api/cases/5", 200, json!({}));
    created.rename("renamed case").await.unwrap();
    assert_eq!(
        store.case_by_no(CaseNo(5)).unwrap().case_name,
        "renamed case"
    );

    // 5. Clone
    http.expect(
        HttpMethod::Post,
        "/api/clone/cases",
        200,
        json!({"caseNo": 6, "case_name": "Clone: renamed case", "lastTry": 0, "owned": true}),
    );
    let clone = created.clone_case(CloneOptions::default()).await.unwrap();
    assert_eq!(clone.case_name().unwrap(), "Clone: renamed case");
    assert_eq!(created.case_name().unwrap(), "renamed case");

    // 6. Delete the selected case; the server's lists are authoritative
    http.expect(HttpMethod::Delete, "/api/cases/3", 200, json!(null));
    http.expect(HttpMethod::Get, "/api/cases", 200, json!({"allCases": []}));
    http.expect(HttpMethod::Get, "/api/dropdown/cases", 200, json!({"allCases": []}));
    store.delete_case(CaseNo(3)).await.unwrap();

    assert!(store.all_cases().is_empty());
    assert!(store.selected_case().is_none());
    assert_eq!(nav.not_found_calls(), 0);
    http.verify_no_outstanding_expectation();
}

#[tokio::test]
async fn selecting_missing_case_before_bootstrap_reports_not_found() {
    let (caps, _http, nav) = mock_capabilities();
    let store = CaseStore::new(caps, StoreConfig::default()).unwrap();

    assert!(!store.is_bootstrapped());
    assert!(!store.select_case(CaseNo(1)));
    assert_eq!(nav.not_found_calls(), 1);
}

#[tokio::test]
async fn server_rejection_surfaces_message() {
    let (caps, http, _) = mock_capabilities();
    let store = CaseStore::new(caps, StoreConfig::default()).unwrap();
    http.expect(
        HttpMethod::Post,
        "/api/cases",
        422,
        json!({"message": "Case name is too long"}),
    );

    let err = store
        .create_case(NewCase::named("x".repeat(500)))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.message, "Case name is too long");
    assert!(store.all_cases().is_empty());
}
