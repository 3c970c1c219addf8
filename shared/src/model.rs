use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::score::LastScore;

/// Server-assigned case number. Never generated client-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseNo(pub u64);

impl CaseNo {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CaseNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CaseNo {
    fn from(n: u64) -> Self {
        Self(n)
    }
}

/// Explicit timestamp unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    #[must_use]
    pub fn now() -> Self {
        let ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self(ms)
    }
}

/// A search-tuning project as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Case {
    #[serde(rename = "caseNo")]
    pub case_no: CaseNo,
    pub case_name: String,
    #[serde(rename = "lastTry")]
    pub last_try: u64,
    pub owned: bool,
    #[serde(rename = "lastScore", skip_serializing_if = "Option::is_none")]
    pub last_score: Option<LastScore>,
    #[serde(rename = "lastViewedAt", skip_serializing_if = "Option::is_none")]
    pub last_viewed_at: Option<String>,
}

impl Case {
    pub fn new(case_no: CaseNo, case_name: impl Into<String>) -> Self {
        Self {
            case_no,
            case_name: case_name.into(),
            last_try: 0,
            owned: true,
            last_score: None,
            last_viewed_at: None,
        }
    }
}

/// Case as the API sends it. Lists omit fields freely and older endpoints
/// still say `last_try_number`, so everything but the number is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct WireCase {
    #[serde(rename = "caseNo")]
    pub case_no: CaseNo,
    #[serde(default)]
    pub case_name: Option<String>,
    #[serde(default, rename = "lastTry", alias = "last_try_number")]
    pub last_try: Option<u64>,
    #[serde(default)]
    pub owned: Option<bool>,
    #[serde(default, rename = "lastScore", alias = "last_score")]
    pub last_score: Option<LastScore>,
    #[serde(default, rename = "lastViewedAt", alias = "last_viewed_at")]
    pub last_viewed_at: Option<String>,
}

impl WireCase {
    /// Hydrates a listed case; absent flags read as "not owned, no tries".
    #[must_use]
    pub fn into_case(self) -> Case {
        self.into_case_with("", false)
    }

    /// Hydrates a case the current user just produced (create/clone/restore),
    /// filling gaps in the response from what the client sent.
    #[must_use]
    pub fn into_case_with(self, fallback_name: &str, owned_default: bool) -> Case {
        Case {
            case_no: self.case_no,
            case_name: self
                .case_name
                .unwrap_or_else(|| fallback_name.to_string()),
            last_try: self.last_try.unwrap_or(0),
            owned: self.owned.unwrap_or(owned_default),
            last_score: self.last_score,
            last_viewed_at: self.last_viewed_at,
        }
    }

    /// Server view of a case we already hold; fields the response leaves
    /// out keep the local values.
    #[must_use]
    pub fn into_case_over(self, base: &Case) -> Case {
        Case {
            case_no: self.case_no,
            case_name: self.case_name.unwrap_or_else(|| base.case_name.clone()),
            last_try: self.last_try.unwrap_or(base.last_try),
            owned: self.owned.unwrap_or(base.owned),
            last_score: self.last_score.or_else(|| base.last_score.clone()),
            last_viewed_at: self.last_viewed_at.or_else(|| base.last_viewed_at.clone()),
        }
    }
}

/// `{allCases: [...]}` envelope shared by the list endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaseList {
    #[serde(rename = "allCases", default)]
    pub all_cases: Vec<WireCase>,
}

impl CaseList {
    #[must_use]
    pub fn into_cases(self) -> Vec<Case> {
        self.all_cases.into_iter().map(WireCase::into_case).collect()
    }
}

/// Arguments for creating a case. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewCase {
    pub name: Option<String>,
    pub queries: Option<Value>,
    pub tries: Option<Value>,
}

impl NewCase {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_queries(mut self, queries: Value) -> Self {
        self.queries = Some(queries);
        self
    }

    #[must_use]
    pub fn with_tries(mut self, tries: Value) -> Self {
        self.tries = Some(tries);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateCasePayload {
    pub case_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queries: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tries: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenamePayload<'a> {
    pub case_name: &'a str,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ArchivePayload {
    pub archived: bool,
}

/// How much of the source case a clone carries over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneOptions {
    /// Try to clone from; the server picks the latest when `None`.
    pub try_number: Option<u64>,
    pub preserve_history: bool,
    pub clone_queries: bool,
    pub clone_ratings: bool,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            try_number: None,
            preserve_history: false,
            clone_queries: true,
            clone_ratings: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClonePayload {
    pub case_id: CaseNo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub try_number: Option<u64>,
    pub preserve_history: bool,
    pub clone_queries: bool,
    pub clone_ratings: bool,
}

impl ClonePayload {
    #[must_use]
    pub fn new(case_id: CaseNo, options: CloneOptions) -> Self {
        Self {
            case_id,
            try_number: options.try_number,
            preserve_history: options.preserve_history,
            clone_queries: options.clone_queries,
            clone_ratings: options.clone_ratings,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetadataPayload {
    pub metadata: ViewMetadata,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ViewMetadata {
    pub last_viewed_at: UnixTimeMs,
}

impl MetadataPayload {
    #[must_use]
    pub fn viewed_at(at: UnixTimeMs) -> Self {
        Self {
            metadata: ViewMetadata { last_viewed_at: at },
        }
    }
}

/// Cases whose `owned` flag equals `owned`, in their original order.
#[must_use]
pub fn filter_cases(cases: &[Case], owned: bool) -> Vec<Case> {
    cases.iter().filter(|c| c.owned == owned).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn wire_case_reads_camel_and_snake_fields() {
        let wire: WireCase = serde_json::from_value(json!({
            "caseNo": 1,
            "case_name": "test case",
            "lastTry": 4,
            "owned": true
        }))
        .unwrap();
        let case = wire.into_case();
        assert_eq!(case.case_no, CaseNo(1));
        assert_eq!(case.case_name, "test case");
        assert_eq!(case.last_try, 4);
        assert!(case.owned);
        assert!(case.last_score.is_none());
    }

    #[test]
    fn wire_case_accepts_last_try_number() {
        let wire: WireCase = serde_json::from_value(json!({
            "caseNo": 6,
            "case_name": "archived",
            "last_try_number": 4
        }))
        .unwrap();
        let case = wire.into_case();
        assert_eq!(case.last_try, 4);
        assert!(!case.owned);
    }

    #[test]
    fn wire_case_requires_case_no() {
        let result: Result<WireCase, _> = serde_json::from_value(json!({"case_name": "x"}));
        assert!(result.is_err());
    }

    #[test]
    fn into_case_with_fills_gaps() {
        let wire: WireCase = serde_json::from_value(json!({"caseNo": 5, "lastTry": 1})).unwrap();
        let case = wire.into_case_with("Case 4", true);
        assert_eq!(case.case_name, "Case 4");
        assert!(case.owned);
        assert_eq!(case.last_try, 1);
    }

    #[test]
    fn into_case_over_keeps_local_fields() {
        let mut base = Case::new(CaseNo(6), "archived");
        base.last_try = 4;
        base.owned = false;
        let wire: WireCase =
            serde_json::from_value(json!({"caseNo": 6, "case_name": "restored"})).unwrap();
        let case = wire.into_case_over(&base);
        assert_eq!(case.case_name, "restored");
        assert_eq!(case.last_try, 4);
        assert!(!case.owned);
    }

    #[test]
    fn case_list_missing_envelope_is_empty() {
        let list: CaseList = serde_json::from_value(json!({})).unwrap();
        assert!(list.into_cases().is_empty());
    }

    #[test]
    fn case_serializes_with_api_names() {
        let value = serde_json::to_value(Case::new(CaseNo(3), "c")).unwrap();
        assert_eq!(value["caseNo"], 3);
        assert_eq!(value["case_name"], "c");
        assert_eq!(value["lastTry"], 0);
        assert!(value.get("lastScore").is_none());
    }

    #[test]
    fn create_payload_omits_absent_fields() {
        let payload = CreateCasePayload {
            case_name: "El Case-o-dilla".into(),
            queries: None,
            tries: Some(json!([{"searchUrl": "foo"}])),
        };
        let value = serde_json::to_value(payload).unwrap();
        assert_eq!(value["case_name"], "El Case-o-dilla");
        assert!(value.get("queries").is_none());
        assert_eq!(value["tries"][0]["searchUrl"], "foo");
    }

    #[test]
    fn clone_payload_defaults() {
        let value = serde_json::to_value(ClonePayload::new(CaseNo(1), CloneOptions::default()))
            .unwrap();
        assert_eq!(
            value,
            json!({
                "case_id": 1,
                "preserve_history": false,
                "clone_queries": true,
                "clone_ratings": true
            })
        );
    }

    #[test]
    fn metadata_payload_shape() {
        let value = serde_json::to_value(MetadataPayload::viewed_at(UnixTimeMs(42))).unwrap();
        assert_eq!(value, json!({"metadata": {"last_viewed_at": 42}}));
    }

    #[test]
    fn filter_keeps_order() {
        let mut cases = vec![
            Case::new(CaseNo(1), "test case"),
            Case::new(CaseNo(2), "test case 2"),
            Case::new(CaseNo(3), "test case 3"),
            Case::new(CaseNo(4), "test case 4"),
        ];
        cases[2].owned = false;
        cases[3].owned = false;

        let owned = filter_cases(&cases, true);
        assert_eq!(owned.len(), 2);
        assert_eq!(owned[0].case_name, "test case");

        let shared = filter_cases(&cases, false);
        assert_eq!(shared.len(), 2);
        assert_eq!(shared[0].case_name, "test case 3");
    }

    proptest! {
        #[test]
        fn filter_partitions_cases(flags in proptest::collection::vec(any::<bool>(), 0..40)) {
            let cases: Vec<Case> = flags
                .iter()
                .enumerate()
                .map(|(i, owned)| {
                    let mut c = Case::new(CaseNo(i as u64 + 1), format!("case {i}"));
                    c.owned = *owned;
                    c
                })
                .collect();

            let owned = filter_cases(&cases, true);
            let shared = filter_cases(&cases, false);
            prop_assert_eq!(owned.len() + shared.len(), cases.len());
            prop_assert!(owned.iter().all(|c| c.owned));
            prop_assert!(shared.iter().all(|c| !c.owned));

            // Input numbers ascend, so each half keeps input order iff its
            // numbers still ascend.
            prop_assert!(owned.windows(2).all(|w| w[0].case_no < w[1].case_no));
            prop_assert!(shared.windows(2).all(|w| w[0].case_no < w[1].case_no));

            // Merging the two halves back by case number restores the input.
            let mut merged: Vec<Case> = owned.into_iter().chain(shared).collect();
            merged.sort_by_key(|c| c.case_no);
            prop_assert_eq!(merged, cases);
        }
    }
}
