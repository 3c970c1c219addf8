use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::model::CaseNo;

/// Most recent score recorded for a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastScore {
    /// `null` or missing reads as `0`.
    #[serde(default, deserialize_with = "zero_if_null")]
    pub score: f64,
    /// Server timestamp; never filled in client-side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub queries: Map<String, Value>,
    #[serde(default)]
    pub all_rated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<CaseNo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub try_id: Option<u64>,
}

impl LastScore {
    #[must_use]
    pub fn normalized(mut self) -> Self {
        normalize_queries(&mut self.queries);
        self
    }
}

/// A freshly computed score to record against a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreData {
    pub score: f64,
    #[serde(default)]
    pub all_rated: bool,
    pub case_id: CaseNo,
    pub try_id: u64,
    #[serde(default)]
    pub queries: Map<String, Value>,
}

impl ScoreData {
    /// A zero score with no per-query detail carries no information.
    /// A zero score *with* query detail is real data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.score == 0.0 && self.queries.is_empty()
    }

    #[must_use]
    pub fn normalized(mut self) -> Self {
        normalize_queries(&mut self.queries);
        self
    }

    /// The score as it would be stored when the server echoes nothing back.
    #[must_use]
    pub fn into_last_score(self) -> LastScore {
        LastScore {
            score: self.score,
            created_at: None,
            queries: self.queries,
            all_rated: self.all_rated,
            case_id: Some(self.case_id),
            try_id: Some(self.try_id),
        }
        .normalized()
    }
}

fn zero_if_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_default())
}

/// Rewrites `null` per-query scores to `""`. Numbers, including `0`, and
/// structured entries are left untouched.
pub fn normalize_queries(queries: &mut Map<String, Value>) {
    for value in queries.values_mut() {
        if value.is_null() {
            *value = Value::String(String::new());
        }
    }
}
