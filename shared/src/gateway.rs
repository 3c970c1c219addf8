//! Thin adapter over the case endpoints.
//!
//! Every method is one request. Non-2xx responses and transport failures come
//! back as [`AppError`]; nothing here touches store state.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::capabilities::{ApiPath, HttpRequest, HttpResponse, HttpTransport};
use crate::config::StoreConfig;
use crate::error::{AppError, AppResult};
use crate::model::{
    ArchivePayload, Case, CaseList, CaseNo, ClonePayload, CreateCasePayload, MetadataPayload,
    RenamePayload, UnixTimeMs, WireCase,
};
use crate::score::{LastScore, ScoreData};

#[derive(Clone)]
pub struct CaseGateway {
    http: Arc<dyn HttpTransport>,
    prefix: String,
    timeout_ms: u64,
}

impl CaseGateway {
    pub fn new(http: Arc<dyn HttpTransport>, config: &StoreConfig) -> Self {
        Self {
            http,
            prefix: config.api_prefix.clone(),
            timeout_ms: config.request_timeout_ms,
        }
    }

    /// `GET /cases`
    pub async fn list_cases(&self) -> AppResult<Vec<Case>> {
        let response = self.send(self.get(self.path("/cases")?)?).await?;
        Ok(response.json::<CaseList>()?.into_cases())
    }

    /// `GET /cases?archived=true`
    pub async fn list_archived(&self) -> AppResult<Vec<Case>> {
        let path = self.path("/cases")?.with_query("archived", "true");
        let response = self.send(self.get(path)?).await?;
        Ok(response.json::<CaseList>()?.into_cases())
    }

    /// `GET /dropdown/cases`, already in recency order.
    pub async fn dropdown_cases(&self) -> AppResult<Vec<Case>> {
        let response = self.send(self.get(self.path("/dropdown/cases")?)?).await?;
        Ok(response.json::<CaseList>()?.into_cases())
    }

    /// `POST /cases`
    pub async fn create_case(&self, payload: &CreateCasePayload) -> AppResult<WireCase> {
        let request = self.with_body(HttpRequest::post(self.path("/cases")?), payload)?;
        let response = self.send(request).await?;
        Ok(response.json()?)
    }

    /// `POST /clone/cases`
    pub async fn clone_case(&self, payload: &ClonePayload) -> AppResult<WireCase> {
        let request = self.with_body(HttpRequest::post(self.path("/clone/cases")?), payload)?;
        let response = self.send(request).await?;
        Ok(response.json()?)
    }

    /// `PUT /cases/{n}` with the new name. The response body is ignored.
    pub async fn rename_case(&self, case_no: CaseNo, case_name: &str) -> AppResult<()> {
        let request = self.with_body(
            HttpRequest::put(self.case_path(case_no, "")?),
            &RenamePayload { case_name },
        )?;
        self.send(request).await?;
        Ok(())
    }

    /// `PUT /cases/{n}` toggling the archive flag. Returns the server's view of
    /// the case when it sends one.
    pub async fn set_archived(&self, case_no: CaseNo, archived: bool) -> AppResult<Option<WireCase>> {
        let request = self.with_body(
            HttpRequest::put(self.case_path(case_no, "")?),
            &ArchivePayload { archived },
        )?;
        let response = self.send(request).await?;
        Ok(response.json_opt()?)
    }

    /// `DELETE /cases/{n}`
    pub async fn delete_case(&self, case_no: CaseNo) -> AppResult<()> {
        let request = self.timed(HttpRequest::delete(self.case_path(case_no, "")?))?;
        self.send(request).await?;
        Ok(())
    }

    /// `PUT /cases/{n}/metadata`
    pub async fn update_metadata(&self, case_no: CaseNo, viewed_at: UnixTimeMs) -> AppResult<()> {
        let request = self.with_body(
            HttpRequest::put(self.case_path(case_no, "/metadata")?),
            &MetadataPayload::viewed_at(viewed_at),
        )?;
        self.send(request).await?;
        Ok(())
    }

    /// `GET /cases/{n}/scores`
    pub async fn fetch_score(&self, case_no: CaseNo) -> AppResult<Option<LastScore>> {
        let response = self.send(self.get(self.case_path(case_no, "/scores")?)?).await?;
        Ok(response.json_opt()?)
    }

    /// `PUT /cases/{case_id}/scores`. `None` when the server acknowledges
    /// without echoing a score.
    pub async fn put_score(&self, data: &ScoreData) -> AppResult<Option<LastScore>> {
        let request = self.with_body(
            HttpRequest::put(self.case_path(data.case_id, "/scores")?),
            data,
        )?;
        let response = self.send(request).await?;
        Ok(response.json_opt()?)
    }

    fn path(&self, suffix: &str) -> AppResult<ApiPath> {
        Ok(ApiPath::new(format!("{}{}", self.prefix, suffix))?)
    }

    fn case_path(&self, case_no: CaseNo, suffix: &str) -> AppResult<ApiPath> {
        self.path(&format!("/cases/{case_no}{suffix}"))
    }

    fn get(&self, path: ApiPath) -> AppResult<HttpRequest> {
        self.timed(HttpRequest::get(path))
    }

    fn timed(&self, request: HttpRequest) -> AppResult<HttpRequest> {
        Ok(request.with_timeout_ms(self.timeout_ms)?)
    }

    fn with_body<T: Serialize>(&self, request: HttpRequest, body: &T) -> AppResult<HttpRequest> {
        self.timed(request.with_json(body)?)
    }

    async fn send(&self, request: HttpRequest) -> AppResult<HttpResponse> {
        let method = request.method();
        let path = request.path().to_string();
        let request_id = request.request_id().to_string();

        let result = match self.http.execute(request).await {
            Ok(response) if response.is_success() => Ok(response),
            Ok(response) => Err(AppError::from_http_status(
                response.status(),
                Some(response.body()),
            )
            .with_context("request_id", request_id)),
            Err(e) => Err(AppError::from(e)),
        };

        match result {
            Ok(response) => {
                debug!(%method, %path, status = response.status(), "request succeeded");
                Ok(response)
            }
            Err(e) => {
                warn!(%method, %path, error = %e, "request failed");
                Err(e
                    .with_context("method", method.as_str())
                    .with_context("path", path))
            }
        }
    }
}

impl std::fmt::Debug for CaseGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseGateway")
            .field("prefix", &self.prefix)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}
