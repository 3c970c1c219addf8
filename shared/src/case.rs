//! Handles onto cases held by a [`CaseStore`].
//!
//! A handle is a case number plus a weak link to its store. Reads always go
//! through the store, so every handle for the same case sees the same data;
//! once the store is gone every operation fails with `InvalidState`.

use std::sync::Weak;

use crate::error::{AppError, AppResult};
use crate::model::{Case, CaseNo, CloneOptions};
use crate::score::LastScore;
use crate::store::{CaseStore, StoreInner};

/// Per-case operations. Each one delegates to the owning store.
#[async_trait::async_trait]
pub trait CaseEntity: Send + Sync {
    fn case_no(&self) -> CaseNo;

    async fn rename(&self, new_name: &str) -> AppResult<()>;

    async fn clone_case(&self, options: CloneOptions) -> AppResult<CaseHandle>;

    async fn delete(&self) -> AppResult<()>;

    /// Undelete. Only valid while the case is archived.
    async fn restore(&self) -> AppResult<CaseHandle>;

    async fn archive(&self) -> AppResult<()>;

    async fn fetch_case_score(&self) -> AppResult<Option<LastScore>>;

    async fn track_last_viewed_at(&self) -> AppResult<()>;
}

#[derive(Clone)]
pub struct CaseHandle {
    case_no: CaseNo,
    store: Weak<StoreInner>,
}

impl CaseHandle {
    pub(crate) fn new(case_no: CaseNo, store: Weak<StoreInner>) -> Self {
        Self { case_no, store }
    }

    fn store(&self) -> AppResult<CaseStore> {
        self.store
            .upgrade()
            .map(CaseStore::from_inner)
            .ok_or_else(AppError::store_dropped)
    }

    /// Current copy of the case, live or archived.
    pub fn snapshot(&self) -> AppResult<Case> {
        self.store()?
            .find_case(self.case_no)
            .ok_or_else(|| AppError::case_not_found(self.case_no))
    }

    pub fn case_name(&self) -> AppResult<String> {
        Ok(self.snapshot()?.case_name)
    }

    pub fn last_try(&self) -> AppResult<u64> {
        Ok(self.snapshot()?.last_try)
    }

    pub fn owned(&self) -> AppResult<bool> {
        Ok(self.snapshot()?.owned)
    }

    pub fn last_score(&self) -> AppResult<Option<LastScore>> {
        Ok(self.snapshot()?.last_score)
    }

    /// `false` when the store is gone.
    pub fn is_archived(&self) -> bool {
        self.store()
            .map(|store| store.is_archived(self.case_no))
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl CaseEntity for CaseHandle {
    fn case_no(&self) -> CaseNo {
        self.case_no
    }

    async fn rename(&self, new_name: &str) -> AppResult<()> {
        self.store()?.rename_case(self.case_no, new_name).await
    }

    async fn clone_case(&self, options: CloneOptions) -> AppResult<CaseHandle> {
        self.store()?.clone_case(self.case_no, options).await
    }

    async fn delete(&self) -> AppResult<()> {
        self.store()?.delete_case(self.case_no).await
    }

    async fn restore(&self) -> AppResult<CaseHandle> {
        self.store()?.undelete_case(self.case_no).await
    }

    async fn archive(&self) -> AppResult<()> {
        self.store()?.archive_case(self.case_no).await
    }

    async fn fetch_case_score(&self) -> AppResult<Option<LastScore>> {
        self.store()?.fetch_case_score(self.case_no).await
    }

    async fn track_last_viewed_at(&self) -> AppResult<()> {
        self.store()?.track_last_viewed_at(self.case_no).await
    }
}

impl PartialEq for CaseHandle {
    fn eq(&self, other: &Self) -> bool {
        self.case_no == other.case_no && self.store.ptr_eq(&other.store)
    }
}

impl Eq for CaseHandle {}

impl std::fmt::Debug for CaseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseHandle")
            .field("case_no", &self.case_no)
            .field("attached", &(self.store.strong_count() > 0))
            .finish()
    }
}
