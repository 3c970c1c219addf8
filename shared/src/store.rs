//! In-memory case collections kept coherent with the case API.
//!
//! All state sits behind one lock that is never held across an `.await`:
//! every remote call completes first, then the result is committed in a
//! single write. Observers therefore never see a case in both the live and
//! archived lists, or in neither, and a failed call leaves state untouched.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use tracing::{debug, info, instrument, warn};

use crate::capabilities::{Capabilities, Navigator};
use crate::case::CaseHandle;
use crate::config::StoreConfig;
use crate::error::{AppError, AppResult, ErrorKind};
use crate::gateway::CaseGateway;
use crate::model::{
    filter_cases, Case, CaseNo, CloneOptions, ClonePayload, CreateCasePayload, NewCase,
    UnixTimeMs,
};
use crate::score::{LastScore, ScoreData};

#[derive(Debug, Default)]
struct StoreState {
    all_cases: Vec<Case>,
    archived: Vec<Case>,
    sorted: Vec<Case>,
    selected_case_no: Option<CaseNo>,
    bootstrapped: bool,
}

impl StoreState {
    fn live_index(&self, case_no: CaseNo) -> Option<usize> {
        self.all_cases.iter().position(|c| c.case_no == case_no)
    }

    fn archived_index(&self, case_no: CaseNo) -> Option<usize> {
        self.archived.iter().position(|c| c.case_no == case_no)
    }

    fn live(&self, case_no: CaseNo) -> Option<&Case> {
        self.all_cases.iter().find(|c| c.case_no == case_no)
    }

    fn find(&self, case_no: CaseNo) -> Option<&Case> {
        self.live(case_no)
            .or_else(|| self.archived.iter().find(|c| c.case_no == case_no))
    }

    fn find_mut(&mut self, case_no: CaseNo) -> Option<&mut Case> {
        self.all_cases
            .iter_mut()
            .chain(self.archived.iter_mut())
            .find(|c| c.case_no == case_no)
    }

    /// Inserts or replaces a live case, pulling it out of the archive.
    fn upsert_live(&mut self, case: Case) {
        if let Some(i) = self.archived_index(case.case_no) {
            self.archived.remove(i);
        }
        match self.live_index(case.case_no) {
            Some(i) => self.all_cases[i] = case,
            None => self.all_cases.push(case),
        }
    }

    /// Moves a case into the archive, dropping it from every live view.
    fn archive(&mut self, case: Case) {
        let case_no = case.case_no;
        self.all_cases.retain(|c| c.case_no != case_no);
        self.sorted.retain(|c| c.case_no != case_no);
        if self.selected_case_no == Some(case_no) {
            self.selected_case_no = None;
        }
        match self.archived_index(case_no) {
            Some(i) => self.archived[i] = case,
            None => self.archived.push(case),
        }
    }

    fn replace_live(&mut self, all_cases: Vec<Case>, sorted: Vec<Case>) {
        let all_cases = dedup_by_case_no(all_cases);
        self.archived
            .retain(|a| !all_cases.iter().any(|c| c.case_no == a.case_no));
        self.all_cases = all_cases;
        self.sorted = sorted;
        if let Some(selected) = self.selected_case_no {
            if self.live(selected).is_none() {
                debug!(%selected, "selected case dropped by reconciliation");
                self.selected_case_no = None;
            }
        }
    }

    /// The server's archive list wins over a stale live entry.
    fn replace_archived(&mut self, archived: Vec<Case>) {
        let archived = dedup_by_case_no(archived);
        let numbers: HashSet<CaseNo> = archived.iter().map(|c| c.case_no).collect();
        self.all_cases.retain(|c| !numbers.contains(&c.case_no));
        self.sorted.retain(|c| !numbers.contains(&c.case_no));
        if self
            .selected_case_no
            .is_some_and(|n| numbers.contains(&n))
        {
            self.selected_case_no = None;
        }
        self.archived = archived;
    }

    fn rename(&mut self, case_no: CaseNo, new_name: &str) {
        for case in self
            .all_cases
            .iter_mut()
            .chain(self.archived.iter_mut())
            .chain(self.sorted.iter_mut())
            .filter(|c| c.case_no == case_no)
        {
            case.case_name = new_name.to_string();
        }
    }
}

fn dedup_by_case_no(cases: Vec<Case>) -> Vec<Case> {
    let mut seen = HashSet::new();
    let before = cases.len();
    let unique: Vec<Case> = cases.into_iter().filter(|c| seen.insert(c.case_no)).collect();
    if unique.len() != before {
        warn!(
            dropped = before - unique.len(),
            "server list contained duplicate case numbers"
        );
    }
    unique
}

pub(crate) struct StoreInner {
    gateway: CaseGateway,
    navigation: Arc<dyn Navigator>,
    config: StoreConfig,
    state: RwLock<StoreState>,
}

impl StoreInner {
    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Session-scoped case store. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CaseStore {
    inner: Arc<StoreInner>,
}

impl CaseStore {
    pub fn new(capabilities: Capabilities, config: StoreConfig) -> AppResult<Self> {
        config.validate()?;
        let gateway = CaseGateway::new(capabilities.http, &config);
        Ok(Self {
            inner: Arc::new(StoreInner {
                gateway,
                navigation: capabilities.navigation,
                config,
                state: RwLock::new(StoreState::default()),
            }),
        })
    }

    pub(crate) fn from_inner(inner: Arc<StoreInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<StoreInner> {
        Arc::downgrade(&self.inner)
    }

    fn handle(&self, case_no: CaseNo) -> CaseHandle {
        CaseHandle::new(case_no, self.downgrade())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.inner.read().bootstrapped
    }

    // ------------------------------------------------------------------
    // Bootstrap and reconciliation
    // ------------------------------------------------------------------

    /// Loads the live list and the dropdown list concurrently. Nothing is
    /// committed unless both succeed.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> AppResult<()> {
        let (all_cases, sorted) = self.fetch_live_and_dropdown().await?;

        let mut state = self.inner.write();
        state.replace_live(all_cases, sorted);
        state.bootstrapped = true;
        info!(
            live = state.all_cases.len(),
            dropdown = state.sorted.len(),
            "case store bootstrapped"
        );
        Ok(())
    }

    /// Replaces the live and dropdown lists with fresh server copies.
    #[instrument(skip(self))]
    pub async fn refetch_cases(&self) -> AppResult<()> {
        let (all_cases, sorted) = self.fetch_live_and_dropdown().await?;

        let mut state = self.inner.write();
        state.replace_live(all_cases, sorted);
        info!(live = state.all_cases.len(), "case lists refetched");
        Ok(())
    }

    async fn fetch_live_and_dropdown(&self) -> AppResult<(Vec<Case>, Vec<Case>)> {
        let gateway = &self.inner.gateway;
        tokio::try_join!(gateway.list_cases(), gateway.dropdown_cases())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn all_cases(&self) -> Vec<Case> {
        self.inner.read().all_cases.clone()
    }

    pub fn archived(&self) -> Vec<Case> {
        self.inner.read().archived.clone()
    }

    /// Dropdown view, most recently viewed first.
    pub fn sorted(&self) -> Vec<Case> {
        self.inner.read().sorted.clone()
    }

    /// Live case with this number. `None` for anything not live, including `0`.
    pub fn get_case_by_no(&self, case_no: CaseNo) -> Option<CaseHandle> {
        let found = self.inner.read().live(case_no).is_some();
        found.then(|| self.handle(case_no))
    }

    /// Snapshot of the live case with this number.
    pub fn case_by_no(&self, case_no: CaseNo) -> Option<Case> {
        self.inner.read().live(case_no).cloned()
    }

    pub fn get_archived_case_by_no(&self, case_no: CaseNo) -> Option<CaseHandle> {
        let found = self.inner.read().archived_index(case_no).is_some();
        found.then(|| self.handle(case_no))
    }

    pub(crate) fn find_case(&self, case_no: CaseNo) -> Option<Case> {
        self.inner.read().find(case_no).cloned()
    }

    pub(crate) fn is_archived(&self, case_no: CaseNo) -> bool {
        self.inner.read().archived_index(case_no).is_some()
    }

    pub fn filter_cases(cases: &[Case], owned: bool) -> Vec<Case> {
        filter_cases(cases, owned)
    }

    /// Replaces the archive with the server's current list.
    #[instrument(skip(self))]
    pub async fn fetch_archived(&self) -> AppResult<Vec<Case>> {
        let archived = self.inner.gateway.list_archived().await?;

        let mut state = self.inner.write();
        state.replace_archived(archived);
        info!(archived = state.archived.len(), "archived cases fetched");
        Ok(state.archived.clone())
    }

    /// Replaces the dropdown view, keeping the server's order.
    #[instrument(skip(self))]
    pub async fn fetch_dropdown_cases(&self) -> AppResult<Vec<Case>> {
        let sorted = self.inner.gateway.dropdown_cases().await?;

        let mut state = self.inner.write();
        state.sorted = sorted;
        debug!(dropdown = state.sorted.len(), "dropdown cases fetched");
        Ok(state.sorted.clone())
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    #[instrument(skip(self, new_case))]
    pub async fn create_case(&self, new_case: NewCase) -> AppResult<CaseHandle> {
        let NewCase {
            name,
            queries,
            tries,
        } = new_case;
        let case_name = match name {
            Some(name) => name,
            None => {
                let live = self.inner.read().all_cases.len();
                self.inner.config.placeholder_case_name(live)
            }
        };
        let payload = CreateCasePayload {
            case_name,
            queries,
            tries,
        };

        let created = self.inner.gateway.create_case(&payload).await?;
        let case = created.into_case_with(&payload.case_name, true);
        let case_no = case.case_no;

        self.inner.write().upsert_live(case);
        info!(%case_no, "case created");
        Ok(self.handle(case_no))
    }

    #[instrument(skip(self, new_name), fields(case_no = %case_no))]
    pub async fn rename_case(&self, case_no: CaseNo, new_name: &str) -> AppResult<()> {
        if self.find_case(case_no).is_none() {
            return Err(AppError::case_not_found(case_no));
        }

        self.inner.gateway.rename_case(case_no, new_name).await?;

        self.inner.write().rename(case_no, new_name);
        info!("case renamed");
        Ok(())
    }

    /// Deletes the case, then reloads the live and dropdown lists instead of
    /// splicing locally. Both lists and the selection change in one commit.
    #[instrument(skip(self), fields(case_no = %case_no))]
    pub async fn delete_case(&self, case_no: CaseNo) -> AppResult<()> {
        self.inner.gateway.delete_case(case_no).await?;
        let (all_cases, sorted) = self.fetch_live_and_dropdown().await?;

        let mut state = self.inner.write();
        state.replace_live(all_cases, sorted);
        state.archived.retain(|c| c.case_no != case_no);
        if state.selected_case_no == Some(case_no) {
            state.selected_case_no = None;
        }
        info!(live = state.all_cases.len(), "case deleted and lists reconciled");
        Ok(())
    }

    /// Restores an archived case. Safe to run for many cases at once; each
    /// call only moves its own entry.
    #[instrument(skip(self), fields(case_no = %case_no))]
    pub async fn undelete_case(&self, case_no: CaseNo) -> AppResult<CaseHandle> {
        let archived = self
            .inner
            .read()
            .archived
            .iter()
            .find(|c| c.case_no == case_no)
            .cloned()
            .ok_or_else(|| AppError::case_not_found(case_no))?;

        let restored = self.inner.gateway.set_archived(case_no, false).await?;
        let case = match restored {
            Some(wire) if wire.case_no == case_no => wire.into_case_over(&archived),
            Some(wire) => {
                warn!(returned = %wire.case_no, "restore answered for a different case");
                archived
            }
            None => archived,
        };

        let mut state = self.inner.write();
        state.upsert_live(case);
        info!(
            live = state.all_cases.len(),
            archived = state.archived.len(),
            "case restored"
        );
        Ok(self.handle(case_no))
    }

    #[instrument(skip(self), fields(case_no = %case_no))]
    pub async fn archive_case(&self, case_no: CaseNo) -> AppResult<()> {
        let live = self
            .case_by_no(case_no)
            .ok_or_else(|| AppError::case_not_found(case_no))?;

        let returned = self.inner.gateway.set_archived(case_no, true).await?;
        let case = match returned {
            Some(wire) if wire.case_no == case_no => wire.into_case_over(&live),
            _ => live,
        };

        let mut state = self.inner.write();
        state.archive(case);
        info!(archived = state.archived.len(), "case archived");
        Ok(())
    }

    /// Clones a case server-side. The source case is left as it is.
    #[instrument(skip(self, options), fields(case_no = %case_no))]
    pub async fn clone_case(&self, case_no: CaseNo, options: CloneOptions) -> AppResult<CaseHandle> {
        let source_name = self
            .find_case(case_no)
            .map(|c| c.case_name)
            .unwrap_or_default();

        let cloned = self
            .inner
            .gateway
            .clone_case(&ClonePayload::new(case_no, options))
            .await?;
        let case = cloned.into_case_with(&source_name, true);
        let new_case_no = case.case_no;

        if new_case_no == case_no {
            warn!("clone response reused the source case number; ignoring it");
            return Err(AppError::new(
                ErrorKind::Conflict,
                format!("clone of case {case_no} came back with the same number"),
            ));
        }

        self.inner.write().upsert_live(case);
        info!(%new_case_no, "case cloned");
        Ok(self.handle(new_case_no))
    }

    // ------------------------------------------------------------------
    // Scores and recency
    // ------------------------------------------------------------------

    /// Records a score against `data.case_id`. Returns `Ok(None)` without a
    /// request when there is nothing to record.
    #[instrument(skip(self, data), fields(case_no = %data.case_id))]
    pub async fn track_last_score(&self, data: ScoreData) -> AppResult<Option<LastScore>> {
        if data.is_empty() {
            debug!("skipping empty score");
            return Ok(None);
        }

        let data = data.normalized();
        let case_no = data.case_id;
        let echoed = self.inner.gateway.put_score(&data).await?;
        let last_score = match echoed {
            Some(score) => score.normalized(),
            None => data.into_last_score(),
        };

        let mut state = self.inner.write();
        match state.live_index(case_no) {
            Some(i) => state.all_cases[i].last_score = Some(last_score.clone()),
            None => warn!("scored case is not in the live list"),
        }
        Ok(Some(last_score))
    }

    /// Loads the stored score for a case and keeps it as returned.
    #[instrument(skip(self), fields(case_no = %case_no))]
    pub async fn fetch_case_score(&self, case_no: CaseNo) -> AppResult<Option<LastScore>> {
        let score = self.inner.gateway.fetch_score(case_no).await?;

        if let Some(case) = self.inner.write().find_mut(case_no) {
            case.last_score.clone_from(&score);
        }
        Ok(score)
    }

    /// Tells the server the case was just viewed. Local order is not touched;
    /// the next [`fetch_dropdown_cases`](Self::fetch_dropdown_cases) picks it up.
    #[instrument(skip(self), fields(case_no = %case_no))]
    pub async fn track_last_viewed_at(&self, case_no: CaseNo) -> AppResult<()> {
        self.inner
            .gateway
            .update_metadata(case_no, UnixTimeMs::now())
            .await
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Selects a live case. An unknown number goes to the navigator's
    /// not-found hook and the previous selection stays.
    pub fn select_case(&self, case_no: CaseNo) -> bool {
        let selected = {
            let mut state = self.inner.write();
            let exists = state.live(case_no).is_some();
            if exists {
                state.selected_case_no = Some(case_no);
            }
            exists
        };

        if selected {
            debug!(%case_no, "case selected");
        } else {
            debug!(%case_no, "selection target not found");
            self.inner.navigation.not_found();
        }
        selected
    }

    pub fn selected_case_no(&self) -> Option<CaseNo> {
        self.inner.read().selected_case_no
    }

    /// The selected case, if it is still live.
    pub fn selected_case(&self) -> Option<CaseHandle> {
        let case_no = {
            let state = self.inner.read();
            state
                .selected_case_no
                .filter(|n| state.live(*n).is_some())
        };
        case_no.map(|n| self.handle(n))
    }

    pub fn clear_selection(&self) {
        self.inner.write().selected_case_no = None;
    }
}

impl std::fmt::Debug for CaseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.read();
        f.debug_struct("CaseStore")
            .field("live", &state.all_cases.len())
            .field("archived", &state.archived.len())
            .field("sorted", &state.sorted.len())
            .field("selected_case_no", &state.selected_case_no)
            .finish_non_exhaustive()
    }
}
