//! Caller-facing operations.
//!
//! `EvaluationService` is the single entry point transports talk to. It
//! fills in the caller's department from the directory, reads the clock
//! once per request and delegates to the lifecycle controller, the
//! submission engine and the aggregator.

use std::sync::Arc;

use appraisal_state::{
    EvaluationId, EvaluationRecord, EvaluationStatus, EvaluationStore, ResponseRecord,
};
use tracing::{instrument, warn};

use crate::aggregator::{self, RebuildReport};
use crate::clock::{Clock, SystemClock};
use crate::config::{EngineConfig, MAX_PAGE_SIZE};
use crate::directory::UserDirectory;
use crate::domain::{Caller, EvaluationDraft, Result};
use crate::lifecycle::{load_record, LifecycleController};
use crate::submission::{Submission, SubmissionEngine, SubmissionReceipt};
use crate::views::{EvaluationDetail, EvaluationSummary, ListQuery, Page};
use crate::visibility::{self, Access};

/// Evaluation engine over a store `S` and a user directory `D`.
pub struct EvaluationService<S, D> {
    store: S,
    directory: D,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl<S, D> EvaluationService<S, D>
where
    S: EvaluationStore,
    D: UserDirectory,
{
    pub fn new(store: S, directory: D, config: EngineConfig) -> Self {
        Self {
            store,
            directory,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn lifecycle(&self) -> LifecycleController<'_, S, D> {
        LifecycleController::new(&self.store, &self.directory, self.config.weight_policy)
    }

    /// Fill a missing department from the directory.
    async fn resolve_caller(&self, caller: &Caller) -> Result<Caller> {
        let mut resolved = caller.clone();
        if resolved.department.is_none() {
            if let Some(entry) = self.directory.lookup(&caller.id).await? {
                resolved.department = entry.department;
            }
        }
        Ok(resolved)
    }

    /// Open, addressed to the caller, and no response from them yet.
    async fn submittable(
        &self,
        caller: &Caller,
        record: &EvaluationRecord,
        access: Access,
        is_open: bool,
    ) -> Result<bool> {
        if access != Access::Respond || !is_open {
            return Ok(false);
        }
        // Advisory only; the store's unique constraint is what enforces it.
        let existing = self.store.find_response(&record.id, &caller.id).await?;
        Ok(existing.is_none())
    }

    /// Records visible to the caller, filtered and paged, newest first.
    #[instrument(skip(self, caller, query), fields(caller = %caller.id))]
    pub async fn list_evaluations(
        &self,
        caller: &Caller,
        query: &ListQuery,
    ) -> Result<Page<EvaluationSummary>> {
        let caller = self.resolve_caller(caller).await?;
        let records = self.store.list_evaluations(&query.filter).await?;
        let now = self.clock.now();

        let limit = query
            .limit
            .unwrap_or(self.config.page_size)
            .clamp(1, MAX_PAGE_SIZE);
        let page = query.page.unwrap_or(1).max(1);
        let offset = (page as usize - 1) * limit as usize;

        let total = visibility::list_visible(&caller, &records).count() as u64;
        let mut items = Vec::new();
        for record in visibility::list_visible(&caller, &records)
            .skip(offset)
            .take(limit as usize)
        {
            let access = visibility::resolve(&caller, record);
            let is_open = visibility::is_open(record, now);
            let can_submit = self.submittable(&caller, record, access, is_open).await?;
            items.push(EvaluationSummary::new(record, access, is_open, can_submit));
        }

        Ok(Page::new(items, page, limit, total))
    }

    /// One record with its aggregate, if visible to the caller.
    #[instrument(skip(self, caller), fields(caller = %caller.id))]
    pub async fn get_evaluation(
        &self,
        caller: &Caller,
        id: &EvaluationId,
    ) -> Result<EvaluationDetail> {
        let caller = self.resolve_caller(caller).await?;
        let record = load_record(&self.store, id).await?;
        let access = visibility::require_visible(&caller, &record)?;
        let is_open = visibility::is_open(&record, self.clock.now());
        let can_submit = self.submittable(&caller, &record, access, is_open).await?;
        Ok(EvaluationDetail::new(record, access, is_open, can_submit))
    }

    /// Create a draft. Coordinators only.
    #[instrument(skip(self, caller, draft), fields(caller = %caller.id))]
    pub async fn create_evaluation(
        &self,
        caller: &Caller,
        draft: &EvaluationDraft,
    ) -> Result<EvaluationDetail> {
        let caller = self.resolve_caller(caller).await?;
        let record = self.lifecycle().create(&caller, draft, self.clock.now()).await?;
        Ok(EvaluationDetail::new(record, Access::Manage, false, false))
    }

    /// Replace the editable fields of a draft. Coordinators only.
    #[instrument(skip(self, caller, draft), fields(caller = %caller.id))]
    pub async fn update_evaluation(
        &self,
        caller: &Caller,
        id: &EvaluationId,
        draft: &EvaluationDraft,
    ) -> Result<EvaluationDetail> {
        let caller = self.resolve_caller(caller).await?;
        let record = self
            .lifecycle()
            .update(&caller, id, draft, self.clock.now())
            .await?;
        Ok(EvaluationDetail::new(record, Access::Manage, false, false))
    }

    /// Move a record one status forward. Coordinators only.
    #[instrument(skip(self, caller), fields(caller = %caller.id))]
    pub async fn transition_evaluation(
        &self,
        caller: &Caller,
        id: &EvaluationId,
        target: EvaluationStatus,
    ) -> Result<EvaluationDetail> {
        let caller = self.resolve_caller(caller).await?;
        let now = self.clock.now();
        let record = self.lifecycle().transition(&caller, id, target, now).await?;
        let is_open = visibility::is_open(&record, now);
        Ok(EvaluationDetail::new(record, Access::Manage, is_open, false))
    }

    /// Delete a record without responses. Coordinators only.
    #[instrument(skip(self, caller), fields(caller = %caller.id))]
    pub async fn delete_evaluation(&self, caller: &Caller, id: &EvaluationId) -> Result<()> {
        let caller = self.resolve_caller(caller).await?;
        self.lifecycle().delete(&caller, id).await?;
        Ok(())
    }

    /// Whether the caller may submit right now.
    ///
    /// `NotFound` for records outside the caller's scope, `Forbidden` for
    /// visible records not addressed to them.
    #[instrument(skip(self, caller), fields(caller = %caller.id))]
    pub async fn can_submit(&self, caller: &Caller, id: &EvaluationId) -> Result<bool> {
        let caller = self.resolve_caller(caller).await?;
        let record = load_record(&self.store, id).await?;
        let is_open = visibility::can_submit(&caller, &record, self.clock.now())?;
        self.submittable(&caller, &record, Access::Respond, is_open)
            .await
    }

    /// Submit a response.
    #[instrument(skip(self, caller, submission), fields(caller = %caller.id))]
    pub async fn submit_response(
        &self,
        caller: &Caller,
        id: &EvaluationId,
        submission: Submission,
    ) -> Result<SubmissionReceipt> {
        let caller = self.resolve_caller(caller).await?;
        SubmissionEngine::new(&self.store)
            .submit(&caller, id, submission, self.clock.now())
            .await
    }

    /// All responses of a record. Coordinators only.
    #[instrument(skip(self, caller), fields(caller = %caller.id))]
    pub async fn list_responses(
        &self,
        caller: &Caller,
        id: &EvaluationId,
    ) -> Result<Vec<ResponseRecord>> {
        let caller = self.resolve_caller(caller).await?;
        let record = load_record(&self.store, id).await?;
        visibility::require_manage(&caller, &record)?;
        Ok(self.store.list_responses(id).await?)
    }

    /// Recompute the aggregate from stored responses and compare it with the
    /// running counters. Coordinators only.
    #[instrument(skip(self, caller), fields(caller = %caller.id))]
    pub async fn rebuild_aggregate(
        &self,
        caller: &Caller,
        id: &EvaluationId,
    ) -> Result<RebuildReport> {
        let caller = self.resolve_caller(caller).await?;
        let record = load_record(&self.store, id).await?;
        visibility::require_manage(&caller, &record)?;

        let responses = self.store.list_responses(id).await?;
        let report = RebuildReport::new(
            aggregator::from_counters(&record),
            aggregator::recompute(&record, &responses),
        );
        if !report.consistent {
            warn!(
                evaluation_id = %id,
                stored_count = report.stored.response_count,
                recomputed_count = report.recomputed.response_count,
                stored_sum = report.stored.score_sum,
                recomputed_sum = report.recomputed.score_sum,
                "aggregate counters drifted from stored responses"
            );
        }
        Ok(report)
    }
}
