//! SurrealDB-backed EvaluationStore implementation
//!
//! Uses `schema::EvaluationRow` and `schema::ResponseRow` for persistence,
//! converting to/from `storage_traits` types at the boundary.
//!
//! `commit_response` runs as one SurrealQL transaction: the response insert
//! (guarded by the unique `(evaluation_id, evaluator_id)` index) and the
//! counter update (guarded by `status = 'active'`) either both land or
//! neither does. Counters are recomputed from the `responses` table inside
//! that transaction rather than incremented, and reads fold the table back
//! in, so a record never reports a count its responses disagree with.
//!
//! A transaction the backend cancels with a retryable conflict had no
//! effect; it is run again after a short jittered pause. Business outcomes
//! are never retried.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use surrealdb::engine::any::Any;
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, info, instrument, warn};

use crate::error::StorageError;
use crate::handle::SurrealHandle;
use crate::schema::{DraftPatch, EvaluationRow, ResponseRow};
use crate::storage_traits::{
    EvaluationFilter, EvaluationId, EvaluationRecord, EvaluationStatus, EvaluationStore,
    ResponseRecord, StorageResult, UserId,
};

/// Message thrown inside the commit transaction when the record is not active.
const NOT_OPEN_MARKER: &str = "evaluation is not open for responses";

/// Message thrown when another non-archived record holds the course term.
const TERM_TAKEN_MARKER: &str = "course term already has an open evaluation";

/// Runs of one transaction before a persistent conflict is reported.
const MAX_CONFLICT_ATTEMPTS: u32 = 64;

/// Upper bound of the pause between conflicting runs, in milliseconds.
const MAX_CONFLICT_BACKOFF_MS: u64 = 64;

/// Rejects the write when another non-archived record holds
/// `($course, $year, $semester)`. Expects `$eid` to exclude the record itself.
fn term_guard_sql() -> String {
    format!(
        r#"
            LET $holders = (SELECT VALUE evaluation_id FROM evaluations
                WHERE course_code = $course AND academic_year = $year
                    AND semester = $semester AND status != 'archived'
                    AND evaluation_id != $eid);
            IF array::len($holders) > 0 {{ THROW "{TERM_TAKEN_MARKER}"; }};"#
    )
}

/// The slice of a response that counters are derived from.
#[derive(Debug, Deserialize)]
struct ResponseTally {
    evaluation_id: String,
    response_id: String,
    total: u32,
}

/// SurrealDB-backed implementation of [`EvaluationStore`].
#[derive(Clone)]
pub struct SurrealEvaluationStore {
    handle: SurrealHandle,
}

impl SurrealEvaluationStore {
    pub fn new(handle: SurrealHandle) -> Self {
        Self { handle }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        let handle = SurrealHandle::setup_db().await?;
        info!("SurrealEvaluationStore connected (in-memory)");
        Ok(Self::new(handle))
    }

    /// Create from environment variables.
    ///
    /// Uses the same env-var chain as [`SurrealHandle::setup_from_env`].
    pub async fn from_env() -> crate::Result<Self> {
        Ok(Self::new(SurrealHandle::setup_from_env().await?))
    }

    fn db(&self) -> &Surreal<Any> {
        self.handle.db()
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_row(&self, id: &EvaluationId) -> StorageResult<Option<EvaluationRow>> {
        let eid = id.0.clone();
        let mut res = self
            .db()
            .query("SELECT * FROM evaluations WHERE evaluation_id = $eid")
            .bind(("eid", eid))
            .await
            .map_err(backend)?;

        let rows: Vec<EvaluationRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_existing(&self, id: &EvaluationId) -> StorageResult<EvaluationRow> {
        self.fetch_row(id)
            .await?
            .ok_or_else(|| StorageError::EvaluationNotFound {
                evaluation_id: id.0.clone(),
            })
    }

    /// Build the error for a conditional write that matched no row.
    async fn status_mismatch(
        &self,
        id: &EvaluationId,
        expected: EvaluationStatus,
    ) -> StorageError {
        match self.fetch_existing(id).await {
            Ok(row) => StorageError::StatusConflict {
                evaluation_id: id.0.clone(),
                expected: expected.as_str().to_string(),
                actual: row.status,
            },
            Err(err) => err,
        }
    }

    /// Convert rows to records with counters taken from the `responses`
    /// table. Stored `response_ids` keep their order; ids the table knows
    /// and the row does not are appended oldest first.
    async fn hydrate(&self, rows: Vec<EvaluationRow>) -> StorageResult<Vec<EvaluationRecord>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let eids: Vec<String> = rows.iter().map(|r| r.evaluation_id.clone()).collect();
        let mut res = self
            .db()
            .query(
                "SELECT evaluation_id, response_id, total, submitted_at FROM responses \
                 WHERE evaluation_id IN $eids ORDER BY submitted_at ASC",
            )
            .bind(("eids", eids))
            .await
            .map_err(backend)?;
        let tallies: Vec<ResponseTally> = res.take(0).map_err(backend)?;

        let mut by_evaluation: HashMap<String, Vec<ResponseTally>> = HashMap::new();
        for tally in tallies {
            by_evaluation
                .entry(tally.evaluation_id.clone())
                .or_default()
                .push(tally);
        }

        rows.into_iter()
            .map(|mut row| {
                let tallies = by_evaluation.remove(&row.evaluation_id).unwrap_or_default();
                row.response_count = tallies.len() as u64;
                row.score_sum = tallies.iter().map(|t| u64::from(t.total)).sum();
                row.response_ids
                    .retain(|id| tallies.iter().any(|t| &t.response_id == id));
                for tally in tallies {
                    if !row.response_ids.contains(&tally.response_id) {
                        row.response_ids.push(tally.response_id);
                    }
                }
                row.into_record()
            })
            .collect()
    }

    async fn hydrate_one(&self, row: EvaluationRow) -> StorageResult<EvaluationRecord> {
        let id = EvaluationId(row.evaluation_id.clone());
        self.hydrate(vec![row])
            .await?
            .pop()
            .ok_or_else(|| StorageError::EvaluationNotFound {
                evaluation_id: id.0,
            })
    }

    async fn try_insert(&self, record: &EvaluationRecord) -> StorageResult<()> {
        let guard = if record.course_term().is_some() {
            term_guard_sql()
        } else {
            String::new()
        };
        let sql = format!(
            r#"
            BEGIN TRANSACTION;{guard}
            CREATE evaluations CONTENT $row;
            COMMIT TRANSACTION;
            "#
        );

        let mut res = self
            .db()
            .query(sql)
            .bind(("row", EvaluationRow::from(record)))
            .bind(("eid", record.id.0.clone()))
            .bind(("course", record.course_code.clone()))
            .bind(("year", record.academic_year.clone()))
            .bind(("semester", record.semester.as_str().to_string()))
            .await
            .map_err(backend)?;

        let messages = cancelled(&mut res);
        if messages.is_empty() {
            return Ok(());
        }
        if messages.iter().any(|m| m.contains(TERM_TAKEN_MARKER)) {
            return Err(record.course_term_taken());
        }
        if messages.iter().any(|m| is_unique_violation(m)) {
            return Err(StorageError::Conflict {
                evaluation_id: record.id.0.clone(),
            });
        }
        Err(StorageError::Backend(messages.join("; ")))
    }

    async fn try_replace_draft(
        &self,
        record: &EvaluationRecord,
    ) -> StorageResult<Option<EvaluationRow>> {
        let guard = if record.course_term().is_some() {
            term_guard_sql()
        } else {
            String::new()
        };
        let sql = format!(
            r#"
            BEGIN TRANSACTION;{guard}
            UPDATE evaluations MERGE $patch WHERE evaluation_id = $eid AND status = 'draft';
            COMMIT TRANSACTION;
            "#
        );

        let mut res = self
            .db()
            .query(sql)
            .bind(("patch", DraftPatch::from(record)))
            .bind(("eid", record.id.0.clone()))
            .bind(("course", record.course_code.clone()))
            .bind(("year", record.academic_year.clone()))
            .bind(("semester", record.semester.as_str().to_string()))
            .await
            .map_err(backend)?;

        let messages = cancelled(&mut res);
        if messages.iter().any(|m| m.contains(TERM_TAKEN_MARKER)) {
            return Err(record.course_term_taken());
        }
        if !messages.is_empty() {
            return Err(StorageError::Backend(messages.join("; ")));
        }

        let last = res.num_statements().saturating_sub(1);
        let rows: Vec<EvaluationRow> = res.take(last).map_err(backend)?;
        Ok(rows.into_iter().next())
    }

    /// One run of the commit transaction; returns the row as it committed.
    async fn try_commit(&self, row: &ResponseRow) -> StorageResult<EvaluationRow> {
        let sql = format!(
            r#"
            BEGIN TRANSACTION;
            CREATE responses CONTENT $response;
            LET $open = (SELECT VALUE evaluation_id FROM evaluations
                WHERE evaluation_id = $eid AND status = 'active');
            IF array::len($open) = 0 {{ THROW "{NOT_OPEN_MARKER}"; }};
            LET $ids = (SELECT VALUE response_id FROM responses WHERE evaluation_id = $eid);
            LET $totals = (SELECT VALUE total FROM responses WHERE evaluation_id = $eid);
            UPDATE evaluations
                SET response_ids = array::union(response_ids, $ids),
                    response_count = array::len($ids),
                    score_sum = math::sum($totals)
                WHERE evaluation_id = $eid AND status = 'active';
            COMMIT TRANSACTION;
            "#
        );

        let mut res = self
            .db()
            .query(sql)
            .bind(("response", row.clone()))
            .bind(("eid", row.evaluation_id.clone()))
            .await
            .map_err(backend)?;

        let messages = cancelled(&mut res);
        if !messages.is_empty() {
            if messages.iter().any(|m| is_unique_violation(m)) {
                return Err(StorageError::DuplicateResponse {
                    evaluation_id: row.evaluation_id.clone(),
                    evaluator_id: row.evaluator_id.clone(),
                });
            }
            if messages.iter().any(|m| m.contains(NOT_OPEN_MARKER)) {
                return Err(StorageError::NotOpen {
                    evaluation_id: row.evaluation_id.clone(),
                });
            }
            return Err(StorageError::Backend(messages.join("; ")));
        }

        let last = res.num_statements().saturating_sub(1);
        let updated: Vec<EvaluationRow> = res.take(last).map_err(backend)?;
        updated
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::NotOpen {
                evaluation_id: row.evaluation_id.clone(),
            })
    }
}

fn backend(err: surrealdb::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

/// Messages of the statements that failed, empty when the query succeeded.
fn cancelled(res: &mut surrealdb::Response) -> Vec<String> {
    let errors = res.take_errors();
    let mut failed: Vec<(usize, String)> = errors
        .into_iter()
        .map(|(index, err)| (index, err.to_string()))
        .collect();
    failed.sort_by_key(|(index, _)| *index);
    let messages: Vec<String> = failed.into_iter().map(|(_, message)| message).collect();
    if !messages.is_empty() {
        debug!(?messages, "transaction cancelled");
    }
    messages
}

/// SurrealDB reports unique index violations as
/// "Database index `idx` already contains ...".
fn is_unique_violation(message: &str) -> bool {
    message.contains("already contains")
}

/// Optimistic concurrency failures that the backend asks us to retry.
fn is_retryable_conflict(message: &str) -> bool {
    message.contains("can be retried") || message.contains("Resource busy")
}

fn conflict_backoff(attempt: u32) -> Duration {
    let ceiling = (1u64 << attempt.min(6)).min(MAX_CONFLICT_BACKOFF_MS);
    let jitter = (uuid::Uuid::new_v4().as_u128() % u128::from(ceiling)) as u64;
    Duration::from_millis(1 + jitter)
}

/// Run `op` until it stops failing with a retryable backend conflict.
async fn retry_conflicts<T, F, Fut>(op: &'static str, mut run: F) -> StorageResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StorageResult<T>>,
{
    let mut attempt = 1;
    loop {
        match run().await {
            Err(StorageError::Backend(msg))
                if is_retryable_conflict(&msg) && attempt < MAX_CONFLICT_ATTEMPTS =>
            {
                debug!(op, attempt, "transaction conflict, running again");
                tokio::time::sleep(conflict_backoff(attempt)).await;
                attempt += 1;
            }
            Err(StorageError::Backend(msg)) if is_retryable_conflict(&msg) => {
                warn!(op, attempt, "transaction conflict persisted");
                return Err(StorageError::Backend(msg));
            }
            other => return other,
        }
    }
}

#[async_trait]
impl EvaluationStore for SurrealEvaluationStore {
    #[instrument(skip(self, record), fields(evaluation_id = %record.id))]
    async fn insert_evaluation(&self, record: &EvaluationRecord) -> StorageResult<()> {
        debug!("inserting evaluation");
        retry_conflicts("insert_evaluation", || self.try_insert(record)).await
    }

    #[instrument(skip(self), fields(evaluation_id = %id))]
    async fn get_evaluation(&self, id: &EvaluationId) -> StorageResult<Option<EvaluationRecord>> {
        match self.fetch_row(id).await? {
            Some(row) => self.hydrate_one(row).await.map(Some),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn list_evaluations(
        &self,
        filter: &EvaluationFilter,
    ) -> StorageResult<Vec<EvaluationRecord>> {
        let mut clauses: Vec<&str> = Vec::new();
        if filter.subject.is_some() {
            clauses.push("subject = $subject");
        }
        if filter.status.is_some() {
            clauses.push("status = $status");
        }
        if filter.academic_year.is_some() {
            clauses.push("academic_year = $academic_year");
        }
        if filter.semester.is_some() {
            clauses.push("semester = $semester");
        }
        if filter.category.is_some() {
            clauses.push("category = $category");
        }

        let mut sql = String::from("SELECT * FROM evaluations");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut query = self.db().query(sql);
        if let Some(subject) = &filter.subject {
            query = query.bind(("subject", subject.0.clone()));
        }
        if let Some(status) = filter.status {
            query = query.bind(("status", status.as_str().to_string()));
        }
        if let Some(year) = &filter.academic_year {
            query = query.bind(("academic_year", year.clone()));
        }
        if let Some(semester) = filter.semester {
            query = query.bind(("semester", semester.as_str().to_string()));
        }
        if let Some(category) = filter.category {
            query = query.bind(("category", category.as_str().to_string()));
        }

        let mut res = query.await.map_err(backend)?;
        let rows: Vec<EvaluationRow> = res.take(0).map_err(backend)?;
        let records = self.hydrate(rows).await?;
        // department is matched on its normalized label
        Ok(records.into_iter().filter(|r| filter.matches(r)).collect())
    }

    #[instrument(skip(self, record), fields(evaluation_id = %record.id))]
    async fn replace_draft(&self, record: &EvaluationRecord) -> StorageResult<EvaluationRecord> {
        let merged = retry_conflicts("replace_draft", || self.try_replace_draft(record)).await?;
        match merged {
            Some(row) => self.hydrate_one(row).await,
            None => Err(self.status_mismatch(&record.id, EvaluationStatus::Draft).await),
        }
    }

    #[instrument(skip(self), fields(evaluation_id = %id, from = %from, to = %to))]
    async fn transition_status(
        &self,
        id: &EvaluationId,
        from: EvaluationStatus,
        to: EvaluationStatus,
        by: &UserId,
        at: DateTime<Utc>,
    ) -> StorageResult<EvaluationRecord> {
        let mut res = self
            .db()
            .query(
                "UPDATE evaluations SET status = $target, updated_by = $by, updated_at = $at \
                 WHERE evaluation_id = $eid AND status = $expected",
            )
            .bind(("target", to.as_str().to_string()))
            .bind(("by", by.0.clone()))
            .bind(("at", SurrealDatetime::from(at)))
            .bind(("eid", id.0.clone()))
            .bind(("expected", from.as_str().to_string()))
            .await
            .map_err(backend)?;

        let rows: Vec<EvaluationRow> = res.take(0).map_err(backend)?;
        match rows.into_iter().next() {
            Some(row) => self.hydrate_one(row).await,
            None => Err(self.status_mismatch(id, from).await),
        }
    }

    #[instrument(skip(self), fields(evaluation_id = %id))]
    async fn delete_evaluation(&self, id: &EvaluationId) -> StorageResult<EvaluationRecord> {
        let mut res = self
            .db()
            .query("DELETE evaluations WHERE evaluation_id = $eid AND response_count = 0 RETURN BEFORE")
            .bind(("eid", id.0.clone()))
            .await
            .map_err(backend)?;

        let rows: Vec<EvaluationRow> = res.take(0).map_err(backend)?;
        if let Some(row) = rows.into_iter().next() {
            return row.into_record();
        }

        let record = self.hydrate_one(self.fetch_existing(id).await?).await?;
        Err(StorageError::HasResponses {
            evaluation_id: id.0.clone(),
            count: record.response_count,
        })
    }

    #[instrument(skip(self, response), fields(evaluation_id = %response.evaluation_id, evaluator = %response.evaluator.id))]
    async fn commit_response(&self, response: &ResponseRecord) -> StorageResult<EvaluationRecord> {
        let row = ResponseRow::from(response);
        let committed = retry_conflicts("commit_response", || self.try_commit(&row)).await?;
        debug!(response_count = committed.response_count, "response committed");
        committed.into_record()
    }

    #[instrument(skip(self), fields(evaluation_id = %id))]
    async fn list_responses(&self, id: &EvaluationId) -> StorageResult<Vec<ResponseRecord>> {
        let mut res = self
            .db()
            .query("SELECT * FROM responses WHERE evaluation_id = $eid ORDER BY submitted_at ASC")
            .bind(("eid", id.0.clone()))
            .await
            .map_err(backend)?;

        let rows: Vec<ResponseRow> = res.take(0).map_err(backend)?;
        rows.into_iter().map(ResponseRow::into_record).collect()
    }

    #[instrument(skip(self), fields(evaluation_id = %id, evaluator = %evaluator))]
    async fn find_response(
        &self,
        id: &EvaluationId,
        evaluator: &UserId,
    ) -> StorageResult<Option<ResponseRecord>> {
        let mut res = self
            .db()
            .query("SELECT * FROM responses WHERE evaluation_id = $eid AND evaluator_id = $uid")
            .bind(("eid", id.0.clone()))
            .bind(("uid", evaluator.0.clone()))
            .await
            .map_err(backend)?;

        let rows: Vec<ResponseRow> = res.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .map(ResponseRow::into_record)
            .transpose()
    }
}
