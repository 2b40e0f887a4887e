//! Lifecycle controller.
//!
//! Status only moves forward, one step at a time:
//! `draft -> active -> completed -> archived`. Editable fields change only
//! while `draft`. Deletion needs zero recorded responses, whatever the
//! status. Every write is conditional in the store, so a concurrent change
//! between our read and our write surfaces as the same typed outcome as a
//! stale request.

use appraisal_state::{
    Criterion, EvaluationId, EvaluationRecord, EvaluationStatus, EvaluationStore, Role,
    StorageError,
};
use chrono::{DateTime, Utc};

use crate::directory::UserDirectory;
use crate::domain::{
    build_criteria, same_department, AppraisalError, Caller, EvaluationDraft, Result,
    WeightPolicy,
};
use crate::{obs, visibility};

/// The only status a record may move to from `status`.
pub fn successor(status: EvaluationStatus) -> Option<EvaluationStatus> {
    match status {
        EvaluationStatus::Draft => Some(EvaluationStatus::Active),
        EvaluationStatus::Active => Some(EvaluationStatus::Completed),
        EvaluationStatus::Completed => Some(EvaluationStatus::Archived),
        EvaluationStatus::Archived => None,
    }
}

/// Reject anything other than the single forward step.
pub fn check_transition(record: &EvaluationRecord, to: EvaluationStatus) -> Result<()> {
    if successor(record.status) == Some(to) {
        Ok(())
    } else {
        Err(AppraisalError::InvalidTransition {
            evaluation_id: record.id.0.clone(),
            from: record.status,
            to,
        })
    }
}

/// Reject edits on anything but a draft.
pub fn ensure_editable(record: &EvaluationRecord) -> Result<()> {
    if record.status == EvaluationStatus::Draft {
        Ok(())
    } else {
        Err(AppraisalError::ImmutableState {
            evaluation_id: record.id.0.clone(),
            status: record.status,
        })
    }
}

/// Fetch a record or fail with `NotFound`.
pub async fn load_record<S>(store: &S, id: &EvaluationId) -> Result<EvaluationRecord>
where
    S: EvaluationStore + ?Sized,
{
    store
        .get_evaluation(id)
        .await?
        .ok_or_else(|| AppraisalError::NotFound(id.0.clone()))
}

/// Map a lost compare-and-set onto the outcome for the stored status.
fn on_status_conflict(
    err: StorageError,
    outcome: impl FnOnce(EvaluationStatus) -> AppraisalError,
) -> AppraisalError {
    if let StorageError::StatusConflict { actual, .. } = &err {
        if let Ok(status) = actual.parse::<EvaluationStatus>() {
            return outcome(status);
        }
    }
    AppraisalError::from(err)
}

/// Trimmed course code; blank counts as none.
fn course_code(draft: &EvaluationDraft) -> Option<String> {
    draft
        .course_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
}

fn require_coordinator(caller: &Caller, action: &str) -> Result<()> {
    if caller.is_coordinator() {
        Ok(())
    } else {
        Err(AppraisalError::Forbidden(format!(
            "{} may not {action} evaluations",
            caller.role
        )))
    }
}

/// Creates, edits, transitions and deletes evaluation records.
pub struct LifecycleController<'a, S: ?Sized, D: ?Sized> {
    store: &'a S,
    directory: &'a D,
    policy: WeightPolicy,
}

impl<'a, S, D> LifecycleController<'a, S, D>
where
    S: EvaluationStore + ?Sized,
    D: UserDirectory + ?Sized,
{
    pub fn new(store: &'a S, directory: &'a D, policy: WeightPolicy) -> Self {
        Self {
            store,
            directory,
            policy,
        }
    }

    /// The record's department: the draft's, else the subject's. The two
    /// must agree when both are known.
    async fn resolve_department(&self, draft: &EvaluationDraft) -> Result<String> {
        let subject = self
            .directory
            .lookup(&draft.subject)
            .await?
            .ok_or_else(|| {
                AppraisalError::InvalidDraft(format!("unknown subject {}", draft.subject))
            })?;
        if subject.role == Role::Student {
            return Err(AppraisalError::InvalidDraft(format!(
                "subject {} is a student",
                draft.subject
            )));
        }

        let requested = draft
            .department
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());
        match (requested, subject.department.as_deref()) {
            (Some(requested), Some(own)) if !same_department(requested, own) => {
                Err(AppraisalError::InvalidDraft(format!(
                    "department {requested} does not match subject department {own}"
                )))
            }
            (Some(requested), _) => Ok(requested.to_string()),
            (None, Some(own)) => Ok(own.to_string()),
            (None, None) => Err(AppraisalError::InvalidDraft(format!(
                "no department given and subject {} has none",
                draft.subject
            ))),
        }
    }

    async fn validated_fields(
        &self,
        draft: &EvaluationDraft,
    ) -> Result<(Vec<Criterion>, String)> {
        draft.check_fields()?;
        let criteria = build_criteria(&draft.criteria, self.policy)?;
        let department = self.resolve_department(draft).await?;
        Ok((criteria, department))
    }

    /// Create a new record in `draft`.
    ///
    /// Fails with `DuplicateEvaluation` while another non-archived record
    /// covers the same course code, academic year and semester. The store
    /// performs that check and the insert as one unit.
    pub async fn create(
        &self,
        caller: &Caller,
        draft: &EvaluationDraft,
        now: DateTime<Utc>,
    ) -> Result<EvaluationRecord> {
        require_coordinator(caller, "create")?;
        let (criteria, department) = self.validated_fields(draft).await?;

        let record = EvaluationRecord {
            id: EvaluationId::new(),
            title: draft.title.trim().to_string(),
            description: draft.description.trim().to_string(),
            academic_year: draft.academic_year.trim().to_string(),
            semester: draft.semester,
            category: draft.category,
            subject: draft.subject.clone(),
            course_code: course_code(draft),
            department,
            criteria,
            status: EvaluationStatus::Draft,
            start_date: draft.start_date,
            end_date: draft.end_date,
            created_by: caller.id.clone(),
            updated_by: None,
            created_at: now,
            updated_at: now,
            response_ids: Vec::new(),
            response_count: 0,
            score_sum: 0,
        };

        self.store.insert_evaluation(&record).await?;
        obs::emit_evaluation_created(
            record.id.as_str(),
            record.category.as_str(),
            &record.department,
            &caller.id,
        );
        Ok(record)
    }

    /// Replace the editable fields of a draft. Moving it onto a course term
    /// another open record holds fails with `DuplicateEvaluation`.
    pub async fn update(
        &self,
        caller: &Caller,
        id: &EvaluationId,
        draft: &EvaluationDraft,
        now: DateTime<Utc>,
    ) -> Result<EvaluationRecord> {
        let current = load_record(self.store, id).await?;
        visibility::require_manage(caller, &current)?;
        ensure_editable(&current)?;
        let (criteria, department) = self.validated_fields(draft).await?;

        let replacement = EvaluationRecord {
            title: draft.title.trim().to_string(),
            description: draft.description.trim().to_string(),
            academic_year: draft.academic_year.trim().to_string(),
            semester: draft.semester,
            category: draft.category,
            subject: draft.subject.clone(),
            course_code: course_code(draft),
            department,
            criteria,
            start_date: draft.start_date,
            end_date: draft.end_date,
            updated_by: Some(caller.id.clone()),
            updated_at: now,
            ..current
        };

        let updated = self.store.replace_draft(&replacement).await.map_err(|err| {
            on_status_conflict(err, |status| AppraisalError::ImmutableState {
                evaluation_id: id.0.clone(),
                status,
            })
        })?;
        obs::emit_evaluation_updated(id.as_str(), &caller.id);
        Ok(updated)
    }

    /// Move a record one step forward.
    pub async fn transition(
        &self,
        caller: &Caller,
        id: &EvaluationId,
        to: EvaluationStatus,
        now: DateTime<Utc>,
    ) -> Result<EvaluationRecord> {
        let current = load_record(self.store, id).await?;
        visibility::require_manage(caller, &current)?;
        check_transition(&current, to)?;

        let updated = self
            .store
            .transition_status(id, current.status, to, &caller.id, now)
            .await
            .map_err(|err| {
                on_status_conflict(err, |from| AppraisalError::InvalidTransition {
                    evaluation_id: id.0.clone(),
                    from,
                    to,
                })
            })?;
        obs::emit_evaluation_transitioned(id.as_str(), current.status, to, &caller.id);
        Ok(updated)
    }

    /// Delete a record that has no responses.
    pub async fn delete(&self, caller: &Caller, id: &EvaluationId) -> Result<EvaluationRecord> {
        let current = load_record(self.store, id).await?;
        visibility::require_manage(caller, &current)?;
        if current.response_count > 0 {
            return Err(AppraisalError::HasResponses {
                evaluation_id: id.0.clone(),
                count: current.response_count,
            });
        }

        let deleted = self.store.delete_evaluation(id).await?;
        obs::emit_evaluation_deleted(id.as_str(), &caller.id);
        Ok(deleted)
    }
}
