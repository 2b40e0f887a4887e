//! Visibility and eligibility resolution.
//!
//! Decides, per caller and record, whether the record is visible at all and
//! whether the caller is part of its audience. Rules, first match wins:
//!
//! 1. Coordinators manage every record, any status.
//! 2. A caller addressed by the record's category (and the record is
//!    `active` or `completed`) may respond.
//! 3. Department reviewers read every record of their own department.
//! 4. Everything else is hidden.
//!
//! Hidden records report `NotFound` whether or not they exist, so callers
//! cannot enumerate records outside their scope. A visible record without an
//! audience grant reports `Forbidden`.

use appraisal_state::{EvaluationCategory, EvaluationRecord, EvaluationStatus, Role};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{AppraisalError, Caller, Result, RoleClass};

/// What a caller may do with one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// Coordinator: read and mutate.
    Manage,
    /// Part of the audience: read and submit while open.
    Respond,
    /// Department reviewer: read only.
    Review,
    /// Out of scope.
    Hidden,
}

impl Access {
    pub fn is_visible(self) -> bool {
        self != Access::Hidden
    }
}

/// Resolve the caller's access to `record`.
pub fn resolve(caller: &Caller, record: &EvaluationRecord) -> Access {
    if caller.class() == RoleClass::Coordinator {
        return Access::Manage;
    }
    if in_audience(caller, record) {
        return Access::Respond;
    }
    if caller.class() == RoleClass::DepartmentReviewer && caller.in_department(&record.department)
    {
        return Access::Review;
    }
    Access::Hidden
}

/// Whether the record's category addresses this caller.
///
/// Drafts and archived records have no audience.
pub fn in_audience(caller: &Caller, record: &EvaluationRecord) -> bool {
    if !matches!(
        record.status,
        EvaluationStatus::Active | EvaluationStatus::Completed
    ) {
        return false;
    }

    let is_subject = caller.id == record.subject;
    let same_department = caller.in_department(&record.department);

    match record.category {
        EvaluationCategory::Student => caller.role == Role::Student && same_department,
        EvaluationCategory::SelfEvaluation => is_subject,
        EvaluationCategory::CollegeTeam => {
            matches!(caller.role, Role::Instructor | Role::DepartmentHead)
                && same_department
                && !is_subject
        }
        EvaluationCategory::ImmediateSupervisor => {
            matches!(caller.role, Role::DepartmentHead | Role::CollegeDean)
                && same_department
                && !is_subject
        }
    }
}

/// Lazily filter `records` down to the ones visible to `caller`.
///
/// Nothing is cached; calling again re-evaluates every rule.
pub fn list_visible<'a, I>(
    caller: &'a Caller,
    records: I,
) -> impl Iterator<Item = &'a EvaluationRecord> + 'a
where
    I: IntoIterator<Item = &'a EvaluationRecord>,
    I::IntoIter: 'a,
{
    records
        .into_iter()
        .filter(move |record| resolve(caller, record).is_visible())
}

/// Require the record to be visible, returning the resolved access.
pub fn require_visible(caller: &Caller, record: &EvaluationRecord) -> Result<Access> {
    match resolve(caller, record) {
        Access::Hidden => Err(AppraisalError::NotFound(record.id.0.clone())),
        access => Ok(access),
    }
}

/// Require coordinator rights over a record.
pub fn require_manage(caller: &Caller, record: &EvaluationRecord) -> Result<()> {
    match require_visible(caller, record)? {
        Access::Manage => Ok(()),
        _ => Err(AppraisalError::Forbidden(format!(
            "{} may not manage evaluation {}",
            caller.role, record.id
        ))),
    }
}

/// Require the caller to be in the record's audience.
pub fn authorize_submit(caller: &Caller, record: &EvaluationRecord) -> Result<()> {
    match require_visible(caller, record)? {
        Access::Respond => Ok(()),
        _ => Err(AppraisalError::Forbidden(format!(
            "{} {} is not an evaluator of evaluation {}",
            caller.role, caller.id, record.id
        ))),
    }
}

/// Effective availability: `active` status and `now` inside the window.
/// Both conditions are evaluated on every call.
pub fn is_open(record: &EvaluationRecord, now: DateTime<Utc>) -> bool {
    record.status == EvaluationStatus::Active && record.window_contains(now)
}

/// [`is_open`] as a typed outcome.
pub fn check_open(record: &EvaluationRecord, now: DateTime<Utc>) -> Result<()> {
    let reason = if record.status != EvaluationStatus::Active {
        format!("status is {}", record.status)
    } else if now < record.start_date {
        format!("window opens at {}", record.start_date)
    } else if now > record.end_date {
        format!("window closed at {}", record.end_date)
    } else {
        return Ok(());
    };
    Err(AppraisalError::OutOfWindow {
        evaluation_id: record.id.0.clone(),
        reason,
    })
}

/// Full eligibility check short of the uniqueness constraint: audience
/// grant plus effective availability.
pub fn can_submit(caller: &Caller, record: &EvaluationRecord, now: DateTime<Utc>) -> Result<bool> {
    authorize_submit(caller, record)?;
    Ok(is_open(record, now))
}
