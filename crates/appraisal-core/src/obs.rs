//! Structured observability hooks for evaluation lifecycle events.
//!
//! This module provides:
//! - Evaluation-scoped tracing spans via `evaluation_span`
//! - Emission functions for key events: create, transition, delete,
//!   response committed, response rejected
//!
//! Events are emitted at `info!` level. Rejections caused by system faults
//! are emitted at `warn!`.

use appraisal_state::{EvaluationStatus, UserId};
use tracing::{info, warn};

use crate::domain::AppraisalError;

/// Evaluation-scoped span. Attach it to a future with
/// `tracing::Instrument::instrument` so every event inside carries the id.
///
/// # Example
///
/// ```ignore
/// engine.try_submit(..).instrument(evaluation_span("eval-123", "submit")).await
/// // every event carries evaluation_id = "eval-123", op = "submit"
/// ```
pub fn evaluation_span(evaluation_id: &str, op: &'static str) -> tracing::Span {
    tracing::info_span!("appraisal.evaluation", evaluation_id = %evaluation_id, op)
}

/// Emit event: evaluation created in draft.
pub fn emit_evaluation_created(evaluation_id: &str, category: &str, department: &str, by: &UserId) {
    info!(
        event = "evaluation.created",
        evaluation_id = %evaluation_id,
        category = %category,
        department = %department,
        by = %by,
    );
}

/// Emit event: draft fields replaced.
pub fn emit_evaluation_updated(evaluation_id: &str, by: &UserId) {
    info!(event = "evaluation.updated", evaluation_id = %evaluation_id, by = %by);
}

/// Emit event: status moved forward.
pub fn emit_evaluation_transitioned(
    evaluation_id: &str,
    from: EvaluationStatus,
    to: EvaluationStatus,
    by: &UserId,
) {
    info!(
        event = "evaluation.transitioned",
        evaluation_id = %evaluation_id,
        from = %from,
        to = %to,
        by = %by,
    );
}

/// Emit event: evaluation deleted.
pub fn emit_evaluation_deleted(evaluation_id: &str, by: &UserId) {
    info!(event = "evaluation.deleted", evaluation_id = %evaluation_id, by = %by);
}

/// Emit event: response durably recorded.
pub fn emit_response_committed(
    evaluation_id: &str,
    evaluator: &UserId,
    total: u32,
    response_count: u64,
) {
    info!(
        event = "response.committed",
        evaluation_id = %evaluation_id,
        evaluator = %evaluator,
        total = total,
        response_count = response_count,
    );
}

/// Emit event: response rejected. Business outcomes log at info, faults at warn.
pub fn emit_response_rejected(evaluation_id: &str, evaluator: &UserId, error: &AppraisalError) {
    if error.is_business() {
        info!(
            event = "response.rejected",
            evaluation_id = %evaluation_id,
            evaluator = %evaluator,
            kind = error.kind(),
            reason = %error,
        );
    } else {
        warn!(
            event = "response.rejected",
            evaluation_id = %evaluation_id,
            evaluator = %evaluator,
            kind = error.kind(),
            error = %error,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluation_span_creation() {
        let span = evaluation_span("eval-123", "submit");
        let _entered = span.enter();
    }

    #[test]
    fn test_emit_functions_do_not_panic() {
        let by = UserId::from("qo-1");
        emit_evaluation_created("eval-1", "Student", "CS", &by);
        emit_evaluation_updated("eval-1", &by);
        emit_evaluation_transitioned(
            "eval-1",
            EvaluationStatus::Draft,
            EvaluationStatus::Active,
            &by,
        );
        emit_evaluation_deleted("eval-1", &by);
        emit_response_committed("eval-1", &UserId::from("stu-1"), 100, 1);
        emit_response_rejected(
            "eval-1",
            &UserId::from("stu-1"),
            &AppraisalError::NotFound("eval-1".to_string()),
        );
        emit_response_rejected(
            "eval-1",
            &UserId::from("stu-1"),
            &AppraisalError::Directory("down".to_string()),
        );
    }
}
