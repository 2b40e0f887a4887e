//! Domain-level error taxonomy for the evaluation engine.
//!
//! Every variant except `Storage` and `Directory` is an expected outcome
//! that callers present to the user. The two fault variants are the only
//! ones that should be logged and surfaced generically.

use appraisal_state::{EvaluationStatus, StorageError};

/// Evaluation engine errors.
#[derive(Debug, thiserror::Error)]
pub enum AppraisalError {
    #[error("evaluation not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid criteria: {0}")]
    InvalidCriteria(String),

    #[error("invalid evaluation draft: {0}")]
    InvalidDraft(String),

    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    #[error("rating {rating} for criterion {criterion_id} is outside 0..={max}")]
    OutOfRange {
        criterion_id: String,
        rating: i64,
        max: u32,
    },

    #[error("evaluator {evaluator_id} already submitted a response to evaluation {evaluation_id}")]
    AlreadySubmitted {
        evaluation_id: String,
        evaluator_id: String,
    },

    #[error("evaluation {evaluation_id} is not open for responses: {reason}")]
    OutOfWindow {
        evaluation_id: String,
        reason: String,
    },

    #[error("evaluation {evaluation_id} is {status} and can no longer be edited")]
    ImmutableState {
        evaluation_id: String,
        status: EvaluationStatus,
    },

    #[error("evaluation {evaluation_id} cannot move from {from} to {to}")]
    InvalidTransition {
        evaluation_id: String,
        from: EvaluationStatus,
        to: EvaluationStatus,
    },

    #[error("evaluation {evaluation_id} has {count} recorded responses")]
    HasResponses { evaluation_id: String, count: u64 },

    #[error("an evaluation for {course_code} in {academic_year} {semester} is already open")]
    DuplicateEvaluation {
        course_code: String,
        academic_year: String,
        semester: String,
    },

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("user directory error: {0}")]
    Directory(String),
}

impl AppraisalError {
    /// True for expected, user-facing outcomes; false for system faults.
    pub fn is_business(&self) -> bool {
        !matches!(self, AppraisalError::Storage(_) | AppraisalError::Directory(_))
    }

    /// Stable machine-readable name of the outcome.
    pub fn kind(&self) -> &'static str {
        match self {
            AppraisalError::NotFound(_) => "not_found",
            AppraisalError::Forbidden(_) => "forbidden",
            AppraisalError::InvalidCriteria(_) => "invalid_criteria",
            AppraisalError::InvalidDraft(_) => "invalid_draft",
            AppraisalError::InvalidSubmission(_) => "invalid_submission",
            AppraisalError::OutOfRange { .. } => "out_of_range",
            AppraisalError::AlreadySubmitted { .. } => "already_submitted",
            AppraisalError::OutOfWindow { .. } => "out_of_window",
            AppraisalError::ImmutableState { .. } => "immutable_state",
            AppraisalError::InvalidTransition { .. } => "invalid_transition",
            AppraisalError::HasResponses { .. } => "has_responses",
            AppraisalError::DuplicateEvaluation { .. } => "duplicate_evaluation",
            AppraisalError::Storage(_) => "storage",
            AppraisalError::Directory(_) => "directory",
        }
    }
}

/// Typed storage outcomes become business results; the rest stay faults.
///
/// `StatusConflict` is context dependent (edit vs. transition) and is mapped
/// by the lifecycle code before it reaches this conversion.
impl From<StorageError> for AppraisalError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::EvaluationNotFound { evaluation_id } => {
                AppraisalError::NotFound(evaluation_id)
            }
            StorageError::DuplicateResponse {
                evaluation_id,
                evaluator_id,
            } => AppraisalError::AlreadySubmitted {
                evaluation_id,
                evaluator_id,
            },
            StorageError::NotOpen { evaluation_id } => AppraisalError::OutOfWindow {
                evaluation_id,
                reason: "evaluation is no longer active".to_string(),
            },
            StorageError::HasResponses {
                evaluation_id,
                count,
            } => AppraisalError::HasResponses {
                evaluation_id,
                count,
            },
            StorageError::CourseTermTaken {
                course_code,
                academic_year,
                semester,
            } => AppraisalError::DuplicateEvaluation {
                course_code,
                academic_year,
                semester,
            },
            other => AppraisalError::Storage(other),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, AppraisalError>;
