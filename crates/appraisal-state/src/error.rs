//! Error types for appraisal-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Typed outcomes of [`crate::EvaluationStore`] operations.
///
/// Everything except `Backend` and `Serialization` is an expected outcome that
/// callers map onto business results; those two are system faults.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("evaluation not found: {evaluation_id}")]
    EvaluationNotFound { evaluation_id: String },

    #[error("evaluation already exists: {evaluation_id}")]
    Conflict { evaluation_id: String },

    /// Another non-archived record already covers this course and term.
    #[error("an open evaluation already exists for {course_code} in {academic_year} {semester}")]
    CourseTermTaken {
        course_code: String,
        academic_year: String,
        semester: String,
    },

    #[error("response already recorded for evaluator {evaluator_id} on evaluation {evaluation_id}")]
    DuplicateResponse {
        evaluation_id: String,
        evaluator_id: String,
    },

    #[error("evaluation {evaluation_id} is {actual}, expected {expected}")]
    StatusConflict {
        evaluation_id: String,
        expected: String,
        actual: String,
    },

    #[error("evaluation {evaluation_id} has {count} recorded responses")]
    HasResponses { evaluation_id: String, count: u64 },

    #[error("evaluation {evaluation_id} is not open for responses")]
    NotOpen { evaluation_id: String },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// True for backend faults that are not a business outcome.
    pub fn is_fault(&self) -> bool {
        matches!(self, StorageError::Backend(_) | StorageError::Serialization(_))
    }
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Serialization(msg) => StorageError::Serialization(msg),
            other => StorageError::Backend(other.to_string()),
        }
    }
}
