//! Appraisal-State: persistence layer for performance evaluations
//!
//! This crate owns everything that touches durable storage: the record
//! shapes, the `EvaluationStore` abstraction and its SurrealDB backend.
//!
//! ## Key Components
//!
//! - `SurrealHandle`: connection setup (memory, local file, URL or cloud)
//! - `EvaluationStore`: the storage trait the engine is written against
//! - `SurrealEvaluationStore`: SurrealDB implementation with a transactional
//!   response commit
//! - `fakes::MemoryEvaluationStore`: in-memory implementation for tests and
//!   embedding

mod error;
pub mod fakes;
mod handle;
pub mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use handle::{CloudConfig, SurrealHandle, DEFAULT_DATABASE, DEFAULT_LOCAL_PATH, DEFAULT_NAMESPACE};
pub use schema::{EvaluationRow, ResponseRow};
pub use storage_traits::{
    normalize_label, ClientMeta, Criterion, CriterionId, EvaluationCategory, EvaluationFilter,
    EvaluationId, EvaluationRecord, EvaluationStatus, EvaluationStore, EvaluatorRef, ResponseId,
    ResponseRecord, Role, ScoreLine, Semester, StorageResult, UnknownLabel, UserId,
};
pub use surreal_store::SurrealEvaluationStore;

/// Result type for appraisal-state setup operations
pub type Result<T> = std::result::Result<T, StateError>;
