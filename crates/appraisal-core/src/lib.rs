//! Appraisal Core Library
//!
//! The evaluation lifecycle and response-aggregation engine: criterion
//! validation, visibility and eligibility rules, at-most-once submission,
//! score aggregation and forward-only status transitions. Persistence is
//! delegated to an `appraisal_state::EvaluationStore`.

pub mod aggregator;
pub mod clock;
pub mod config;
pub mod directory;
pub mod domain;
pub mod lifecycle;
pub mod obs;
pub mod service;
pub mod submission;
pub mod telemetry;
pub mod views;
pub mod visibility;

pub use aggregator::{Aggregate, RebuildReport};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, EngineConfig, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use directory::{DirectoryEntry, DirectoryError, MemoryDirectory, UserDirectory};
pub use domain::{
    AppraisalError, Caller, CriterionDraft, EvaluationDraft, Result, RoleClass, WeightPolicy,
};
pub use lifecycle::LifecycleController;
pub use service::EvaluationService;
pub use submission::{ScoreInput, Submission, SubmissionEngine, SubmissionReceipt};
pub use views::{EvaluationDetail, EvaluationSummary, ListQuery, Page};
pub use visibility::Access;

pub use appraisal_state::{
    ClientMeta, EvaluationCategory, EvaluationFilter, EvaluationId, EvaluationRecord,
    EvaluationStatus, EvaluationStore, ResponseRecord, Role, Semester, UserId,
};
