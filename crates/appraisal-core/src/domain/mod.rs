//! Domain models for the evaluation engine.
//!
//! - `Caller`: the acting identity and its role class
//! - `CriterionDraft` / `build_criteria`: criterion set validation
//! - `EvaluationDraft`: coordinator input for a record
//! - `AppraisalError`: the outcome taxonomy

pub mod caller;
pub mod criteria;
pub mod draft;
pub mod error;

pub use caller::{role_class, same_department, Caller, RoleClass};
pub use criteria::{
    build_criteria, validate, CriterionDraft, WeightPolicy, MAX_CRITERION_WEIGHT, WEIGHT_TOTAL,
};
pub use draft::EvaluationDraft;
pub use error::{AppraisalError, Result};
