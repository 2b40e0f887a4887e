//! Criterion set validation.
//!
//! Criteria arrive as [`CriterionDraft`]s (weights are signed so negative
//! input can be rejected rather than wrapped) and leave as persisted
//! [`Criterion`]s once every rule has passed.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use appraisal_state::{normalize_label, Criterion, CriterionId};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::{AppraisalError, Result};

/// Total the weights of a criterion set must reach under [`WeightPolicy::Strict`].
pub const WEIGHT_TOTAL: u32 = 100;

/// Largest weight a single criterion may carry.
pub const MAX_CRITERION_WEIGHT: u32 = 100;

/// How the weight-sum rule is enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightPolicy {
    /// Reject criterion sets whose weights do not sum to [`WEIGHT_TOTAL`].
    #[default]
    Strict,
    /// Accept any positive sum and log a warning.
    Lenient,
}

impl WeightPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeightPolicy::Strict => "strict",
            WeightPolicy::Lenient => "lenient",
        }
    }
}

impl FromStr for WeightPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "strict" => Ok(WeightPolicy::Strict),
            "lenient" => Ok(WeightPolicy::Lenient),
            other => Err(format!("unknown weight policy: {other}")),
        }
    }
}

impl fmt::Display for WeightPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Criterion as supplied by a coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionDraft {
    /// Kept when editing an existing criterion; generated otherwise.
    #[serde(default)]
    pub id: Option<CriterionId>,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub weight: i64,
}

impl CriterionDraft {
    pub fn new(category: impl Into<String>, description: impl Into<String>, weight: i64) -> Self {
        Self {
            id: None,
            category: category.into(),
            description: description.into(),
            weight,
        }
    }

    pub fn with_id(mut self, id: impl Into<CriterionId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl From<&Criterion> for CriterionDraft {
    fn from(criterion: &Criterion) -> Self {
        Self {
            id: Some(criterion.id.clone()),
            category: criterion.category.clone(),
            description: criterion.description.clone(),
            weight: i64::from(criterion.weight),
        }
    }
}

/// Validate drafts and turn them into persisted criteria.
pub fn build_criteria(drafts: &[CriterionDraft], policy: WeightPolicy) -> Result<Vec<Criterion>> {
    let mut criteria = Vec::with_capacity(drafts.len());
    for (index, draft) in drafts.iter().enumerate() {
        let category = draft.category.trim();
        if category.is_empty() {
            return Err(AppraisalError::InvalidCriteria(format!(
                "criterion #{} has an empty label",
                index + 1
            )));
        }
        if draft.weight <= 0 || draft.weight > i64::from(MAX_CRITERION_WEIGHT) {
            return Err(AppraisalError::InvalidCriteria(format!(
                "criterion {category:?} has weight {}, expected 1..={MAX_CRITERION_WEIGHT}",
                draft.weight
            )));
        }
        criteria.push(Criterion {
            id: draft.id.clone().unwrap_or_default(),
            category: category.to_string(),
            description: draft.description.trim().to_string(),
            weight: draft.weight as u32,
        });
    }

    validate(&criteria, policy)?;
    Ok(criteria)
}

/// Check a criterion set: non-empty, unique ids, weights in
/// `1..=MAX_CRITERION_WEIGHT` and (under the strict policy) a weight sum of
/// exactly [`WEIGHT_TOTAL`].
pub fn validate(criteria: &[Criterion], policy: WeightPolicy) -> Result<()> {
    if criteria.is_empty() {
        return Err(AppraisalError::InvalidCriteria(
            "at least one criterion is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for criterion in criteria {
        if criterion.weight == 0 || criterion.weight > MAX_CRITERION_WEIGHT {
            return Err(AppraisalError::InvalidCriteria(format!(
                "criterion {} has weight {}, expected 1..={MAX_CRITERION_WEIGHT}",
                criterion.id, criterion.weight
            )));
        }
        if !seen.insert(&criterion.id) {
            return Err(AppraisalError::InvalidCriteria(format!(
                "duplicate criterion id {}",
                criterion.id
            )));
        }
    }

    let total: u64 = criteria.iter().map(|c| u64::from(c.weight)).sum();
    if total != u64::from(WEIGHT_TOTAL) {
        match policy {
            WeightPolicy::Strict => {
                return Err(AppraisalError::InvalidCriteria(format!(
                    "weights sum to {total}, expected {WEIGHT_TOTAL}"
                )));
            }
            WeightPolicy::Lenient => {
                warn!(total, expected = WEIGHT_TOTAL, "criterion weights do not sum to the expected total");
            }
        }
    }
    Ok(())
}
