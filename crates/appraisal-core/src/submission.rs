//! Submission engine.
//!
//! `submit` runs, in order: resolve the record, check the audience grant,
//! check status and window against the current time, validate the score
//! lines structurally and then by range, and finally hand the response to
//! the store's atomic `commit_response`. The at-most-once guarantee is the
//! store's unique `(evaluation_id, evaluator_id)` constraint; nothing here
//! reads before writing to enforce it.

use std::collections::HashMap;

use appraisal_state::{
    ClientMeta, CriterionId, EvaluationId, EvaluationRecord, EvaluationStore, EvaluatorRef,
    ResponseId, ResponseRecord, ScoreLine,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, Instrument};

use crate::aggregator::{self, Aggregate};
use crate::domain::{AppraisalError, Caller, Result};
use crate::lifecycle::load_record;
use crate::{obs, visibility};

/// One rating as supplied by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreInput {
    pub criterion_id: CriterionId,
    /// Signed so that negative input is rejected instead of wrapped.
    pub rating: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

impl ScoreInput {
    pub fn new(criterion_id: impl Into<CriterionId>, rating: i64) -> Self {
        Self {
            criterion_id: criterion_id.into(),
            rating,
            comment: None,
        }
    }
}

/// A prospective response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub scores: Vec<ScoreInput>,
    #[serde(default)]
    pub overall_comment: Option<String>,
    /// Defaults to the evaluation's course code.
    #[serde(default)]
    pub course_code: Option<String>,
    #[serde(default)]
    pub client: ClientMeta,
}

impl Submission {
    pub fn new(scores: Vec<ScoreInput>) -> Self {
        Self {
            scores,
            ..Default::default()
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.overall_comment = Some(comment.into());
        self
    }

    pub fn with_client(mut self, client: ClientMeta) -> Self {
        self.client = client;
        self
    }
}

/// The durable response together with the evaluation's updated aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub response: ResponseRecord,
    pub aggregate: Aggregate,
}

fn clean_text(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// Validate score lines against the record's criterion set.
///
/// Structural problems (unknown, repeated or missing criteria) are reported
/// as `InvalidSubmission` before any rating is range-checked. Returned lines
/// follow the order of the record's criteria.
pub fn validate_scores(record: &EvaluationRecord, scores: &[ScoreInput]) -> Result<Vec<ScoreLine>> {
    let mut by_criterion: HashMap<&CriterionId, &ScoreInput> = HashMap::with_capacity(scores.len());
    for score in scores {
        if record.criterion(&score.criterion_id).is_none() {
            return Err(AppraisalError::InvalidSubmission(format!(
                "unknown criterion {}",
                score.criterion_id
            )));
        }
        if by_criterion.insert(&score.criterion_id, score).is_some() {
            return Err(AppraisalError::InvalidSubmission(format!(
                "criterion {} is rated more than once",
                score.criterion_id
            )));
        }
    }

    let missing: Vec<&str> = record
        .criteria
        .iter()
        .filter(|c| !by_criterion.contains_key(&c.id))
        .map(|c| c.id.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(AppraisalError::InvalidSubmission(format!(
            "missing ratings for criteria: {}",
            missing.join(", ")
        )));
    }

    let mut lines = Vec::with_capacity(record.criteria.len());
    for criterion in &record.criteria {
        let Some(score) = by_criterion.get(&criterion.id) else {
            continue;
        };
        if score.rating < 0 || score.rating > i64::from(criterion.weight) {
            return Err(AppraisalError::OutOfRange {
                criterion_id: criterion.id.0.clone(),
                rating: score.rating,
                max: criterion.weight,
            });
        }
        lines.push(ScoreLine {
            criterion_id: criterion.id.clone(),
            rating: score.rating as u32,
            comment: clean_text(score.comment.clone()),
        });
    }
    Ok(lines)
}

/// Accepts, validates and commits responses.
pub struct SubmissionEngine<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> SubmissionEngine<'a, S>
where
    S: EvaluationStore + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Submit a response on behalf of `caller` at time `now`.
    pub async fn submit(
        &self,
        caller: &Caller,
        evaluation_id: &EvaluationId,
        submission: Submission,
        now: DateTime<Utc>,
    ) -> Result<SubmissionReceipt> {
        let result = self
            .try_submit(caller, evaluation_id, submission, now)
            .instrument(obs::evaluation_span(evaluation_id.as_str(), "submit"))
            .await;
        if let Err(err) = &result {
            obs::emit_response_rejected(evaluation_id.as_str(), &caller.id, err);
        }
        result
    }

    async fn try_submit(
        &self,
        caller: &Caller,
        evaluation_id: &EvaluationId,
        submission: Submission,
        now: DateTime<Utc>,
    ) -> Result<SubmissionReceipt> {
        let record = load_record(self.store, evaluation_id).await?;
        visibility::authorize_submit(caller, &record)?;
        visibility::check_open(&record, now)?;

        let scores = validate_scores(&record, &submission.scores)?;
        let total: u32 = scores.iter().map(|s| s.rating).sum();

        let response = ResponseRecord {
            id: ResponseId::new(),
            evaluation_id: record.id.clone(),
            evaluator: EvaluatorRef {
                id: caller.id.clone(),
                role: caller.role,
            },
            course_code: clean_text(submission.course_code).or_else(|| record.course_code.clone()),
            scores,
            overall_comment: clean_text(submission.overall_comment),
            total,
            submitted_at: now,
            client: submission.client,
        };

        debug!(total, "committing response");
        let updated = self.store.commit_response(&response).await?;
        let aggregate = aggregator::from_counters(&updated);
        obs::emit_response_committed(
            record.id.as_str(),
            &caller.id,
            total,
            aggregate.response_count,
        );

        Ok(SubmissionReceipt {
            response,
            aggregate,
        })
    }
}
