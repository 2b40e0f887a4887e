//! Score aggregation.
//!
//! A response's own score is the sum of its ratings. The evaluation's
//! average is the mean of those scores, on the scale of the criterion weight
//! sum. The store keeps `response_count` and `score_sum` as running
//! counters updated inside the response commit; the average is always
//! derived from them on read, so the two can never disagree.
//!
//! [`recompute`] derives the same numbers purely from a set of responses and
//! is used to rebuild or audit the counters.

use appraisal_state::{EvaluationRecord, ResponseRecord};
use serde::Serialize;

/// Aggregate score of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Aggregate {
    pub response_count: u64,
    pub score_sum: u64,
    /// `None` until the first response lands.
    pub average_score: Option<f64>,
    /// Highest score a single response can reach.
    pub max_score: u32,
}

impl Aggregate {
    fn new(response_count: u64, score_sum: u64, max_score: u32) -> Self {
        let average_score = if response_count == 0 {
            None
        } else {
            Some(score_sum as f64 / response_count as f64)
        };
        Self {
            response_count,
            score_sum,
            average_score,
            max_score,
        }
    }

    /// Whether two aggregates carry the same counters.
    pub fn same_counters(&self, other: &Aggregate) -> bool {
        self.response_count == other.response_count && self.score_sum == other.score_sum
    }
}

/// Aggregate from the record's running counters.
pub fn from_counters(record: &EvaluationRecord) -> Aggregate {
    Aggregate::new(record.response_count, record.score_sum, record.max_score())
}

/// Aggregate rebuilt from scratch out of `responses`.
///
/// Each response's score is re-summed from its score lines rather than
/// taken from the stored total. Responses for other evaluations are ignored.
pub fn recompute(record: &EvaluationRecord, responses: &[ResponseRecord]) -> Aggregate {
    let (count, sum) = responses
        .iter()
        .filter(|r| r.evaluation_id == record.id)
        .fold((0u64, 0u64), |(count, sum), response| {
            (count + 1, sum + response_score(response))
        });
    Aggregate::new(count, sum, record.max_score())
}

/// A single response's own score.
pub fn response_score(response: &ResponseRecord) -> u64 {
    response.scores.iter().map(|s| u64::from(s.rating)).sum()
}

/// Outcome of an aggregate rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RebuildReport {
    /// Counters currently stored on the record.
    pub stored: Aggregate,
    /// Counters derived from the stored responses.
    pub recomputed: Aggregate,
    pub consistent: bool,
}

impl RebuildReport {
    pub fn new(stored: Aggregate, recomputed: Aggregate) -> Self {
        Self {
            stored,
            recomputed,
            consistent: stored.same_counters(&recomputed),
        }
    }
}
