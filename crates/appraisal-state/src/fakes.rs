//! In-memory fakes for storage traits
//!
//! `MemoryEvaluationStore` satisfies the `EvaluationStore` contract without
//! any external dependencies. A single mutex guards records, responses and
//! the uniqueness keys, so every write observes and updates them together.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::error::StorageError;
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct Inner {
    evaluations: HashMap<EvaluationId, EvaluationRecord>,
    responses: Vec<ResponseRecord>,
    /// `(evaluation_id, evaluator_id)` keys already recorded
    submitted: HashSet<(EvaluationId, UserId)>,
}

/// In-memory evaluation store backed by `HashMap`s behind one `Mutex`.
#[derive(Debug, Default)]
pub struct MemoryEvaluationStore {
    inner: Mutex<Inner>,
}

impl MemoryEvaluationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Inner {
    /// Whether a record other than `record` already holds its course term.
    fn course_term_held(&self, record: &EvaluationRecord) -> bool {
        let Some(term) = record.course_term() else {
            return false;
        };
        self.evaluations
            .values()
            .any(|other| other.id != record.id && other.course_term() == Some(term))
    }
}

fn not_found(id: &EvaluationId) -> StorageError {
    StorageError::EvaluationNotFound {
        evaluation_id: id.0.clone(),
    }
}

fn status_conflict(
    record: &EvaluationRecord,
    expected: EvaluationStatus,
) -> StorageError {
    StorageError::StatusConflict {
        evaluation_id: record.id.0.clone(),
        expected: expected.as_str().to_string(),
        actual: record.status.as_str().to_string(),
    }
}

#[async_trait]
impl EvaluationStore for MemoryEvaluationStore {
    async fn insert_evaluation(&self, record: &EvaluationRecord) -> StorageResult<()> {
        let mut inner = self.lock();
        if inner.evaluations.contains_key(&record.id) {
            return Err(StorageError::Conflict {
                evaluation_id: record.id.0.clone(),
            });
        }
        if inner.course_term_held(record) {
            return Err(record.course_term_taken());
        }
        inner.evaluations.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_evaluation(&self, id: &EvaluationId) -> StorageResult<Option<EvaluationRecord>> {
        Ok(self.lock().evaluations.get(id).cloned())
    }

    async fn list_evaluations(
        &self,
        filter: &EvaluationFilter,
    ) -> StorageResult<Vec<EvaluationRecord>> {
        let inner = self.lock();
        let mut records: Vec<EvaluationRecord> = inner
            .evaluations
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    async fn replace_draft(&self, record: &EvaluationRecord) -> StorageResult<EvaluationRecord> {
        let mut inner = self.lock();
        if inner.course_term_held(record) {
            return Err(record.course_term_taken());
        }
        let stored = inner
            .evaluations
            .get_mut(&record.id)
            .ok_or_else(|| not_found(&record.id))?;
        if stored.status != EvaluationStatus::Draft {
            return Err(status_conflict(stored, EvaluationStatus::Draft));
        }

        stored.title = record.title.clone();
        stored.description = record.description.clone();
        stored.academic_year = record.academic_year.clone();
        stored.semester = record.semester;
        stored.category = record.category;
        stored.subject = record.subject.clone();
        stored.course_code = record.course_code.clone();
        stored.department = record.department.clone();
        stored.criteria = record.criteria.clone();
        stored.start_date = record.start_date;
        stored.end_date = record.end_date;
        stored.updated_by = record.updated_by.clone();
        stored.updated_at = record.updated_at;
        Ok(stored.clone())
    }

    async fn transition_status(
        &self,
        id: &EvaluationId,
        from: EvaluationStatus,
        to: EvaluationStatus,
        by: &UserId,
        at: DateTime<Utc>,
    ) -> StorageResult<EvaluationRecord> {
        let mut inner = self.lock();
        let stored = inner.evaluations.get_mut(id).ok_or_else(|| not_found(id))?;
        if stored.status != from {
            return Err(status_conflict(stored, from));
        }
        stored.status = to;
        stored.updated_by = Some(by.clone());
        stored.updated_at = at;
        Ok(stored.clone())
    }

    async fn delete_evaluation(&self, id: &EvaluationId) -> StorageResult<EvaluationRecord> {
        let mut inner = self.lock();
        let stored = inner.evaluations.get(id).ok_or_else(|| not_found(id))?;
        if stored.response_count > 0 {
            return Err(StorageError::HasResponses {
                evaluation_id: id.0.clone(),
                count: stored.response_count,
            });
        }
        inner.evaluations.remove(id).ok_or_else(|| not_found(id))
    }

    async fn commit_response(&self, response: &ResponseRecord) -> StorageResult<EvaluationRecord> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let stored = inner
            .evaluations
            .get_mut(&response.evaluation_id)
            .ok_or_else(|| not_found(&response.evaluation_id))?;

        let key = (response.evaluation_id.clone(), response.evaluator.id.clone());
        if inner.submitted.contains(&key) {
            return Err(StorageError::DuplicateResponse {
                evaluation_id: response.evaluation_id.0.clone(),
                evaluator_id: response.evaluator.id.0.clone(),
            });
        }
        if stored.status != EvaluationStatus::Active {
            return Err(StorageError::NotOpen {
                evaluation_id: response.evaluation_id.0.clone(),
            });
        }

        stored.response_ids.push(response.id.clone());
        stored.response_count += 1;
        stored.score_sum += u64::from(response.total);
        let updated = stored.clone();

        inner.submitted.insert(key);
        inner.responses.push(response.clone());
        Ok(updated)
    }

    async fn list_responses(&self, id: &EvaluationId) -> StorageResult<Vec<ResponseRecord>> {
        let inner = self.lock();
        let mut responses: Vec<ResponseRecord> = inner
            .responses
            .iter()
            .filter(|r| &r.evaluation_id == id)
            .cloned()
            .collect();
        responses.sort_by_key(|r| r.submitted_at);
        Ok(responses)
    }

    async fn find_response(
        &self,
        id: &EvaluationId,
        evaluator: &UserId,
    ) -> StorageResult<Option<ResponseRecord>> {
        let inner = self.lock();
        Ok(inner
            .responses
            .iter()
            .find(|r| &r.evaluation_id == id && &r.evaluator.id == evaluator)
            .cloned())
    }
}

/// A fully populated record for tests: a 2025/Spring student evaluation of
/// `instructor-1` in `CS`, two criteria weighing 60 and 40, window
/// 2025-03-01..2025-03-31. Each call gets its own course code so samples
/// never compete for the same course term.
pub fn sample_record(status: EvaluationStatus) -> EvaluationRecord {
    let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).single().unwrap_or_default();
    let created = start - Duration::days(7);
    let id = EvaluationId::new();
    EvaluationRecord {
        course_code: Some(format!("CS101-{id}")),
        id,
        title: "Spring teaching review".to_string(),
        description: "Student feedback on course delivery".to_string(),
        academic_year: "2025".to_string(),
        semester: Semester::Spring,
        category: EvaluationCategory::Student,
        subject: UserId::from("instructor-1"),
        department: "CS".to_string(),
        criteria: vec![
            Criterion {
                id: CriterionId::from("clarity"),
                category: "Teaching".to_string(),
                description: "Explains material clearly".to_string(),
                weight: 60,
            },
            Criterion {
                id: CriterionId::from("punctuality"),
                category: "Professionalism".to_string(),
                description: "Starts and ends sessions on time".to_string(),
                weight: 40,
            },
        ],
        status,
        start_date: start,
        end_date: start + Duration::days(30),
        created_by: UserId::from("qo-1"),
        updated_by: None,
        created_at: created,
        updated_at: created,
        response_ids: Vec::new(),
        response_count: 0,
        score_sum: 0,
    }
}

/// A response to `record` by `evaluator` rating every criterion at `rating`
/// (capped at the criterion weight).
pub fn sample_response(record: &EvaluationRecord, evaluator: &str, rating: u32) -> ResponseRecord {
    let scores: Vec<ScoreLine> = record
        .criteria
        .iter()
        .map(|c| ScoreLine {
            criterion_id: c.id.clone(),
            rating: rating.min(c.weight),
            comment: None,
        })
        .collect();
    let total = scores.iter().map(|s| s.rating).sum();
    ResponseRecord {
        id: ResponseId::new(),
        evaluation_id: record.id.clone(),
        evaluator: EvaluatorRef {
            id: UserId::from(evaluator),
            role: Role::Student,
        },
        course_code: record.course_code.clone(),
        scores,
        overall_comment: None,
        total,
        submitted_at: record.start_date + Duration::hours(1),
        client: ClientMeta::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commit_updates_counters_together() {
        let store = MemoryEvaluationStore::new();
        let record = sample_record(EvaluationStatus::Active);
        store.insert_evaluation(&record).await.unwrap();

        let response = sample_response(&record, "student-1", 30);
        let updated = store.commit_response(&response).await.unwrap();

        assert_eq!(updated.response_count, 1);
        assert_eq!(updated.score_sum, 60);
        assert_eq!(updated.response_ids, vec![response.id.clone()]);
    }

    #[tokio::test]
    async fn rejected_commit_leaves_no_trace() {
        let store = MemoryEvaluationStore::new();
        let record = sample_record(EvaluationStatus::Draft);
        store.insert_evaluation(&record).await.unwrap();

        let err = store
            .commit_response(&sample_response(&record, "student-1", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotOpen { .. }));

        let stored = store.get_evaluation(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.response_count, 0);
        assert!(store.list_responses(&record.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn course_term_is_held_until_archived() {
        let store = MemoryEvaluationStore::new();
        let first = sample_record(EvaluationStatus::Active);
        store.insert_evaluation(&first).await.unwrap();

        let mut second = sample_record(EvaluationStatus::Draft);
        second.course_code = first.course_code.clone();
        let err = store.insert_evaluation(&second).await.unwrap_err();
        assert!(matches!(err, StorageError::CourseTermTaken { .. }), "{err}");
        assert!(store.get_evaluation(&second.id).await.unwrap().is_none());

        store
            .transition_status(
                &first.id,
                EvaluationStatus::Active,
                EvaluationStatus::Archived,
                &UserId::from("qo-1"),
                first.updated_at,
            )
            .await
            .unwrap();
        store.insert_evaluation(&second).await.unwrap();
    }

    #[test]
    fn sample_response_caps_ratings_at_weight() {
        let record = sample_record(EvaluationStatus::Active);
        let response = sample_response(&record, "s", 50);
        assert_eq!(response.total, 90);
    }
}
