//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use appraisal_core::{
    Caller, CriterionDraft, DirectoryEntry, EngineConfig, EvaluationCategory, EvaluationDetail,
    EvaluationDraft, EvaluationId, EvaluationService, EvaluationStatus, EvaluationStore,
    FixedClock, MemoryDirectory, Role, ScoreInput, Semester, Submission, UserId,
};
use appraisal_state::fakes::MemoryEvaluationStore;
use chrono::{DateTime, Duration, TimeZone, Utc};

pub type MemoryService = EvaluationService<MemoryEvaluationStore, MemoryDirectory>;

/// Window opens here; the clock starts one day later.
pub fn window_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub fn window_end() -> DateTime<Utc> {
    window_start() + Duration::days(30)
}

pub fn roster() -> MemoryDirectory {
    MemoryDirectory::with_entries([
        DirectoryEntry::new("qo-1", Role::QualityOfficer, "Quality"),
        DirectoryEntry::new("inst-1", Role::Instructor, "CS"),
        DirectoryEntry::new("inst-2", Role::Instructor, "CS"),
        DirectoryEntry::new("inst-ee", Role::Instructor, "EE"),
        DirectoryEntry::new("head-cs", Role::DepartmentHead, "CS"),
        DirectoryEntry::new("stu-cs-1", Role::Student, "CS"),
        DirectoryEntry::new("stu-cs-2", Role::Student, "CS"),
        DirectoryEntry::new("stu-cs-3", Role::Student, "CS"),
        DirectoryEntry::new("stu-ee-1", Role::Student, "EE"),
    ])
}

pub fn service_with<S: EvaluationStore>(
    store: S,
    config: EngineConfig,
) -> (EvaluationService<S, MemoryDirectory>, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(window_start() + Duration::days(1)));
    let service = EvaluationService::new(store, roster(), config).with_clock(clock.clone());
    (service, clock)
}

/// Id of the `n`th extra CS student added by [`cohort_service_with`].
pub fn cohort_member(n: usize) -> String {
    format!("stu-cs-c{n}")
}

/// Like [`service_with`], with `cohort` more CS students on the roster.
pub fn cohort_service_with<S: EvaluationStore>(
    store: S,
    cohort: usize,
) -> EvaluationService<S, MemoryDirectory> {
    let mut directory = roster();
    for n in 0..cohort {
        directory.insert(DirectoryEntry::new(cohort_member(n), Role::Student, "CS"));
    }
    let clock = Arc::new(FixedClock::new(window_start() + Duration::days(1)));
    EvaluationService::new(store, directory, EngineConfig::default()).with_clock(clock)
}

pub fn memory_service() -> (MemoryService, Arc<FixedClock>) {
    service_with(MemoryEvaluationStore::new(), EngineConfig::default())
}

pub fn coordinator() -> Caller {
    Caller::new("qo-1", Role::QualityOfficer)
}

/// A caller as the identity layer would hand it over: no department, the
/// engine fills it in from the roster.
pub fn user(id: &str, role: Role) -> Caller {
    Caller::new(id, role)
}

pub fn student(id: &str) -> Caller {
    user(id, Role::Student)
}

/// Criteria `c0`, `c1`, ... with the given weights.
pub fn criteria(weights: &[i64]) -> Vec<CriterionDraft> {
    weights
        .iter()
        .enumerate()
        .map(|(i, w)| CriterionDraft::new(format!("Criterion {i}"), "", *w).with_id(format!("c{i}")))
        .collect()
}

static NEXT_COURSE: AtomicUsize = AtomicUsize::new(101);

/// A course code no other fixture draft uses, so drafts never compete for
/// the same course term unless a test sets that up on purpose.
pub fn fresh_course_code() -> String {
    format!("CS{}", NEXT_COURSE.fetch_add(1, Ordering::Relaxed))
}

pub fn draft(category: EvaluationCategory, subject: &str, weights: &[i64]) -> EvaluationDraft {
    EvaluationDraft {
        title: "Spring teaching review".to_string(),
        description: "End of term feedback".to_string(),
        academic_year: "2025".to_string(),
        semester: Semester::Spring,
        category,
        subject: UserId::from(subject),
        course_code: Some(fresh_course_code()),
        department: None,
        criteria: criteria(weights),
        start_date: window_start(),
        end_date: window_end(),
    }
}

/// One rating per criterion, in criterion order.
pub fn submission(ratings: &[i64]) -> Submission {
    Submission::new(
        ratings
            .iter()
            .enumerate()
            .map(|(i, r)| ScoreInput::new(format!("c{i}"), *r))
            .collect(),
    )
}

/// Create a record and move it forward until it reaches `status`.
pub async fn create_in<S: EvaluationStore>(
    service: &EvaluationService<S, MemoryDirectory>,
    draft: &EvaluationDraft,
    status: EvaluationStatus,
) -> EvaluationId {
    let qo = coordinator();
    let created: EvaluationDetail = service
        .create_evaluation(&qo, draft)
        .await
        .expect("create evaluation");
    let id = created.record.id.clone();

    let steps = [
        EvaluationStatus::Active,
        EvaluationStatus::Completed,
        EvaluationStatus::Archived,
    ];
    let mut current = EvaluationStatus::Draft;
    for next in steps {
        if current == status {
            break;
        }
        service
            .transition_evaluation(&qo, &id, next)
            .await
            .expect("transition");
        current = next;
    }
    id
}
