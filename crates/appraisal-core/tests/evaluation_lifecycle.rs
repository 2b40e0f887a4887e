mod common;

use appraisal_core::{
    Access, AppraisalError, Clock, EngineConfig, EvaluationCategory, EvaluationFilter,
    EvaluationStatus, EvaluationStore, ListQuery, Role, Semester, UserId, WeightPolicy,
};
use appraisal_state::fakes::MemoryEvaluationStore;
use appraisal_state::SurrealEvaluationStore;
use chrono::Duration;
use common::*;

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_starts_in_draft_with_subject_department() {
    let (service, clock) = memory_service();
    let detail = service
        .create_evaluation(
            &coordinator(),
            &draft(EvaluationCategory::Student, "inst-1", &[40, 30, 30]),
        )
        .await
        .expect("create");

    assert_eq!(detail.record.status, EvaluationStatus::Draft);
    assert_eq!(detail.record.department, "CS");
    assert_eq!(detail.record.created_by, UserId::from("qo-1"));
    assert_eq!(detail.record.created_at, clock.now());
    assert_eq!(detail.record.response_count, 0);
    assert_eq!(detail.duration_days, 30);
    assert_eq!(detail.access, Access::Manage);
    assert!(!detail.is_open);
}

#[tokio::test]
async fn only_coordinators_create() {
    let (service, _clock) = memory_service();
    let d = draft(EvaluationCategory::Student, "inst-1", &[100]);

    for caller in [
        user("head-cs", Role::DepartmentHead),
        user("inst-2", Role::Instructor),
        student("stu-cs-1"),
    ] {
        let err = service.create_evaluation(&caller, &d).await.unwrap_err();
        assert!(matches!(err, AppraisalError::Forbidden(_)), "{err}");
    }
}

#[tokio::test]
async fn weights_must_sum_to_total_under_strict_policy() {
    let (service, _clock) = memory_service();
    let err = service
        .create_evaluation(
            &coordinator(),
            &draft(EvaluationCategory::Student, "inst-1", &[40, 30, 20]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppraisalError::InvalidCriteria(_)));

    let err = service
        .create_evaluation(
            &coordinator(),
            &draft(EvaluationCategory::Student, "inst-1", &[]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppraisalError::InvalidCriteria(_)));
}

#[tokio::test]
async fn lenient_policy_accepts_any_positive_sum() {
    let config = EngineConfig::default().with_weight_policy(WeightPolicy::Lenient);
    let (service, _clock) = service_with(MemoryEvaluationStore::new(), config);

    let detail = service
        .create_evaluation(
            &coordinator(),
            &draft(EvaluationCategory::Student, "inst-1", &[5, 5]),
        )
        .await
        .expect("lenient create");
    assert_eq!(detail.aggregate.max_score, 10);

    let err = service
        .create_evaluation(
            &coordinator(),
            &draft(EvaluationCategory::Student, "inst-1", &[0, 5]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppraisalError::InvalidCriteria(_)));
}

#[tokio::test]
async fn window_must_end_after_it_starts() {
    let (service, _clock) = memory_service();
    let mut d = draft(EvaluationCategory::Student, "inst-1", &[100]);
    d.end_date = d.start_date;

    let err = service
        .create_evaluation(&coordinator(), &d)
        .await
        .unwrap_err();
    assert!(matches!(err, AppraisalError::InvalidDraft(_)));
}

#[tokio::test]
async fn subject_must_be_a_known_non_student() {
    let (service, _clock) = memory_service();

    let err = service
        .create_evaluation(
            &coordinator(),
            &draft(EvaluationCategory::Student, "ghost", &[100]),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("unknown subject"), "{err}");

    let err = service
        .create_evaluation(
            &coordinator(),
            &draft(EvaluationCategory::Student, "stu-cs-1", &[100]),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("is a student"), "{err}");
}

#[tokio::test]
async fn explicit_department_must_match_subject() {
    let (service, _clock) = memory_service();

    let mut d = draft(EvaluationCategory::Student, "inst-1", &[100]);
    d.department = Some("EE".to_string());
    let err = service
        .create_evaluation(&coordinator(), &d)
        .await
        .unwrap_err();
    assert!(matches!(err, AppraisalError::InvalidDraft(_)));

    d.department = Some("cs".to_string());
    let detail = service
        .create_evaluation(&coordinator(), &d)
        .await
        .expect("case-insensitive department");
    assert_eq!(detail.record.department, "cs");
}

async fn one_open_evaluation_per_course_term<S: EvaluationStore>(store: S) {
    let (service, _clock) = service_with(store, EngineConfig::default());
    let qo = coordinator();

    let mut first = draft(EvaluationCategory::Student, "inst-1", &[100]);
    first.course_code = Some("MATH200".to_string());
    let held = create_in(&service, &first, EvaluationStatus::Active).await;

    let mut second = draft(EvaluationCategory::Student, "inst-2", &[100]);
    second.course_code = Some(" MATH200 ".to_string());
    let err = service.create_evaluation(&qo, &second).await.unwrap_err();
    match &err {
        AppraisalError::DuplicateEvaluation {
            course_code,
            academic_year,
            semester,
        } => {
            assert_eq!(course_code, "MATH200");
            assert_eq!(academic_year, "2025");
            assert_eq!(semester, "Spring");
        }
        other => panic!("expected DuplicateEvaluation, got {other}"),
    }
    assert!(err.is_business());
    assert_eq!(err.kind(), "duplicate_evaluation");

    let page = service
        .list_evaluations(&qo, &ListQuery::default())
        .await
        .expect("list");
    assert_eq!(page.total, 1);

    // The same course in another term is fine.
    second.semester = Semester::Fall;
    service
        .create_evaluation(&qo, &second)
        .await
        .expect("other semester");

    // Archiving frees the term.
    second.semester = Semester::Spring;
    for step in [EvaluationStatus::Completed, EvaluationStatus::Archived] {
        service
            .transition_evaluation(&qo, &held, step)
            .await
            .expect("transition");
    }
    let detail = service
        .create_evaluation(&qo, &second)
        .await
        .expect("term released by archive");
    assert_eq!(detail.record.course_code.as_deref(), Some("MATH200"));
}

#[tokio::test]
async fn one_open_evaluation_per_course_term_in_memory() {
    one_open_evaluation_per_course_term(MemoryEvaluationStore::new()).await;
}

#[tokio::test]
async fn one_open_evaluation_per_course_term_in_surreal() {
    one_open_evaluation_per_course_term(
        SurrealEvaluationStore::in_memory().await.expect("store"),
    )
    .await;
}

#[tokio::test]
async fn evaluations_without_a_course_never_compete() {
    let (service, _clock) = memory_service();
    for code in [None, Some("   ".to_string()), None] {
        let mut d = draft(EvaluationCategory::Student, "inst-1", &[100]);
        d.course_code = code;
        let detail = service
            .create_evaluation(&coordinator(), &d)
            .await
            .expect("create");
        assert_eq!(detail.record.course_code, None);
    }
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

#[tokio::test]
async fn drafts_can_be_edited() {
    let (service, clock) = memory_service();
    let id = create_in(
        &service,
        &draft(EvaluationCategory::Student, "inst-1", &[100]),
        EvaluationStatus::Draft,
    )
    .await;

    clock.advance(Duration::hours(3));
    let mut d = draft(EvaluationCategory::CollegeTeam, "inst-1", &[50, 50]);
    d.title = "Peer review".to_string();
    let detail = service
        .update_evaluation(&coordinator(), &id, &d)
        .await
        .expect("update");

    assert_eq!(detail.record.id, id);
    assert_eq!(detail.record.title, "Peer review");
    assert_eq!(detail.record.category, EvaluationCategory::CollegeTeam);
    assert_eq!(detail.record.criteria.len(), 2);
    assert_eq!(detail.record.status, EvaluationStatus::Draft);
    assert_eq!(detail.record.updated_by, Some(UserId::from("qo-1")));
    assert_eq!(
        detail.record.updated_at - detail.record.created_at,
        Duration::hours(3)
    );
}

#[tokio::test]
async fn active_records_are_immutable() {
    let (service, _clock) = memory_service();
    let d = draft(EvaluationCategory::Student, "inst-1", &[100]);
    let id = create_in(&service, &d, EvaluationStatus::Active).await;

    let err = service
        .update_evaluation(&coordinator(), &id, &d)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppraisalError::ImmutableState {
            status: EvaluationStatus::Active,
            ..
        }
    ));
}

#[tokio::test]
async fn drafts_cannot_move_onto_a_held_course_term() {
    let (service, _clock) = memory_service();
    let taken = draft(EvaluationCategory::Student, "inst-1", &[100]);
    create_in(&service, &taken, EvaluationStatus::Active).await;
    let id = create_in(
        &service,
        &draft(EvaluationCategory::Student, "inst-2", &[100]),
        EvaluationStatus::Draft,
    )
    .await;

    let mut moved = draft(EvaluationCategory::Student, "inst-2", &[100]);
    moved.course_code = taken.course_code.clone();
    let err = service
        .update_evaluation(&coordinator(), &id, &moved)
        .await
        .unwrap_err();
    assert!(matches!(err, AppraisalError::DuplicateEvaluation { .. }), "{err}");

    // Re-saving a draft under its own course term is not a clash.
    let mut own = draft(EvaluationCategory::Student, "inst-2", &[100]);
    own.course_code = service
        .get_evaluation(&coordinator(), &id)
        .await
        .expect("get")
        .record
        .course_code;
    own.title = "Renamed".to_string();
    service
        .update_evaluation(&coordinator(), &id, &own)
        .await
        .expect("same term");
}

#[tokio::test]
async fn non_coordinators_cannot_edit() {
    let (service, _clock) = memory_service();
    let d = draft(EvaluationCategory::Student, "inst-1", &[100]);
    let id = create_in(&service, &d, EvaluationStatus::Draft).await;

    let err = service
        .update_evaluation(&student("stu-cs-1"), &id, &d)
        .await
        .unwrap_err();
    assert!(matches!(err, AppraisalError::NotFound(_)));

    let err = service
        .update_evaluation(&user("head-cs", Role::DepartmentHead), &id, &d)
        .await
        .unwrap_err();
    assert!(matches!(err, AppraisalError::Forbidden(_)));
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_moves_forward_one_step_at_a_time() {
    let (service, _clock) = memory_service();
    let qo = coordinator();
    let id = create_in(
        &service,
        &draft(EvaluationCategory::Student, "inst-1", &[100]),
        EvaluationStatus::Draft,
    )
    .await;

    let err = service
        .transition_evaluation(&qo, &id, EvaluationStatus::Completed)
        .await
        .unwrap_err();
    assert!(matches!(err, AppraisalError::InvalidTransition { .. }));

    let detail = service
        .transition_evaluation(&qo, &id, EvaluationStatus::Active)
        .await
        .expect("activate");
    assert_eq!(detail.record.status, EvaluationStatus::Active);
    assert!(detail.is_open);

    let err = service
        .transition_evaluation(&qo, &id, EvaluationStatus::Draft)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppraisalError::InvalidTransition {
            from: EvaluationStatus::Active,
            to: EvaluationStatus::Draft,
            ..
        }
    ));

    for next in [EvaluationStatus::Completed, EvaluationStatus::Archived] {
        service
            .transition_evaluation(&qo, &id, next)
            .await
            .expect("forward step");
    }
    let err = service
        .transition_evaluation(&qo, &id, EvaluationStatus::Active)
        .await
        .unwrap_err();
    assert!(matches!(err, AppraisalError::InvalidTransition { .. }));
}

#[tokio::test]
async fn transitions_keep_the_counters() {
    let (service, _clock) = memory_service();
    let qo = coordinator();
    let id = create_in(
        &service,
        &draft(EvaluationCategory::Student, "inst-1", &[100]),
        EvaluationStatus::Active,
    )
    .await;
    service
        .submit_response(&student("stu-cs-1"), &id, submission(&[75]))
        .await
        .expect("submit");

    let detail = service
        .transition_evaluation(&qo, &id, EvaluationStatus::Completed)
        .await
        .expect("complete");
    assert_eq!(detail.aggregate.response_count, 1);
    assert_eq!(detail.aggregate.average_score, Some(75.0));
    assert_eq!(detail.record.updated_by, Some(UserId::from("qo-1")));
}

#[tokio::test]
async fn only_coordinators_transition() {
    let (service, _clock) = memory_service();
    let id = create_in(
        &service,
        &draft(EvaluationCategory::Student, "inst-1", &[100]),
        EvaluationStatus::Active,
    )
    .await;

    let err = service
        .transition_evaluation(&student("stu-cs-1"), &id, EvaluationStatus::Completed)
        .await
        .unwrap_err();
    assert!(matches!(err, AppraisalError::Forbidden(_)));
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn records_with_responses_cannot_be_deleted() {
    let (service, _clock) = memory_service();
    let id = create_in(
        &service,
        &draft(EvaluationCategory::Student, "inst-1", &[100]),
        EvaluationStatus::Active,
    )
    .await;
    service
        .submit_response(&student("stu-cs-1"), &id, submission(&[10]))
        .await
        .expect("submit");

    let err = service
        .delete_evaluation(&coordinator(), &id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppraisalError::HasResponses { count: 1, .. }));
    assert!(service.get_evaluation(&coordinator(), &id).await.is_ok());
}

#[tokio::test]
async fn unanswered_records_can_be_deleted_in_any_status() {
    let (service, _clock) = memory_service();
    for status in [EvaluationStatus::Draft, EvaluationStatus::Archived] {
        let id = create_in(
            &service,
            &draft(EvaluationCategory::Student, "inst-1", &[100]),
            status,
        )
        .await;
        service
            .delete_evaluation(&coordinator(), &id)
            .await
            .expect("delete");
        let err = service
            .get_evaluation(&coordinator(), &id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppraisalError::NotFound(_)));
    }
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn listing_pages_newest_first() {
    let (service, clock) = memory_service();
    let mut ids = Vec::new();
    for _ in 0..7 {
        ids.push(
            create_in(
                &service,
                &draft(EvaluationCategory::Student, "inst-1", &[100]),
                EvaluationStatus::Draft,
            )
            .await,
        );
        clock.advance(Duration::minutes(1));
    }

    let query = ListQuery::default().page(1, 3);
    let first = service
        .list_evaluations(&coordinator(), &query)
        .await
        .expect("list");
    assert_eq!(first.total, 7);
    assert_eq!(first.total_pages, 3);
    assert_eq!(first.items.len(), 3);
    assert_eq!(first.items[0].id, ids[6]);

    let last = service
        .list_evaluations(&coordinator(), &ListQuery::default().page(3, 3))
        .await
        .expect("list");
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.items[0].id, ids[0]);

    let beyond = service
        .list_evaluations(&coordinator(), &ListQuery::default().page(9, 3))
        .await
        .expect("list");
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 7);
}

#[tokio::test]
async fn listing_uses_configured_page_size() {
    let config = EngineConfig::default().with_page_size(2);
    let (service, _clock) = service_with(MemoryEvaluationStore::new(), config);
    for _ in 0..3 {
        create_in(
            &service,
            &draft(EvaluationCategory::Student, "inst-1", &[100]),
            EvaluationStatus::Draft,
        )
        .await;
    }

    let page = service
        .list_evaluations(&coordinator(), &ListQuery::default())
        .await
        .expect("list");
    assert_eq!(page.limit, 2);
    assert_eq!(page.page, 1);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total_pages, 2);
}

#[tokio::test]
async fn listing_only_counts_visible_records() {
    let (service, _clock) = memory_service();
    let cs_active = create_in(
        &service,
        &draft(EvaluationCategory::Student, "inst-1", &[100]),
        EvaluationStatus::Active,
    )
    .await;
    create_in(
        &service,
        &draft(EvaluationCategory::Student, "inst-1", &[100]),
        EvaluationStatus::Draft,
    )
    .await;
    create_in(
        &service,
        &draft(EvaluationCategory::Student, "inst-ee", &[100]),
        EvaluationStatus::Active,
    )
    .await;

    let page = service
        .list_evaluations(&student("stu-cs-1"), &ListQuery::default())
        .await
        .expect("list");
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, cs_active);
    assert_eq!(page.items[0].access, Access::Respond);
    assert!(page.items[0].is_open);
    assert!(page.items[0].can_submit);

    let head = service
        .list_evaluations(&user("head-cs", Role::DepartmentHead), &ListQuery::default())
        .await
        .expect("list");
    assert_eq!(head.total, 2);
    assert!(head.items.iter().all(|s| s.access == Access::Review));

    let all = service
        .list_evaluations(&coordinator(), &ListQuery::default())
        .await
        .expect("list");
    assert_eq!(all.total, 3);
}

#[tokio::test]
async fn listing_applies_filters() {
    let (service, _clock) = memory_service();
    create_in(
        &service,
        &draft(EvaluationCategory::Student, "inst-1", &[100]),
        EvaluationStatus::Active,
    )
    .await;
    create_in(
        &service,
        &draft(EvaluationCategory::SelfEvaluation, "inst-1", &[100]),
        EvaluationStatus::Draft,
    )
    .await;
    create_in(
        &service,
        &draft(EvaluationCategory::Student, "inst-ee", &[100]),
        EvaluationStatus::Draft,
    )
    .await;

    let by_status = ListQuery::with_filter(EvaluationFilter {
        status: Some(EvaluationStatus::Draft),
        ..Default::default()
    });
    let page = service
        .list_evaluations(&coordinator(), &by_status)
        .await
        .expect("list");
    assert_eq!(page.total, 2);

    let by_subject_and_category = ListQuery::with_filter(EvaluationFilter {
        subject: Some(UserId::from("inst-1")),
        category: Some(EvaluationCategory::Student),
        ..Default::default()
    });
    let page = service
        .list_evaluations(&coordinator(), &by_subject_and_category)
        .await
        .expect("list");
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].status, EvaluationStatus::Active);

    let by_department = ListQuery::with_filter(EvaluationFilter {
        department: Some("EE".to_string()),
        ..Default::default()
    });
    let page = service
        .list_evaluations(&coordinator(), &by_department)
        .await
        .expect("list");
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn department_filter_matches_like_visibility() {
    let (service, _clock) = memory_service();
    let mut d = draft(EvaluationCategory::Student, "inst-1", &[100]);
    d.department = Some("cs".to_string());
    let id = create_in(&service, &d, EvaluationStatus::Active).await;

    // The head of "CS" sees the record, so filtering by "CS" must find it.
    let head = user("head-cs", Role::DepartmentHead);
    service.get_evaluation(&head, &id).await.expect("visible");

    for department in ["CS", "cs", " c-s "] {
        let query = ListQuery::with_filter(EvaluationFilter {
            department: Some(department.to_string()),
            ..Default::default()
        });
        let page = service
            .list_evaluations(&head, &query)
            .await
            .expect("list");
        assert_eq!(page.total, 1, "{department:?}");
        assert_eq!(page.items[0].id, id);
    }
}

#[tokio::test]
async fn explicit_caller_department_is_trusted() {
    let (service, _clock) = memory_service();
    let id = create_in(
        &service,
        &draft(EvaluationCategory::Student, "inst-ee", &[100]),
        EvaluationStatus::Active,
    )
    .await;

    // Not in the roster, but the identity layer vouches for the department.
    let visitor = student("exchange-9").with_department("EE");
    assert!(service.can_submit(&visitor, &id).await.expect("can_submit"));

    let unknown = student("exchange-10");
    let err = service.get_evaluation(&unknown, &id).await.unwrap_err();
    assert!(matches!(err, AppraisalError::NotFound(_)));
}
