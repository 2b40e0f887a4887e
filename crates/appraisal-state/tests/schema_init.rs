//! Integration tests for SurrealDB schema initialization and row mapping
//!
//! Verifies that fresh stores come up with the schema applied and that rows
//! keep the on-disk shape the indexes expect.

use appraisal_state::fakes::{sample_record, sample_response};
use appraisal_state::migrations::RESPONSE_UNIQUE_INDEX;
use appraisal_state::{
    EvaluationFilter, EvaluationRow, EvaluationStatus, EvaluationStore, ResponseRow, Role,
    SurrealEvaluationStore, SurrealHandle,
};

#[tokio::test]
async fn test_fresh_store_is_empty() {
    let store = SurrealEvaluationStore::new(SurrealHandle::setup_db().await.unwrap());
    let all = store
        .list_evaluations(&EvaluationFilter::default())
        .await
        .unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn test_local_store_setup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db");
    let first = SurrealHandle::setup_local(&path).await;
    assert!(first.is_ok(), "first setup failed: {:?}", first.err().map(|e| e.to_string()));
}

#[test]
fn test_unique_index_name_is_stable() {
    assert_eq!(RESPONSE_UNIQUE_INDEX, "idx_response_evaluator");
}

#[test]
fn test_evaluation_row_serialization() {
    let record = sample_record(EvaluationStatus::Active);
    let row = EvaluationRow::from(&record);

    let json = serde_json::to_value(&row).expect("Failed to serialize");
    assert_eq!(json["evaluation_id"], record.id.0.as_str());
    assert_eq!(json["status"], "active");
    assert_eq!(json["semester"], "Spring");
    assert_eq!(json["category"], "Student");
    assert_eq!(json["subject"], "instructor-1");
    assert_eq!(json["response_count"], 0);
    assert!(json.get("id").is_none(), "record id must be left to SurrealDB");

    let weights: Vec<u64> = json["criteria"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["weight"].as_u64().unwrap())
        .collect();
    assert_eq!(weights, vec![60, 40]);
}

#[test]
fn test_evaluation_row_into_record() {
    let record = sample_record(EvaluationStatus::Completed);
    let back = EvaluationRow::from(&record).into_record().unwrap();
    assert_eq!(back, record);
}

#[test]
fn test_evaluation_row_rejects_unknown_status() {
    let mut row = EvaluationRow::from(&sample_record(EvaluationStatus::Draft));
    row.status = "paused".to_string();
    let err = row.into_record().unwrap_err();
    assert!(err.is_fault());
    assert!(err.to_string().contains("paused"));
}

#[test]
fn test_response_row_serialization() {
    let record = sample_record(EvaluationStatus::Active);
    let mut response = sample_response(&record, "student-7", 30);
    response.evaluator.role = Role::Instructor;
    response.client.ip_address = Some("10.0.0.5".to_string());

    let row = ResponseRow::from(&response);
    let json = serde_json::to_value(&row).expect("Failed to serialize");
    assert_eq!(json["evaluator_id"], "student-7");
    assert_eq!(json["evaluator_role"], "instructor");
    assert_eq!(json["total"], 60);
    assert_eq!(json["ip_address"], "10.0.0.5");
    assert!(json["user_agent"].is_null());

    let back = row.into_record().unwrap();
    assert_eq!(back, response);
}

#[test]
fn test_legacy_role_strings_load() {
    let record = sample_record(EvaluationStatus::Active);
    let mut row = ResponseRow::from(&sample_response(&record, "hr-1", 10));
    row.evaluator_role = "Human_resours".to_string();
    let back = row.into_record().unwrap();
    assert_eq!(back.evaluator.role, Role::HumanResource);
}
