//! Storage trait definitions for evaluation records and responses
//!
//! This module defines the persisted shapes and the single storage
//! abstraction the engine talks to:
//! - `EvaluationRecord`: one evaluation round (criteria, window, audience, status)
//! - `ResponseRecord`: one evaluator's immutable submission
//! - `EvaluationStore`: async, backend-agnostic persistence
//!
//! In-memory fakes live in the `fakes` module; the SurrealDB implementation
//! lives in `surreal_store`.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// Collapse a free-text label to a comparison key: lowercase with `_`, `-`
/// and whitespace removed. `"Self_Evaluation"`, `"self-evaluation"` and
/// `"SelfEvaluation"` all become `"selfevaluation"`.
pub fn normalize_label(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '_' | '-') && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// A label that does not name any known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownLabel {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! label_serde {
    ($ty:ty) => {
        impl TryFrom<String> for $ty {
            type Error = UnknownLabel;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.as_str().to_string()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name(value)
            }
        }
    };
}

macro_rules! generated_id {
    ($name:ident) => {
        impl $name {
            /// Generate a new random identifier
            pub fn new() -> Self {
                $name(uuid::Uuid::new_v4().to_string())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

opaque_id!(
    /// Unique identifier of an evaluation record
    EvaluationId
);
opaque_id!(
    /// Unique identifier of a recorded response
    ResponseId
);
opaque_id!(
    /// Identifier of one criterion inside an evaluation's criterion set
    CriterionId
);
opaque_id!(
    /// Identity issued by the identity/session collaborator
    UserId
);

generated_id!(EvaluationId);
generated_id!(ResponseId);
generated_id!(CriterionId);

// ---------------------------------------------------------------------------
// Closed enumerations
// ---------------------------------------------------------------------------

/// Organisational role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    QualityOfficer,
    Admin,
    DepartmentHead,
    CollegeDean,
    ViceAcademy,
    HumanResource,
    Instructor,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::QualityOfficer => "quality_officer",
            Role::Admin => "admin",
            Role::DepartmentHead => "department_head",
            Role::CollegeDean => "college_dean",
            Role::ViceAcademy => "vice_academy",
            Role::HumanResource => "human_resource",
            Role::Instructor => "instructor",
            Role::Student => "student",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "qualityofficer" | "qualityoffice" => Ok(Role::QualityOfficer),
            "admin" | "administrator" => Ok(Role::Admin),
            "departmenthead" => Ok(Role::DepartmentHead),
            "collegedean" | "collegedien" => Ok(Role::CollegeDean),
            "viceacademy" => Ok(Role::ViceAcademy),
            "humanresource" | "humanresources" | "humanresours" => Ok(Role::HumanResource),
            "instructor" | "instractor" => Ok(Role::Instructor),
            "student" | "students" => Ok(Role::Student),
            _ => Err(UnknownLabel {
                kind: "role",
                value: s.to_string(),
            }),
        }
    }
}

label_serde!(Role);

/// Availability state of an evaluation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationStatus {
    Draft,
    Active,
    Completed,
    Archived,
}

impl EvaluationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationStatus::Draft => "draft",
            EvaluationStatus::Active => "active",
            EvaluationStatus::Completed => "completed",
            EvaluationStatus::Archived => "archived",
        }
    }
}

impl FromStr for EvaluationStatus {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "draft" => Ok(EvaluationStatus::Draft),
            "active" => Ok(EvaluationStatus::Active),
            "completed" => Ok(EvaluationStatus::Completed),
            "archived" => Ok(EvaluationStatus::Archived),
            _ => Err(UnknownLabel {
                kind: "status",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Academic semester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Semester {
    Spring,
    Summer,
    Fall,
}

impl Semester {
    pub fn as_str(&self) -> &'static str {
        match self {
            Semester::Spring => "Spring",
            Semester::Summer => "Summer",
            Semester::Fall => "Fall",
        }
    }
}

impl FromStr for Semester {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "spring" => Ok(Semester::Spring),
            "summer" => Ok(Semester::Summer),
            "fall" | "autumn" => Ok(Semester::Fall),
            _ => Err(UnknownLabel {
                kind: "semester",
                value: s.to_string(),
            }),
        }
    }
}

label_serde!(Semester);

/// Audience an evaluation is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EvaluationCategory {
    /// Peer evaluation by instructors of the same department.
    CollegeTeam,
    /// The subject instructor evaluates themself.
    SelfEvaluation,
    /// Evaluation by the subject's supervisor.
    ImmediateSupervisor,
    /// Evaluation by students of the department.
    Student,
}

impl EvaluationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationCategory::CollegeTeam => "CollegeTeam",
            EvaluationCategory::SelfEvaluation => "SelfEvaluation",
            EvaluationCategory::ImmediateSupervisor => "ImmediateSupervisor",
            EvaluationCategory::Student => "Student",
        }
    }
}

impl FromStr for EvaluationCategory {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "collegeteam" | "peer" => Ok(EvaluationCategory::CollegeTeam),
            "selfevaluation" | "self" => Ok(EvaluationCategory::SelfEvaluation),
            "immediatesupervisor" | "supervisor" => Ok(EvaluationCategory::ImmediateSupervisor),
            "student" | "students" => Ok(EvaluationCategory::Student),
            _ => Err(UnknownLabel {
                kind: "category",
                value: s.to_string(),
            }),
        }
    }
}

label_serde!(EvaluationCategory);

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One scored dimension with a point weight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: CriterionId,
    /// Short label, e.g. "Teaching Effectiveness"
    pub category: String,
    pub description: String,
    /// Maximum points a rating may award on this criterion
    pub weight: u32,
}

/// Full evaluation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub id: EvaluationId,
    pub title: String,
    pub description: String,
    pub academic_year: String,
    pub semester: Semester,
    pub category: EvaluationCategory,
    /// Instructor being evaluated
    pub subject: UserId,
    pub course_code: Option<String>,
    pub department: String,
    pub criteria: Vec<Criterion>,
    pub status: EvaluationStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub created_by: UserId,
    pub updated_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Append-only references to recorded responses
    pub response_ids: Vec<ResponseId>,
    pub response_count: u64,
    /// Sum of every recorded response's own total
    pub score_sum: u64,
}

impl EvaluationRecord {
    /// Whether `now` falls inside `[start_date, end_date]`.
    pub fn window_contains(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && now <= self.end_date
    }

    pub fn criterion(&self, id: &CriterionId) -> Option<&Criterion> {
        self.criteria.iter().find(|c| &c.id == id)
    }

    /// Highest total a single response can reach (sum of weights).
    pub fn max_score(&self) -> u32 {
        self.criteria.iter().map(|c| c.weight).sum()
    }

    /// Course and term this record reserves: only one non-archived record
    /// may hold a given `(course_code, academic_year, semester)`. Records
    /// without a course code, and archived ones, reserve nothing.
    pub fn course_term(&self) -> Option<(&str, &str, Semester)> {
        if self.status == EvaluationStatus::Archived {
            return None;
        }
        self.course_code
            .as_deref()
            .map(|code| (code, self.academic_year.as_str(), self.semester))
    }

    /// The error reported when another record already holds this course term.
    pub fn course_term_taken(&self) -> StorageError {
        StorageError::CourseTermTaken {
            course_code: self.course_code.clone().unwrap_or_default(),
            academic_year: self.academic_year.clone(),
            semester: self.semester.as_str().to_string(),
        }
    }
}

/// Rating of one criterion inside a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreLine {
    pub criterion_id: CriterionId,
    pub rating: u32,
    pub comment: Option<String>,
}

/// Who submitted a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorRef {
    pub id: UserId,
    pub role: Role,
}

/// Transport metadata captured at submission time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// One evaluator's completed submission. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub id: ResponseId,
    pub evaluation_id: EvaluationId,
    pub evaluator: EvaluatorRef,
    pub course_code: Option<String>,
    pub scores: Vec<ScoreLine>,
    pub overall_comment: Option<String>,
    /// Sum of the ratings in `scores`
    pub total: u32,
    pub submitted_at: DateTime<Utc>,
    pub client: ClientMeta,
}

/// Conjunctive listing filter; `None` fields match everything.
/// `department` compares by [`normalize_label`], like visibility does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationFilter {
    pub subject: Option<UserId>,
    pub department: Option<String>,
    pub status: Option<EvaluationStatus>,
    pub academic_year: Option<String>,
    pub semester: Option<Semester>,
    pub category: Option<EvaluationCategory>,
}

impl EvaluationFilter {
    pub fn matches(&self, record: &EvaluationRecord) -> bool {
        self.subject.as_ref().map_or(true, |s| &record.subject == s)
            && self
                .department
                .as_ref()
                .map_or(true, |d| normalize_label(&record.department) == normalize_label(d))
            && self.status.map_or(true, |s| record.status == s)
            && self
                .academic_year
                .as_ref()
                .map_or(true, |y| &record.academic_year == y)
            && self.semester.map_or(true, |s| record.semester == s)
            && self.category.map_or(true, |c| record.category == c)
    }
}

// ---------------------------------------------------------------------------
// EvaluationStore
// ---------------------------------------------------------------------------

/// Durable store for evaluation records and their responses.
///
/// Guarantees:
/// - At most one response exists per `(evaluation_id, evaluator.id)`; the
///   constraint lives in the store, never in a read-then-write by the caller.
/// - `commit_response` inserts the response and brings `response_ids`,
///   `response_count` and `score_sum` in line with the stored responses as
///   one atomic unit, and only while the record is `active`.
/// - Status changes are compare-and-set and never touch the counters.
/// - Deletion only succeeds while `response_count == 0`.
/// - At most one non-archived record holds a given course term (see
///   [`EvaluationRecord::course_term`]); the check and the write are one unit.
#[async_trait]
pub trait EvaluationStore: Send + Sync {
    /// Insert a new record. Fails with `Conflict` if the id is taken and with
    /// `CourseTermTaken` if another non-archived record holds its course term.
    async fn insert_evaluation(&self, record: &EvaluationRecord) -> StorageResult<()>;

    /// Fetch a record by id.
    async fn get_evaluation(&self, id: &EvaluationId) -> StorageResult<Option<EvaluationRecord>>;

    /// List records matching `filter`, newest `created_at` first.
    async fn list_evaluations(
        &self,
        filter: &EvaluationFilter,
    ) -> StorageResult<Vec<EvaluationRecord>>;

    /// Overwrite the editable fields of a record that is still `draft`.
    /// Fails with `CourseTermTaken` if the new course term is held elsewhere.
    async fn replace_draft(&self, record: &EvaluationRecord) -> StorageResult<EvaluationRecord>;

    /// Move a record from `from` to `to`, failing with `StatusConflict` if the
    /// stored status is no longer `from`.
    async fn transition_status(
        &self,
        id: &EvaluationId,
        from: EvaluationStatus,
        to: EvaluationStatus,
        by: &UserId,
        at: DateTime<Utc>,
    ) -> StorageResult<EvaluationRecord>;

    /// Delete a record with no responses, returning the deleted record.
    async fn delete_evaluation(&self, id: &EvaluationId) -> StorageResult<EvaluationRecord>;

    /// Atomically record a response and return the updated evaluation.
    async fn commit_response(&self, response: &ResponseRecord) -> StorageResult<EvaluationRecord>;

    /// All responses of an evaluation, oldest first.
    async fn list_responses(&self, id: &EvaluationId) -> StorageResult<Vec<ResponseRecord>>;

    /// Advisory lookup of an evaluator's response.
    async fn find_response(
        &self,
        id: &EvaluationId,
        evaluator: &UserId,
    ) -> StorageResult<Option<ResponseRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_label_strips_separators_and_case() {
        assert_eq!(normalize_label("Self_Evaluation"), "selfevaluation");
        assert_eq!(normalize_label("quality-officer"), "qualityofficer");
        assert_eq!(normalize_label(" College Team "), "collegeteam");
    }

    #[test]
    fn role_accepts_historical_spellings() {
        assert_eq!("Human_resours".parse::<Role>().unwrap(), Role::HumanResource);
        assert_eq!("quality_officer".parse::<Role>().unwrap(), Role::QualityOfficer);
        assert_eq!("Vice_academy".parse::<Role>().unwrap(), Role::ViceAcademy);
        assert_eq!("Student".parse::<Role>().unwrap(), Role::Student);
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn category_accepts_client_labels() {
        assert_eq!(
            "College_Team".parse::<EvaluationCategory>().unwrap(),
            EvaluationCategory::CollegeTeam
        );
        assert_eq!(
            "Self_Evaluation".parse::<EvaluationCategory>().unwrap(),
            EvaluationCategory::SelfEvaluation
        );
        assert_eq!(
            "students".parse::<EvaluationCategory>().unwrap(),
            EvaluationCategory::Student
        );
    }

    #[test]
    fn labels_serialize_canonically_and_parse_loosely() {
        let json = serde_json::to_string(&Role::DepartmentHead).unwrap();
        assert_eq!(json, "\"department_head\"");

        let role: Role = serde_json::from_str("\"Department_Head\"").unwrap();
        assert_eq!(role, Role::DepartmentHead);

        let status: EvaluationStatus = serde_json::from_str("\"active\"").unwrap();
        assert_eq!(status, EvaluationStatus::Active);

        let err = serde_json::from_str::<Semester>("\"Winter\"").unwrap_err();
        assert!(err.to_string().contains("unknown semester"));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(EvaluationId::new(), EvaluationId::new());
        assert_ne!(ResponseId::new(), ResponseId::new());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = UserId::from("u-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"u-1\"");
    }

    #[test]
    fn filter_default_matches_everything() {
        let filter = EvaluationFilter::default();
        let record = crate::fakes::sample_record(EvaluationStatus::Draft);
        assert!(filter.matches(&record));

        let filter = EvaluationFilter {
            status: Some(EvaluationStatus::Active),
            ..Default::default()
        };
        assert!(!filter.matches(&record));
    }

    #[test]
    fn filter_department_ignores_case_and_separators() {
        let mut record = crate::fakes::sample_record(EvaluationStatus::Draft);
        record.department = "Computer Science".to_string();

        for department in ["computer science", "computer_science", "COMPUTER-SCIENCE"] {
            let filter = EvaluationFilter {
                department: Some(department.to_string()),
                ..Default::default()
            };
            assert!(filter.matches(&record), "{department}");
        }

        let filter = EvaluationFilter {
            department: Some("EE".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches(&record));
    }

    #[test]
    fn archived_or_courseless_records_reserve_no_term() {
        let mut record = crate::fakes::sample_record(EvaluationStatus::Active);
        let code = record.course_code.clone().unwrap();
        assert_eq!(
            record.course_term(),
            Some((code.as_str(), "2025", Semester::Spring))
        );

        record.status = EvaluationStatus::Archived;
        assert_eq!(record.course_term(), None);

        record.status = EvaluationStatus::Draft;
        record.course_code = None;
        assert_eq!(record.course_term(), None);
    }
}
