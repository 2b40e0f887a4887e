//! Row definitions for the SurrealDB tables
//!
//! Tables:
//! - evaluations: evaluation records with their running counters
//! - responses: immutable responses, unique per (evaluation_id, evaluator_id)
//!
//! Rows store enums as their canonical strings and datetimes as SurrealDB
//! datetimes. Conversion to and from the `storage_traits` types happens here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{
    ClientMeta, Criterion, EvaluationId, EvaluationRecord, EvaluatorRef, ResponseId,
    ResponseRecord, ScoreLine, StorageResult, UserId,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
pub(crate) mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

fn parse_label<T>(value: &str) -> StorageResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| StorageError::Serialization(e.to_string()))
}

/// Evaluation row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub evaluation_id: String,
    pub title: String,
    pub description: String,
    pub academic_year: String,
    pub semester: String,
    pub category: String,
    pub subject: String,
    pub course_code: Option<String>,
    pub department: String,
    pub criteria: Vec<Criterion>,
    /// "draft" | "active" | "completed" | "archived"
    pub status: String,
    #[serde(with = "surreal_datetime")]
    pub start_date: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub end_date: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub response_ids: Vec<String>,
    #[serde(default)]
    pub response_count: u64,
    #[serde(default)]
    pub score_sum: u64,
}

impl From<&EvaluationRecord> for EvaluationRow {
    fn from(record: &EvaluationRecord) -> Self {
        EvaluationRow {
            id: None,
            evaluation_id: record.id.0.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            academic_year: record.academic_year.clone(),
            semester: record.semester.as_str().to_string(),
            category: record.category.as_str().to_string(),
            subject: record.subject.0.clone(),
            course_code: record.course_code.clone(),
            department: record.department.clone(),
            criteria: record.criteria.clone(),
            status: record.status.as_str().to_string(),
            start_date: record.start_date,
            end_date: record.end_date,
            created_by: record.created_by.0.clone(),
            updated_by: record.updated_by.as_ref().map(|u| u.0.clone()),
            created_at: record.created_at,
            updated_at: record.updated_at,
            response_ids: record.response_ids.iter().map(|r| r.0.clone()).collect(),
            response_count: record.response_count,
            score_sum: record.score_sum,
        }
    }
}

impl EvaluationRow {
    /// Convert a DB row into an `EvaluationRecord`.
    pub fn into_record(self) -> StorageResult<EvaluationRecord> {
        Ok(EvaluationRecord {
            id: EvaluationId(self.evaluation_id),
            title: self.title,
            description: self.description,
            academic_year: self.academic_year,
            semester: parse_label(&self.semester)?,
            category: parse_label(&self.category)?,
            subject: UserId(self.subject),
            course_code: self.course_code,
            department: self.department,
            criteria: self.criteria,
            status: parse_label(&self.status)?,
            start_date: self.start_date,
            end_date: self.end_date,
            created_by: UserId(self.created_by),
            updated_by: self.updated_by.map(UserId),
            created_at: self.created_at,
            updated_at: self.updated_at,
            response_ids: self.response_ids.into_iter().map(ResponseId).collect(),
            response_count: self.response_count,
            score_sum: self.score_sum,
        })
    }
}

/// Editable fields written by `replace_draft` via `MERGE`
#[derive(Debug, Clone, Serialize)]
pub struct DraftPatch {
    pub title: String,
    pub description: String,
    pub academic_year: String,
    pub semester: String,
    pub category: String,
    pub subject: String,
    pub course_code: Option<String>,
    pub department: String,
    pub criteria: Vec<Criterion>,
    #[serde(with = "surreal_datetime")]
    pub start_date: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub end_date: DateTime<Utc>,
    pub updated_by: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl From<&EvaluationRecord> for DraftPatch {
    fn from(record: &EvaluationRecord) -> Self {
        let row = EvaluationRow::from(record);
        DraftPatch {
            title: row.title,
            description: row.description,
            academic_year: row.academic_year,
            semester: row.semester,
            category: row.category,
            subject: row.subject,
            course_code: row.course_code,
            department: row.department,
            criteria: row.criteria,
            start_date: row.start_date,
            end_date: row.end_date,
            updated_by: row.updated_by,
            updated_at: row.updated_at,
        }
    }
}

/// Response row stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub response_id: String,
    pub evaluation_id: String,
    /// Half of the (evaluation_id, evaluator_id) unique key
    pub evaluator_id: String,
    pub evaluator_role: String,
    pub course_code: Option<String>,
    pub scores: Vec<ScoreLine>,
    pub overall_comment: Option<String>,
    pub total: u32,
    #[serde(with = "surreal_datetime")]
    pub submitted_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl From<&ResponseRecord> for ResponseRow {
    fn from(response: &ResponseRecord) -> Self {
        ResponseRow {
            id: None,
            response_id: response.id.0.clone(),
            evaluation_id: response.evaluation_id.0.clone(),
            evaluator_id: response.evaluator.id.0.clone(),
            evaluator_role: response.evaluator.role.as_str().to_string(),
            course_code: response.course_code.clone(),
            scores: response.scores.clone(),
            overall_comment: response.overall_comment.clone(),
            total: response.total,
            submitted_at: response.submitted_at,
            ip_address: response.client.ip_address.clone(),
            user_agent: response.client.user_agent.clone(),
        }
    }
}

impl ResponseRow {
    /// Convert a DB row into a `ResponseRecord`.
    pub fn into_record(self) -> StorageResult<ResponseRecord> {
        Ok(ResponseRecord {
            id: ResponseId(self.response_id),
            evaluation_id: EvaluationId(self.evaluation_id),
            evaluator: EvaluatorRef {
                id: UserId(self.evaluator_id),
                role: parse_label(&self.evaluator_role)?,
            },
            course_code: self.course_code,
            scores: self.scores,
            overall_comment: self.overall_comment,
            total: self.total,
            submitted_at: self.submitted_at,
            client: ClientMeta {
                ip_address: self.ip_address,
                user_agent: self.user_agent,
            },
        })
    }
}
