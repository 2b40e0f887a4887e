//! Read models returned to callers.

use appraisal_state::{
    EvaluationCategory, EvaluationFilter, EvaluationId, EvaluationRecord, EvaluationStatus,
    Semester, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregator::{self, Aggregate};
use crate::visibility::Access;

const SECONDS_PER_DAY: i64 = 86_400;

/// Length of the window in whole days, rounded up.
pub fn duration_days(record: &EvaluationRecord) -> i64 {
    let seconds = (record.end_date - record.start_date).num_seconds().max(0);
    (seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
}

/// Listing request: filters plus 1-based paging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub filter: EvaluationFilter,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl ListQuery {
    pub fn with_filter(filter: EvaluationFilter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn page(mut self, page: u32, limit: u32) -> Self {
        self.page = Some(page);
        self.limit = Some(limit);
        self
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u32, limit: u32, total: u64) -> Self {
        let total_pages = total.div_ceil(u64::from(limit.max(1)));
        Self {
            items,
            page,
            limit,
            total,
            total_pages,
        }
    }
}

/// Listing row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub id: EvaluationId,
    pub title: String,
    pub academic_year: String,
    pub semester: Semester,
    pub category: EvaluationCategory,
    pub subject: UserId,
    pub course_code: Option<String>,
    pub department: String,
    pub status: EvaluationStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub aggregate: Aggregate,
    pub access: Access,
    /// Active and inside the window right now.
    pub is_open: bool,
    /// Open, addressed to the caller and not yet answered by them.
    pub can_submit: bool,
}

impl EvaluationSummary {
    pub fn new(record: &EvaluationRecord, access: Access, is_open: bool, can_submit: bool) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            academic_year: record.academic_year.clone(),
            semester: record.semester,
            category: record.category,
            subject: record.subject.clone(),
            course_code: record.course_code.clone(),
            department: record.department.clone(),
            status: record.status,
            start_date: record.start_date,
            end_date: record.end_date,
            created_at: record.created_at,
            aggregate: aggregator::from_counters(record),
            access,
            is_open,
            can_submit,
        }
    }
}

/// Full view of one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationDetail {
    #[serde(flatten)]
    pub record: EvaluationRecord,
    pub aggregate: Aggregate,
    pub duration_days: i64,
    pub access: Access,
    pub is_open: bool,
    pub can_submit: bool,
}

impl EvaluationDetail {
    pub fn new(record: EvaluationRecord, access: Access, is_open: bool, can_submit: bool) -> Self {
        Self {
            aggregate: aggregator::from_counters(&record),
            duration_days: duration_days(&record),
            record,
            access,
            is_open,
            can_submit,
        }
    }
}
