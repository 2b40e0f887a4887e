//! Coordinator input for creating or editing an evaluation.

use appraisal_state::{EvaluationCategory, EvaluationRecord, Semester, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::criteria::CriterionDraft;
use super::error::{AppraisalError, Result};

/// Editable fields of an evaluation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub academic_year: String,
    pub semester: Semester,
    pub category: EvaluationCategory,
    /// Instructor being evaluated
    pub subject: UserId,
    #[serde(default)]
    pub course_code: Option<String>,
    /// Defaults to the subject's department when omitted
    #[serde(default)]
    pub department: Option<String>,
    pub criteria: Vec<CriterionDraft>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl EvaluationDraft {
    /// Field-level checks that need no collaborator.
    pub fn check_fields(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(AppraisalError::InvalidDraft("title is required".to_string()));
        }
        if self.academic_year.trim().is_empty() {
            return Err(AppraisalError::InvalidDraft(
                "academic year is required".to_string(),
            ));
        }
        if self.end_date <= self.start_date {
            return Err(AppraisalError::InvalidDraft(format!(
                "end date {} must be after start date {}",
                self.end_date, self.start_date
            )));
        }
        Ok(())
    }
}

impl From<&EvaluationRecord> for EvaluationDraft {
    fn from(record: &EvaluationRecord) -> Self {
        Self {
            title: record.title.clone(),
            description: record.description.clone(),
            academic_year: record.academic_year.clone(),
            semester: record.semester,
            category: record.category,
            subject: record.subject.clone(),
            course_code: record.course_code.clone(),
            department: Some(record.department.clone()),
            criteria: record.criteria.iter().map(CriterionDraft::from).collect(),
            start_date: record.start_date,
            end_date: record.end_date,
        }
    }
}
