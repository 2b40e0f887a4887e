//! SurrealDB schema migrations and initialization
//!
//! Sets up the evaluation tables with their indexes. The unique index on
//! `responses(evaluation_id, evaluator_id)` is what enforces at-most-once
//! submission; it is part of the schema, not an optional optimisation.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Name of the unique index guarding one response per evaluator.
pub const RESPONSE_UNIQUE_INDEX: &str = "idx_response_evaluator";

/// Initialize all tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing appraisal SurrealDB schema");

    init_evaluations_table(db).await?;
    init_responses_table(db).await?;

    info!("appraisal schema initialization complete");
    Ok(())
}

/// Initialize `evaluations` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE evaluations {
///   evaluation_id:   STRING (unique)
///   title, description, academic_year, semester, category: STRING
///   subject:         STRING (indexed)
///   course_code:     STRING?
///   department:      STRING (indexed)
///   criteria:        ARRAY<OBJECT>
///   status:          STRING (enum: draft | active | completed | archived)
///   start_date:      DATETIME
///   end_date:        DATETIME
///   created_by:      STRING
///   updated_by:      STRING?
///   created_at:      DATETIME (indexed)
///   updated_at:      DATETIME
///   response_ids:    ARRAY<STRING> (rebuilt from responses on commit)
///   response_count:  INT (count of responses)
///   score_sum:       INT (sum of response totals)
/// }
/// ```
///
/// Constraints:
/// - `evaluation_id` is unique
/// - status transitions are compare-and-set (enforced in queries)
/// - counters are recomputed from `responses` inside the commit transaction
/// - at most one non-archived record per (course_code, academic_year, semester)
async fn init_evaluations_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing evaluations table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS evaluations SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete FULL;

        DEFINE INDEX IF NOT EXISTS idx_evaluation_id ON TABLE evaluations COLUMNS evaluation_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_evaluation_department ON TABLE evaluations COLUMNS department;
        DEFINE INDEX IF NOT EXISTS idx_evaluation_subject_status ON TABLE evaluations COLUMNS subject, status;
        DEFINE INDEX IF NOT EXISTS idx_evaluation_status_end ON TABLE evaluations COLUMNS status, end_date;
        DEFINE INDEX IF NOT EXISTS idx_evaluation_term ON TABLE evaluations COLUMNS academic_year, semester;
        DEFINE INDEX IF NOT EXISTS idx_evaluation_created_at ON TABLE evaluations COLUMNS created_at;
    "#;

    db.query(sql).await?.check()?;
    info!("evaluations table initialized");
    Ok(())
}

/// Initialize `responses` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE responses {
///   response_id:     STRING (unique)
///   evaluation_id:   STRING
///   evaluator_id:    STRING
///   evaluator_role:  STRING
///   course_code:     STRING?
///   scores:          ARRAY<OBJECT>
///   overall_comment: STRING?
///   total:           INT
///   submitted_at:    DATETIME
///   ip_address:      STRING?
///   user_agent:      STRING?
/// }
/// ```
///
/// Constraints:
/// - `(evaluation_id, evaluator_id)` is unique: the at-most-once guarantee
/// - responses are immutable (no update permission)
async fn init_responses_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing responses table");

    let sql = format!(
        r#"
        DEFINE TABLE IF NOT EXISTS responses SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete FULL;

        DEFINE INDEX IF NOT EXISTS {RESPONSE_UNIQUE_INDEX} ON TABLE responses COLUMNS evaluation_id, evaluator_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_response_id ON TABLE responses COLUMNS response_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_response_evaluation ON TABLE responses COLUMNS evaluation_id;
    "#
    );

    db.query(sql).await?.check()?;
    info!("responses table initialized");
    Ok(())
}
