//! Appraisal - evaluation administration CLI
//!
//! The `appraisal` command drives the evaluation engine against a SurrealDB
//! store. Every command acts on behalf of a caller given by `--caller`,
//! `--role` and optionally `--department` (or the matching `APPRAISAL_*`
//! environment variables). Output is JSON on stdout; logs go to stderr.
//!
//! ## Commands
//!
//! - `create` / `update`: write a draft from a JSON file
//! - `list` / `show`: read evaluations visible to the caller
//! - `transition` / `delete`: lifecycle changes
//! - `submit` / `can-submit`: respond to an open evaluation
//! - `responses` / `rebuild`: coordinator views of the collected responses

use anyhow::{Context, Result};
use appraisal_core::{
    Caller, EngineConfig, EvaluationCategory, EvaluationDraft, EvaluationFilter, EvaluationId,
    EvaluationService, EvaluationStatus, EvaluationStore, ListQuery, MemoryDirectory, Role,
    Semester, Submission, UserDirectory, UserId, WeightPolicy,
};
use appraisal_state::{SurrealEvaluationStore, SurrealHandle};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "appraisal")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Performance evaluation lifecycle and response aggregation", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Acting user id
    #[arg(long, global = true, env = "APPRAISAL_CALLER")]
    caller: Option<String>,

    /// Acting user role (e.g. quality_officer, instructor, student)
    #[arg(long, global = true, env = "APPRAISAL_ROLE")]
    role: Option<Role>,

    /// Acting user department (looked up in the roster when omitted)
    #[arg(long, global = true, env = "APPRAISAL_DEPARTMENT")]
    department: Option<String>,

    /// JSON roster of users, roles and departments
    #[arg(long, global = true, env = "APPRAISAL_ROSTER")]
    roster: Option<PathBuf>,

    /// Database URL (e.g. mem://, surrealkv://path, ws://host:8000).
    /// Falls back to SURREALDB_* variables, then a local store.
    #[arg(long, global = true)]
    db: Option<String>,

    /// Override APPRAISAL_WEIGHT_POLICY
    #[arg(long, global = true)]
    weight_policy: Option<WeightPolicy>,

    /// Override APPRAISAL_PAGE_SIZE
    #[arg(long, global = true)]
    page_size: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a draft evaluation from a JSON file
    Create {
        /// Path to the evaluation draft (JSON)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Replace the fields of a draft evaluation
    Update {
        /// Evaluation ID
        id: String,

        /// Path to the evaluation draft (JSON)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List evaluations visible to the caller
    List {
        #[arg(long)]
        status: Option<EvaluationStatus>,

        #[arg(long)]
        department: Option<String>,

        /// Subject instructor id
        #[arg(long)]
        subject: Option<String>,

        #[arg(long)]
        academic_year: Option<String>,

        #[arg(long)]
        semester: Option<Semester>,

        #[arg(long)]
        category: Option<EvaluationCategory>,

        /// Page number, starting at 1
        #[arg(long)]
        page: Option<u32>,

        /// Page size
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Show one evaluation with its aggregate
    Show {
        /// Evaluation ID
        id: String,
    },

    /// Move an evaluation to the next status
    Transition {
        /// Evaluation ID
        id: String,

        /// Target status (active, completed, archived)
        #[arg(long)]
        to: EvaluationStatus,
    },

    /// Delete an evaluation that has no responses
    Delete {
        /// Evaluation ID
        id: String,
    },

    /// Submit a response from a JSON file
    Submit {
        /// Evaluation ID
        id: String,

        /// Path to the submission (JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Client IP address to record
        #[arg(long)]
        ip: Option<String>,

        /// Client user agent to record
        #[arg(long)]
        user_agent: Option<String>,
    },

    /// Check whether the caller may submit right now
    CanSubmit {
        /// Evaluation ID
        id: String,
    },

    /// List all responses of an evaluation (coordinators only)
    Responses {
        /// Evaluation ID
        id: String,
    },

    /// Recompute the aggregate and compare it with the stored counters
    Rebuild {
        /// Evaluation ID
        id: String,
    },
}

impl Cli {
    fn acting_caller(&self) -> Result<Caller> {
        let id = self
            .caller
            .clone()
            .context("--caller (or APPRAISAL_CALLER) is required")?;
        let role = self
            .role
            .context("--role (or APPRAISAL_ROLE) is required")?;
        let mut caller = Caller::new(id, role);
        if let Some(department) = self.department.as_deref().map(str::trim) {
            if !department.is_empty() {
                caller = caller.with_department(department);
            }
        }
        Ok(caller)
    }

    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = EngineConfig::from_env().context("Invalid engine configuration")?;
        if let Some(policy) = self.weight_policy {
            config = config.with_weight_policy(policy);
        }
        if let Some(size) = self.page_size {
            config = config.with_page_size(size);
        }
        Ok(config)
    }

    fn directory(&self) -> Result<MemoryDirectory> {
        match &self.roster {
            Some(path) => {
                let directory = MemoryDirectory::from_path(path)
                    .with_context(|| format!("Failed to load roster {}", path.display()))?;
                info!(entries = directory.len(), "roster loaded");
                Ok(directory)
            }
            None => {
                warn!("no roster configured; subjects and caller departments cannot be resolved");
                Ok(MemoryDirectory::new())
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    appraisal_core::telemetry::init_tracing(cli.json, level);

    let caller = cli.acting_caller()?;
    let config = cli.engine_config()?;
    let directory = cli.directory()?;

    let handle = match &cli.db {
        Some(url) => SurrealHandle::setup_url(url).await,
        None => SurrealHandle::setup_from_env().await,
    }
    .context("Failed to connect to appraisal database")?;

    let service = EvaluationService::new(SurrealEvaluationStore::new(handle), directory, config);
    let output = execute(&service, &caller, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Run one command and return its JSON output.
async fn execute<S, D>(
    service: &EvaluationService<S, D>,
    caller: &Caller,
    command: Commands,
) -> Result<Value>
where
    S: EvaluationStore,
    D: UserDirectory,
{
    let output = match command {
        Commands::Create { file } => {
            let draft: EvaluationDraft = read_json(&file)?;
            serde_json::to_value(service.create_evaluation(caller, &draft).await?)?
        }
        Commands::Update { id, file } => {
            let draft: EvaluationDraft = read_json(&file)?;
            let id = EvaluationId::from(id);
            serde_json::to_value(service.update_evaluation(caller, &id, &draft).await?)?
        }
        Commands::List {
            status,
            department,
            subject,
            academic_year,
            semester,
            category,
            page,
            limit,
        } => {
            let query = ListQuery {
                filter: EvaluationFilter {
                    subject: subject.map(UserId::from),
                    department,
                    status,
                    academic_year,
                    semester,
                    category,
                },
                page,
                limit,
            };
            serde_json::to_value(service.list_evaluations(caller, &query).await?)?
        }
        Commands::Show { id } => {
            let id = EvaluationId::from(id);
            serde_json::to_value(service.get_evaluation(caller, &id).await?)?
        }
        Commands::Transition { id, to } => {
            let id = EvaluationId::from(id);
            serde_json::to_value(service.transition_evaluation(caller, &id, to).await?)?
        }
        Commands::Delete { id } => {
            let id = EvaluationId::from(id);
            service.delete_evaluation(caller, &id).await?;
            serde_json::json!({ "deleted": id })
        }
        Commands::Submit {
            id,
            file,
            ip,
            user_agent,
        } => {
            let mut submission: Submission = read_json(&file)?;
            if ip.is_some() {
                submission.client.ip_address = ip;
            }
            if user_agent.is_some() {
                submission.client.user_agent = user_agent;
            }
            let id = EvaluationId::from(id);
            serde_json::to_value(service.submit_response(caller, &id, submission).await?)?
        }
        Commands::CanSubmit { id } => {
            let id = EvaluationId::from(id);
            let allowed = service.can_submit(caller, &id).await?;
            serde_json::json!({ "evaluation_id": id, "can_submit": allowed })
        }
        Commands::Responses { id } => {
            let id = EvaluationId::from(id);
            serde_json::to_value(service.list_responses(caller, &id).await?)?
        }
        Commands::Rebuild { id } => {
            let id = EvaluationId::from(id);
            serde_json::to_value(service.rebuild_aggregate(caller, &id).await?)?
        }
    };
    Ok(output)
}
