//! Job model for background ingestion work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Scrape a source's bill list and upsert the results.
pub const SCRAPE_SOURCE: &str = "scrape-source";
/// Enrich already stored bills from their detail pages.
pub const SCRAPE_BILL_DETAILS: &str = "scrape-bill-details";

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "waiting" => Ok(JobState::Waiting),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            _ => Err(anyhow::anyhow!("Invalid job state: {}", s)),
        }
    }
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    pub force_refresh: bool,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Upper bound on bills visited by a details job
    pub detail_limit: Option<i64>,
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    pub job_type: String,
    pub source_id: String,
    #[builder(default)]
    pub options: Json<JobOptions>,

    // State
    #[builder(default = JobState::Waiting.to_string())]
    pub state: String,
    #[builder(default = 0)]
    pub progress: i32,
    #[builder(default = 0)]
    pub attempts_made: i32,
    #[builder(default = 3)]
    pub max_attempts: i32,
    #[builder(default)]
    pub result: Option<Json<serde_json::Value>>,
    #[builder(default)]
    pub failure_reason: Option<String>,

    // Scheduling (backoff is expressed as a future run_at)
    #[builder(default = Utc::now())]
    pub run_at: DateTime<Utc>,

    // Lease management
    #[builder(default)]
    pub lease_expires_at: Option<DateTime<Utc>>,
    #[builder(default)]
    pub worker_id: Option<String>,

    // Timestamps
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
    #[builder(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a scrape job for one source (convenience constructor)
    pub fn scrape_source(source_id: &str, force_refresh: bool, max_attempts: i32) -> Self {
        Self::builder()
            .job_type(SCRAPE_SOURCE)
            .source_id(source_id)
            .options(Json(JobOptions {
                force_refresh,
                submitted_at: Some(Utc::now()),
                detail_limit: None,
            }))
            .max_attempts(max_attempts)
            .build()
    }

    /// Create a details enrichment job for one source (convenience constructor)
    pub fn bill_details(source_id: &str, limit: i64, max_attempts: i32) -> Self {
        Self::builder()
            .job_type(SCRAPE_BILL_DETAILS)
            .source_id(source_id)
            .options(Json(JobOptions {
                force_refresh: false,
                submitted_at: Some(Utc::now()),
                detail_limit: Some(limit),
            }))
            .max_attempts(max_attempts)
            .build()
    }

    /// Parsed state. Unrecognized values are reported as failed.
    pub fn state(&self) -> JobState {
        self.state.parse().unwrap_or(JobState::Failed)
    }

    pub fn status_view(&self) -> JobStatusView {
        JobStatusView::from(self)
    }
}

// ============================================================================
// Status view
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobData {
    pub job_type: String,
    pub source_id: String,
    pub options: JobOptions,
}

/// What callers see when they ask about a job.
///
/// Only the latest failure reason and the current attempt count are exposed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub id: Uuid,
    pub state: JobState,
    pub progress: i32,
    pub data: JobData,
    pub attempts_made: i32,
    pub max_attempts: i32,
    pub result: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            state: job.state(),
            progress: job.progress,
            data: JobData {
                job_type: job.job_type.clone(),
                source_id: job.source_id.clone(),
                options: job.options.0.clone(),
            },
            attempts_made: job.attempts_made,
            max_attempts: job.max_attempts,
            result: job.result.as_ref().map(|r| r.0.clone()),
            failure_reason: job.failure_reason.clone(),
            created_at: job.created_at,
            finished_at: job.finished_at,
        }
    }
}
