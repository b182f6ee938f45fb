//! API request and response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::history::HistorySummary;
use crate::pipeline::{JobStatus, PeriodicEntry};
use crate::tasks::{Content, Task};

// ============================================================================
// Authentication Types
// ============================================================================

/// Login request body.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response with JWT token.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    /// JWT access token
    pub token: String,
    /// Token type (always "Bearer")
    pub token_type: String,
    /// Expiration time in seconds
    pub expires_in: u64,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub accepting_runs: bool,
}

// ============================================================================
// Task Types
// ============================================================================

/// Returned when a run is queued.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunQueuedResponse {
    /// Handle of the queued job
    pub task: Uuid,
    pub task_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobResponse {
    pub handle: Uuid,
    #[serde(flatten)]
    pub status: JobStatus,
}

/// Result of a declaration.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeclareResponse {
    pub task: Task,
    /// True when a new content version was recorded
    pub created: bool,
}

/// A task in listings.
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskSummary {
    #[serde(flatten)]
    pub task: Task,
    pub latest_version: Option<u32>,
    pub history: HistorySummary,
    pub last_run: Option<DateTime<Utc>>,
}

/// A task with its current definition.
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub content: Option<Content>,
    pub total_assets: usize,
    pub history: HistorySummary,
}

/// Query for task deletion.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    /// Remove contents and histories as well
    #[serde(default)]
    pub hard: bool,
}

// ============================================================================
// Log and Schedule Types
// ============================================================================

/// Query for a log tail read.
#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub mark: Option<String>,
}

/// A named schedule entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub name: String,
    #[serde(flatten)]
    pub entry: PeriodicEntry,
    pub last_fired: Option<DateTime<Utc>>,
}
