//! Read-only aggregates over the caller's own tasks.

use crate::auth::SharedState;
use crate::error::ApiError;
use crate::models::{DashboardSummary, StatusCounts, Task, User};
use axum::{extract::State, Extension, Json};

pub const RECENT_LIMIT: usize = 10;

/// Percentage of completed tasks, rounded half up; 0 for no tasks.
pub fn completion_rate(completed: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    (completed * 200 + total) / (total * 2)
}

// GET /api/dashboard/summary
pub async fn summary(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
) -> Result<Json<DashboardSummary>, ApiError> {
    let StatusCounts { active, completed } = state.store.count_tasks_by_status(user.id)?;
    let total = active + completed;

    Ok(Json(DashboardSummary {
        total_tasks: total,
        active_tasks: active,
        completed_tasks: completed,
        completion_rate: completion_rate(completed, total),
    }))
}

// GET /api/dashboard/recent
pub async fn recent(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.store.list_recent_tasks_by_user(user.id, RECENT_LIMIT)?))
}

// GET /api/dashboard/by-status
pub async fn tasks_by_status(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
) -> Result<Json<StatusCounts>, ApiError> {
    Ok(Json(state.store.count_tasks_by_status(user.id)?))
}
