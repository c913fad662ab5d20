//! Task endpoints.
//!
//! Every handler runs the same gate in the same order: caller (resolved by
//! `auth_middleware`), rate limit for mutations, ownership for single-task
//! calls, then text validation. Any failure aborts before the store is touched.

use crate::auth::SharedState;
use crate::error::ApiError;
use crate::models::{
    Change, CreateTaskRequest, CreatedResponse, LiveMessage, Task, TaskPatch, TaskStatus,
    UpdateTaskRequest, User,
};
use crate::ratelimit::Bucket;
use crate::validate::{check_task_description, check_task_title, sanitize, sanitize_string};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;

/// Descriptions are cut here before the 2000-char check, so oversized input is
/// still reported as too long rather than silently shortened.
const DESCRIPTION_SANITIZE_MAX: usize = 5000;

/// Fetch a task and make sure `user` owns it.
fn owned_task(state: &SharedState, user: &User, id: Uuid) -> Result<Task, ApiError> {
    let task = state.store.get_task(id)?.ok_or(ApiError::NotFound)?;
    if task.user_id != user.id {
        tracing::warn!(task_id = %id, user_id = %user.id, "ownership check failed");
        return Err(ApiError::NotAuthorized);
    }
    Ok(task)
}

fn limit(state: &SharedState, bucket: Bucket, user: &User) -> Result<(), ApiError> {
    state.limiter.limit(bucket, &user.id.to_string())?;
    Ok(())
}

/// Sanitized title, validated.
fn clean_title(raw: &str) -> Result<String, ApiError> {
    let title = sanitize(raw);
    check_task_title(&title)?;
    Ok(title)
}

/// Sanitized description, validated. Empty after cleaning means none.
fn clean_description(raw: &str) -> Result<Option<String>, ApiError> {
    let description = sanitize_string(raw, DESCRIPTION_SANITIZE_MAX);
    check_task_description(Some(&description))?;
    Ok(Some(description).filter(|d| !d.is_empty()))
}

// POST /api/tasks
pub async fn create_task(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    limit(&state, Bucket::CreateTask, &user)?;

    let title = clean_title(&payload.title)?;
    let description = match payload.description.as_deref() {
        Some(raw) => clean_description(raw)?,
        None => None,
    };

    let task = state.store.create_task(user.id, title, description)?;
    tracing::info!(task_id = %task.id, user_id = %user.id, "task created");

    let id = task.id;
    state.publish(Change {
        user_id: user.id,
        event: LiveMessage::TaskCreated { task },
    });

    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

// GET /api/tasks
pub async fn list_tasks(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.store.list_tasks_by_user(user.id)?))
}

// GET /api/tasks/status/:status
pub async fn list_tasks_by_status(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Path(status): Path<TaskStatus>,
) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.store.list_tasks_by_user_and_status(user.id, status)?))
}

// GET /api/tasks/:id
pub async fn get_task(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(owned_task(&state, &user, id)?))
}

// PATCH /api/tasks/:id
pub async fn update_task(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, ApiError> {
    limit(&state, Bucket::UpdateTask, &user)?;
    owned_task(&state, &user, id)?;

    let patch = TaskPatch {
        title: payload.title.as_deref().map(clean_title).transpose()?,
        description: payload.description.as_deref().map(clean_description).transpose()?,
        status: payload.status,
    };

    let task = state.store.update_task(id, patch)?;
    tracing::info!(task_id = %id, user_id = %user.id, "task updated");

    state.publish(Change {
        user_id: user.id,
        event: LiveMessage::TaskUpdated { task: task.clone() },
    });
    Ok(Json(task))
}

// POST /api/tasks/:id/toggle
pub async fn toggle_task_status(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    limit(&state, Bucket::UpdateTask, &user)?;
    owned_task(&state, &user, id)?;

    let task = state.store.toggle_task_status(id)?;
    tracing::info!(task_id = %id, user_id = %user.id, status = ?task.status, "task toggled");

    state.publish(Change {
        user_id: user.id,
        event: LiveMessage::TaskUpdated { task: task.clone() },
    });
    Ok(Json(task))
}

// DELETE /api/tasks/:id
pub async fn remove_task(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    limit(&state, Bucket::DeleteTask, &user)?;
    owned_task(&state, &user, id)?;

    if !state.store.delete_task(id)? {
        // gone between the ownership check and the delete
        return Err(ApiError::NotFound);
    }
    tracing::info!(task_id = %id, user_id = %user.id, "task deleted");

    state.publish(Change {
        user_id: user.id,
        event: LiveMessage::TaskDeleted { task_id: id },
    });
    Ok(StatusCode::NO_CONTENT)
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AppState, TokenConfig};
    use crate::store::Store;
    use crate::validate::ValidationError;
    use std::fs;
    use std::sync::Arc;

    struct Fixture {
        state: SharedState,
        path: String,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.path);
        }
    }

    fn fixture(name: &str) -> Fixture {
        let path = format!("/tmp/todo_api_test_{name}_{}.redb", std::process::id());
        let _ = fs::remove_file(&path);
        let store = Store::open(&path).unwrap();
        let tokens = TokenConfig { secret: "test".into(), expiration_in_minutes: 5 };
        Fixture {
            state: Arc::new(AppState::new(store, tokens)),
            path,
        }
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "someone@example.com".into(),
            password_hash: String::new(),
            created_at: 0,
        }
    }

    async fn create(f: &Fixture, user: &User, title: &str) -> Result<Uuid, ApiError> {
        let (_, Json(created)) = create_task(
            State(f.state.clone()),
            Extension(user.clone()),
            Json(CreateTaskRequest { title: title.into(), description: None }),
        )
        .await?;
        Ok(created.id)
    }

    #[tokio::test]
    async fn create_then_list() {
        let f = fixture("create_list");
        let u = user();
        create(&f, &u, "  Buy milk \0").await.unwrap();

        let Json(tasks) = list_tasks(State(f.state.clone()), Extension(u.clone())).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Buy milk");
        assert_eq!(tasks[0].status, TaskStatus::Active);
        assert_eq!(tasks[0].created_at, tasks[0].updated_at);
    }

    #[tokio::test]
    async fn empty_title_inserts_nothing() {
        let f = fixture("empty_title");
        let u = user();
        let err = create(&f, &u, "   ").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(ValidationError::EmptyTitle)));
        assert_eq!(f.state.store.count_tasks_by_user(u.id).unwrap(), 0);
    }

    #[tokio::test]
    async fn oversized_fields_are_rejected() {
        let f = fixture("oversized");
        let u = user();
        let err = create(&f, &u, &"t".repeat(201)).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(ValidationError::TitleTooLong)));

        let err = create_task(
            State(f.state.clone()),
            Extension(u.clone()),
            Json(CreateTaskRequest { title: "ok".into(), description: Some("d".repeat(2001)) }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(ValidationError::DescriptionTooLong)));
    }

    #[tokio::test]
    async fn toggle_twice_restores_status() {
        let f = fixture("toggle_twice");
        let u = user();
        let id = create(&f, &u, "flip").await.unwrap();

        let Json(once) = toggle_task_status(State(f.state.clone()), Extension(u.clone()), Path(id))
            .await
            .unwrap();
        assert_eq!(once.status, TaskStatus::Completed);
        let Json(twice) = toggle_task_status(State(f.state.clone()), Extension(u.clone()), Path(id))
            .await
            .unwrap();
        assert_eq!(twice.status, TaskStatus::Active);
        assert!(twice.updated_at >= once.updated_at);
    }

    #[tokio::test]
    async fn other_users_cannot_touch_a_task() {
        let f = fixture("ownership");
        let alice = user();
        let bob = user();
        let id = create(&f, &alice, "private").await.unwrap();

        let err = get_task(State(f.state.clone()), Extension(bob.clone()), Path(id)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotAuthorized));

        let err = update_task(
            State(f.state.clone()),
            Extension(bob.clone()),
            Path(id),
            Json(UpdateTaskRequest { title: Some("mine now".into()), ..Default::default() }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotAuthorized));

        let err = toggle_task_status(State(f.state.clone()), Extension(bob.clone()), Path(id))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotAuthorized));

        let err = remove_task(State(f.state.clone()), Extension(bob.clone()), Path(id))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotAuthorized));

        let task = f.state.store.get_task(id).unwrap().unwrap();
        assert_eq!(task.title, "private");
        assert_eq!(task.status, TaskStatus::Active);
        assert_eq!(task.created_at, task.updated_at);
    }

    #[tokio::test]
    async fn missing_task_is_not_found() {
        let f = fixture("missing");
        let u = user();
        let err = get_task(State(f.state.clone()), Extension(u.clone()), Path(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[tokio::test]
    async fn update_patches_and_validates() {
        let f = fixture("update");
        let u = user();
        let id = create(&f, &u, "draft").await.unwrap();

        let Json(task) = update_task(
            State(f.state.clone()),
            Extension(u.clone()),
            Path(id),
            Json(UpdateTaskRequest {
                title: None,
                description: Some("  details  ".into()),
                status: Some(TaskStatus::Completed),
            }),
        )
        .await
        .unwrap();
        assert_eq!(task.title, "draft");
        assert_eq!(task.description.as_deref(), Some("details"));
        assert_eq!(task.status, TaskStatus::Completed);

        let err = update_task(
            State(f.state.clone()),
            Extension(u.clone()),
            Path(id),
            Json(UpdateTaskRequest { title: Some("".into()), ..Default::default() }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(ValidationError::EmptyTitle)));
        assert_eq!(f.state.store.get_task(id).unwrap().unwrap().title, "draft");
    }

    #[tokio::test]
    async fn remove_deletes_and_publishes() {
        let f = fixture("remove");
        let u = user();
        let id = create(&f, &u, "bye").await.unwrap();
        let mut rx = f.state.changes.subscribe();

        let status = remove_task(State(f.state.clone()), Extension(u.clone()), Path(id)).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(f.state.store.get_task(id).unwrap().is_none());

        let change = rx.recv().await.unwrap();
        assert_eq!(change.user_id, u.id);
        assert_eq!(change.event, LiveMessage::TaskDeleted { task_id: id });
    }

    #[tokio::test]
    async fn rapid_creates_are_rate_limited() {
        let f = fixture("rate");
        let u = user();
        let mut limited = Vec::new();
        for i in 0..21 {
            if let Err(e) = create(&f, &u, &format!("task {i}")).await {
                limited.push(e);
            }
        }
        assert!(!limited.is_empty());
        for e in &limited {
            match e {
                ApiError::RateLimited(l) => assert!(l.retry_after_secs() > 0),
                other => panic!("unexpected error: {other:?}"),
            }
        }
        let stored = f.state.store.count_tasks_by_user(u.id).unwrap();
        assert_eq!(stored as usize, 21 - limited.len());
    }

    #[tokio::test]
    async fn list_by_status_filters() {
        let f = fixture("by_status");
        let u = user();
        let a = create(&f, &u, "a").await.unwrap();
        create(&f, &u, "b").await.unwrap();
        toggle_task_status(State(f.state.clone()), Extension(u.clone()), Path(a)).await.unwrap();

        let Json(done) = list_tasks_by_status(
            State(f.state.clone()),
            Extension(u.clone()),
            Path(TaskStatus::Completed),
        )
        .await
        .unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, a);
    }
}
