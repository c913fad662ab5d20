use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Entity types ──────────────────────────────────────────────

/// Two-state lifecycle. The discriminant is the byte used in the status index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum TaskStatus {
    Active = 0,
    Completed = 1,
}

impl TaskStatus {
    pub fn toggled(self) -> TaskStatus {
        match self {
            TaskStatus::Active => TaskStatus::Completed,
            TaskStatus::Completed => TaskStatus::Active,
        }
    }
}

/// A todo item owned by exactly one user.
///
/// Timestamps are milliseconds since the Unix epoch. `updated_at` never
/// moves backwards for a given task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Stored account. Never serialized to clients; see `UserResponse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: i64,
}

/// Fields an update may touch. `description: Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ── API request/response types ────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        UserResponse {
            id: user.id,
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_tasks: u64,
    pub active_tasks: u64,
    pub completed_tasks: u64,
    pub completion_rate: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub active: u64,
    pub completed: u64,
}

// ── Live feed messages (server → client) ──────────────────────

/// A change to one user's tasks, fanned out on the broadcast channel.
#[derive(Debug, Clone)]
pub struct Change {
    pub user_id: Uuid,
    pub event: LiveMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage {
    Snapshot {
        tasks: Vec<Task>,
    },
    TaskCreated {
        task: Task,
    },
    TaskUpdated {
        task: Task,
    },
    TaskDeleted {
        #[serde(rename = "taskId")]
        task_id: Uuid,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_is_an_involution() {
        for s in [TaskStatus::Active, TaskStatus::Completed] {
            assert_ne!(s.toggled(), s);
            assert_eq!(s.toggled().toggled(), s);
        }
    }

    #[test]
    fn task_json_uses_camel_case() {
        let task = Task {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            title: "Buy milk".into(),
            description: None,
            status: TaskStatus::Active,
            created_at: 1,
            updated_at: 2,
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["status"], "active");
        assert_eq!(json["userId"], Uuid::nil().to_string());
        assert_eq!(json["createdAt"], 1);
        assert_eq!(json["updatedAt"], 2);
    }

    #[test]
    fn live_message_is_tagged() {
        let msg = LiveMessage::TaskDeleted { task_id: Uuid::nil() };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "task_deleted");
        assert_eq!(json["taskId"], Uuid::nil().to_string());
    }

    #[test]
    fn summary_json_field_names() {
        let json = serde_json::to_value(DashboardSummary {
            total_tasks: 1,
            active_tasks: 0,
            completed_tasks: 1,
            completion_rate: 100,
        })
        .unwrap();
        assert_eq!(json["totalTasks"], 1);
        assert_eq!(json["completionRate"], 100);
    }
}
