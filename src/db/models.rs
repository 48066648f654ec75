use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub full_name: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub role: String,
    pub is_active: bool,
    pub plan_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Plan {
    pub id: i32,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Feature {
    pub id: i32,
    pub key: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PlanFeature {
    pub id: i32,
    pub plan_id: i32,
    pub feature_id: i32,
    pub value: String,
}

/// One row per (user, calendar month). Created lazily, never deleted.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MonthlyUsage {
    pub id: i32,
    pub user_id: String,
    pub month_key: String,
    pub used_messages: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub system_prompt: Option<String>,
    pub default_model: Option<String>,
    pub supports_vision: bool,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub role: String,
    pub content: String,
    pub model_used: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i32>,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChatAttachment {
    pub id: Uuid,
    pub message_id: Uuid,
    pub name: String,
    pub path: String,
    pub mimetype: String,
    pub size_bytes: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Text/image/video content record with its review-workflow fields. The
/// kind-specific columns (temperature, style, ratio, duration) live on the
/// same table and are null for kinds they don't apply to.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub id: Uuid,
    pub user_id: String,
    pub content_type: String,
    pub prompt: String,
    pub model_used: String,
    pub content_data: Option<String>,
    pub file_path: Option<String>,
    pub temperature: Option<f64>,
    pub style: Option<String>,
    pub ratio: Option<String>,
    pub duration: Option<i32>,
    pub status: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub submitted_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub created_at: DateTime<Utc>,
}
