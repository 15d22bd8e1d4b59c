use axum::Json;
use serde::{Deserialize, Serialize};

pub use crate::entities::chat::Model as Chat;
pub use crate::entities::user::Model as User;

// ─── Response envelope ───

/// Every JSON body is wrapped as `{data, status, message}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
    pub status: bool,
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Self::with_message(data, "")
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            data,
            status: true,
            message: message.into(),
        })
    }
}

/// Placeholder `data` for responses that carry nothing (`[]` on the wire).
pub fn empty() -> Vec<()> {
    Vec::new()
}

// ─── Users ───

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserInfo,
}

#[derive(Debug, Deserialize)]
pub struct EditUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

// ─── Chats ───

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    pub to_user_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatPosted {
    pub user: String,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatEntry {
    pub id: String,
    pub user: String,
    pub receiver: String,
    pub message: String,
    pub timestamp: String,
}
