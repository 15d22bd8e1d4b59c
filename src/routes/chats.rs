use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use sea_orm::*;
use uuid::Uuid;

use crate::entities::chat;
use crate::error::{AppError, AppResult};
use crate::models::{empty, ApiResponse, Chat, ChatEntry, ChatPosted, CreateChatRequest};
use crate::routes::auth;
use crate::state::AppState;
use crate::uploads::UserLookup;

const MAX_MESSAGE_LEN: usize = 4000;

/// POST /chats/create: the sender is always the caller
pub async fn create_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateChatRequest>,
) -> AppResult<Json<ApiResponse<ChatPosted>>> {
    let claims = auth::extract_claims(&state.auth.jwt_secret, &headers)?;

    let message = req.message.trim().to_string();
    if message.is_empty() || message.chars().count() > MAX_MESSAGE_LEN {
        return Err(AppError::Validation(format!(
            "Message must be 1-{MAX_MESSAGE_LEN} characters"
        )));
    }
    let to_user_id = req.to_user_id.trim().to_string();
    if to_user_id.is_empty() {
        return Err(AppError::Validation("toUserId is required".into()));
    }

    let sender = state
        .users
        .find_by_id(&claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

    let new_chat = chat::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        user_id: Set(sender.id.clone()),
        to_user_id: Set(to_user_id),
        message: Set(message.clone()),
        timestamp: Set(timestamp.clone()),
    };
    chat::Entity::insert(new_chat)
        .exec_without_returning(&state.db)
        .await?;

    Ok(ApiResponse::with_message(
        ChatPosted {
            user: sender.name,
            message,
            timestamp,
        },
        "New chat submitted!",
    ))
}

/// GET /chats: conversations the caller takes part in, oldest first
pub async fn list_chats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<Vec<ChatEntry>>>> {
    let claims = auth::extract_claims(&state.auth.jwt_secret, &headers)?;

    let chats: Vec<Chat> = chat::Entity::find()
        .filter(
            Condition::any()
                .add(chat::Column::UserId.eq(claims.sub.as_str()))
                .add(chat::Column::ToUserId.eq(claims.sub.as_str())),
        )
        .order_by_asc(chat::Column::Timestamp)
        .all(&state.db)
        .await?;

    let names: HashMap<String, String> = state
        .users
        .find_all()
        .await?
        .into_iter()
        .map(|u| (u.id, u.name))
        .collect();

    // Chats from senders that no longer exist are skipped
    let entries = chats
        .into_iter()
        .filter_map(|c| {
            let user = names.get(&c.user_id)?.clone();
            Some(ChatEntry {
                id: c.id,
                user,
                receiver: c.to_user_id,
                message: c.message,
                timestamp: c.timestamp,
            })
        })
        .collect();

    Ok(ApiResponse::ok(entries))
}

/// DELETE /chats/{id}: sender only
pub async fn delete_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<()>>>> {
    let claims = auth::extract_claims(&state.auth.jwt_secret, &headers)?;

    let existing = chat::Entity::find_by_id(id.trim())
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Chat not found".into()))?;

    if existing.user_id != claims.sub {
        return Err(AppError::Forbidden("You can only delete your own messages".into()));
    }

    chat::Entity::delete_by_id(existing.id).exec(&state.db).await?;

    Ok(ApiResponse::with_message(empty(), "Chat deleted"))
}
