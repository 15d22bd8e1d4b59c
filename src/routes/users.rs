use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};

use crate::error::{AppError, AppResult};
use crate::models::{empty, ApiResponse, EditUserRequest, User};
use crate::routes::auth;
use crate::state::AppState;
use crate::users::UserChanges;

/// GET /users: every user, password hashes never leave the server
pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<Vec<User>>>> {
    auth::extract_claims(&state.auth.jwt_secret, &headers)?;

    let users = state.users.list().await?;
    Ok(ApiResponse::ok(users))
}

/// GET /users/details/{id}
pub async fn user_details(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<User>>> {
    auth::extract_claims(&state.auth.jwt_secret, &headers)?;

    let user = state
        .users
        .find_by_id(id.trim())
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(ApiResponse::ok(user))
}

/// PATCH /users/edit/{id}: users can only edit themselves
pub async fn edit_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<EditUserRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let claims = auth::extract_claims(&state.auth.jwt_secret, &headers)?;
    let id = id.trim();
    if claims.sub != id {
        return Err(AppError::Forbidden("You can only edit your own account".into()));
    }

    let mut changes = UserChanges::default();

    if let Some(name) = req.name {
        let name = name.trim().to_string();
        auth::validate_name(&name)?;
        changes.name = Some(name);
    }

    if let Some(email) = req.email {
        let email = auth::normalize_email(&email);
        auth::validate_email(&email)?;
        if let Some(existing) = state.users.find_by_email(&email).await? {
            if existing.id != id {
                return Err(AppError::Conflict("Email already registered".into()));
            }
        }
        changes.email = Some(email);
    }

    if let Some(password) = req.password {
        auth::validate_password(&password)?;
        changes.password_hash = Some(auth::hash_password(&password)?);
    }

    let user = state.users.update(id, changes).await?;
    Ok(ApiResponse::with_message(user, "User updated!"))
}

/// DELETE /users/{id}: uploads the user owned stay behind
pub async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<()>>>> {
    let claims = auth::extract_claims(&state.auth.jwt_secret, &headers)?;
    let id = id.trim();
    if claims.sub != id {
        return Err(AppError::Forbidden("You can only delete your own account".into()));
    }

    state.users.delete(id).await?;

    tracing::info!(user_id = %id, "user deleted");
    Ok(ApiResponse::with_message(empty(), "User deleted"))
}
