use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::error::AppResult;
use crate::models::{empty, ApiResponse};
use crate::routes::auth;
use crate::state::AppState;
use crate::uploads::{ingest, SharedUpload, Upload, UploadPatch};

/// GET /uploads/{owner_id}
pub async fn list_uploads(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(owner_id): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<Upload>>>> {
    let claims = auth::extract_claims(&state.auth.jwt_secret, &headers)?;

    let uploads = state.uploads.list_owned(&claims.sub, &owner_id).await?;
    Ok(ApiResponse::ok(uploads))
}

/// POST /uploads/create (multipart): one file plus `userId`, `label`, `fileName`
pub async fn create_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<ApiResponse<Upload>>)> {
    let claims = auth::extract_claims(&state.auth.jwt_secret, &headers)?;

    let form = ingest::read_upload_form(multipart, state.max_file_size).await?;
    let upload = state.uploads.ingest(&claims.sub, form).await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message(upload, "File uploaded!"),
    ))
}

/// PATCH /uploads/update/{id}: owner only
pub async fn update_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<UploadPatch>,
) -> AppResult<Json<ApiResponse<Upload>>> {
    let claims = auth::extract_claims(&state.auth.jwt_secret, &headers)?;

    let upload = state.uploads.update(&claims.sub, &id, patch).await?;
    Ok(ApiResponse::with_message(upload, "Upload has been updated!"))
}

/// DELETE /uploads/delete/{id}: owner only, removes the file too
pub async fn delete_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<()>>>> {
    let claims = auth::extract_claims(&state.auth.jwt_secret, &headers)?;

    state.uploads.delete(&claims.sub, &id).await?;
    Ok(ApiResponse::with_message(empty(), "Upload has been deleted!"))
}

/// GET /uploads/details/{id}
pub async fn upload_details(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Upload>>> {
    let claims = auth::extract_claims(&state.auth.jwt_secret, &headers)?;

    let upload = state.uploads.details(&claims.sub, &id).await?;
    Ok(ApiResponse::ok(upload))
}

/// GET /uploads/shared/{user_id}
pub async fn shared_uploads(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<SharedUpload>>>> {
    let claims = auth::extract_claims(&state.auth.jwt_secret, &headers)?;

    let shared = state.uploads.list_shared_with(&claims.sub, &user_id).await?;
    Ok(ApiResponse::ok(shared))
}

/// GET /uploads/download/{filename}
pub async fn download_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(filename): Path<String>,
) -> AppResult<impl IntoResponse> {
    let claims = auth::extract_claims(&state.auth.jwt_secret, &headers)?;

    let (upload, stream) = state.uploads.download(&claims.sub, &filename).await?;

    Ok((
        [
            (header::CONTENT_TYPE, upload.mime_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", header_safe(&upload.file_name)),
            ),
        ],
        Body::from_stream(stream),
    ))
}

/// Printable ASCII only, quotes replaced, so the name fits a quoted header value.
fn header_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
