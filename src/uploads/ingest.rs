use axum::extract::Multipart;
use bytes::Bytes;

use crate::error::{AppError, AppResult};

/// The single binary part of an upload request.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub original_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Parsed multipart upload: the file plus the `userId`, `label` and
/// `fileName` form fields.
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    pub user_id: Option<String>,
    pub label: Option<String>,
    pub file_name: Option<String>,
    pub file: Option<FilePart>,
}

/// Drain a multipart body. Any part carrying a filename is the payload;
/// a second one is rejected.
pub async fn read_upload_form(
    mut multipart: Multipart,
    max_file_size: usize,
) -> AppResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        if let Some(original_name) = field.file_name().map(str::to_string) {
            if form.file.is_some() {
                return Err(AppError::Validation(
                    "Only one file can be uploaded per request".into(),
                ));
            }

            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();

            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Read error: {e}")))?;

            if data.len() > max_file_size {
                return Err(AppError::Validation(format!(
                    "File too large (max {}MB)",
                    max_file_size / 1024 / 1024
                )));
            }

            form.file = Some(FilePart {
                original_name,
                content_type,
                data,
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::Validation(format!("Read error: {e}")))?;

        match field_name.as_str() {
            "userId" => form.user_id = Some(value),
            "label" => form.label = Some(value),
            "fileName" => form.file_name = Some(value),
            other => tracing::debug!(field = other, "ignoring unknown upload field"),
        }
    }

    Ok(form)
}
