//! Upload records, their sharing list and the files behind them.
//!
//! [`UploadService`] ties together three collaborators: an [`UploadStore`]
//! for the records, a [`UserLookup`] for owner display names and a
//! [`FileStorage`] for the payloads. Reads are allowed for the owner and for
//! every id in `sharedTo`; writes only for the owner.

pub mod access;
pub mod ingest;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::entities::upload;
use crate::error::{AppError, AppResult};
use crate::storage::{self, ByteStream, FileStorage, StorageError};

pub use ingest::UploadForm;
pub use store::{NewUpload, SeaUploadStore, UploadChanges, UploadFilter, UploadStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    pub id: String,
    pub user_id: String,
    pub label: Option<String>,
    pub file_name: String,
    pub shared_to: Vec<String>,
    pub mime_type: String,
    pub size: i64,
    pub created_at: String,
}

impl Upload {
    pub(crate) fn from_row(row: upload::Model, shared_to: Vec<String>) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            label: row.label,
            file_name: row.file_name,
            shared_to,
            mime_type: row.mime_type,
            size: row.size,
            created_at: row.created_at,
        }
    }
}

/// An upload as seen by one of its recipients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedUpload {
    pub id: String,
    pub label: Option<String>,
    pub file_name: String,
    pub shared_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub id: String,
    pub name: String,
}

/// Resolves user ids to display names.
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn find_all(&self) -> AppResult<Vec<UserSummary>>;
}

/// Body of `PATCH /uploads/update/{id}`.
///
/// `label: null` clears the label, a missing key keeps it. `fileName` and
/// `userId` may be echoed back but cannot change.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPatch {
    #[serde(default, deserialize_with = "present")]
    pub label: Option<Option<String>>,
    pub shared_to: Option<Vec<String>>,
    pub file_name: Option<String>,
    pub user_id: Option<String>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Clone)]
pub struct UploadService {
    store: Arc<dyn UploadStore>,
    users: Arc<dyn UserLookup>,
    files: Arc<dyn FileStorage>,
}

impl UploadService {
    pub fn new(
        store: Arc<dyn UploadStore>,
        users: Arc<dyn UserLookup>,
        files: Arc<dyn FileStorage>,
    ) -> Self {
        Self {
            store,
            users,
            files,
        }
    }

    /// Store the payload and create its record, owned by `caller`.
    ///
    /// The file is written under the record's `fileName` (the form field when
    /// given, the part's own name otherwise) so the two never diverge.
    pub async fn ingest(&self, caller: &str, form: UploadForm) -> AppResult<Upload> {
        let caller = access::normalize_id(caller);
        let file = form
            .file
            .ok_or_else(|| AppError::Validation("No file found in upload".into()))?;

        if let Some(user_id) = form.user_id.as_deref().map(access::normalize_id) {
            if !user_id.is_empty() && user_id != caller {
                return Err(AppError::Forbidden(
                    "Uploads can only be created for yourself".into(),
                ));
            }
        }

        let file_name = form
            .file_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| file.original_name.trim())
            .to_string();
        storage::validate_name(&file_name)?;

        if self
            .store
            .find_one(UploadFilter::FileName(file_name.clone()))
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "A file named {file_name} already exists"
            )));
        }

        // Exclusive create: a concurrent upload of the same name gets
        // `Conflict` here and never touches the file written by the other.
        self.files.create(&file_name, &file.data).await?;

        let new_upload = NewUpload {
            user_id: caller.to_string(),
            label: form
                .label
                .map(|label| label.trim().to_string())
                .filter(|label| !label.is_empty()),
            file_name: file_name.clone(),
            mime_type: file.content_type,
            size: file.data.len() as i64,
        };

        match self.store.create(new_upload).await {
            Ok(upload) => {
                tracing::info!(
                    upload_id = %upload.id,
                    user_id = %upload.user_id,
                    file_name = %upload.file_name,
                    size_bytes = upload.size,
                    "upload created"
                );
                Ok(upload)
            }
            Err(e) => {
                if let Err(cleanup) = self.files.remove(&file_name).await {
                    tracing::warn!(file_name = %file_name, error = %cleanup, "could not remove file of failed upload");
                }
                Err(e)
            }
        }
    }

    pub async fn list_owned(&self, caller: &str, owner_id: &str) -> AppResult<Vec<Upload>> {
        let owner_id = access::normalize_id(owner_id);
        if owner_id != access::normalize_id(caller) {
            return Err(AppError::Forbidden("You can only list your own uploads".into()));
        }

        self.store
            .find(UploadFilter::OwnedBy(owner_id.to_string()))
            .await
    }

    /// Uploads shared with `recipient_id`. Entries whose owner no longer
    /// resolves to a user are left out.
    pub async fn list_shared_with(
        &self,
        caller: &str,
        recipient_id: &str,
    ) -> AppResult<Vec<SharedUpload>> {
        let recipient_id = access::normalize_id(recipient_id);
        if recipient_id != access::normalize_id(caller) {
            return Err(AppError::Forbidden(
                "You can only list uploads shared with you".into(),
            ));
        }

        let uploads = self
            .store
            .find(UploadFilter::SharedWith(recipient_id.to_string()))
            .await?;
        if uploads.is_empty() {
            return Ok(vec![]);
        }

        let names: HashMap<String, String> = self
            .users
            .find_all()
            .await?
            .into_iter()
            .map(|u| (u.id, u.name))
            .collect();

        Ok(uploads
            .into_iter()
            .filter_map(|upload| {
                let shared_by = names.get(&upload.user_id)?.clone();
                Some(SharedUpload {
                    id: upload.id,
                    label: upload.label,
                    file_name: upload.file_name,
                    shared_by,
                })
            })
            .collect())
    }

    pub async fn details(&self, caller: &str, id: &str) -> AppResult<Upload> {
        let upload = self.get(id).await?;
        access::ensure_readable(&upload, caller)?;
        Ok(upload)
    }

    pub async fn update(&self, caller: &str, id: &str, patch: UploadPatch) -> AppResult<Upload> {
        let upload = self.get(id).await?;
        access::ensure_owner(&upload, caller)?;

        if let Some(file_name) = &patch.file_name {
            if file_name.trim() != upload.file_name {
                return Err(AppError::Validation("fileName cannot be changed".into()));
            }
        }
        if let Some(user_id) = &patch.user_id {
            if access::normalize_id(user_id) != upload.user_id {
                return Err(AppError::Validation("userId cannot be changed".into()));
            }
        }

        let changes = UploadChanges {
            label: patch.label,
            shared_to: patch.shared_to.map(access::normalize_shared_to),
        };
        let updated = self.store.update_by_id(&upload.id, changes).await?;

        tracing::info!(upload_id = %updated.id, shared_to = ?updated.shared_to, "upload updated");
        Ok(updated)
    }

    /// Remove the backing file if it is there, then the record.
    pub async fn delete(&self, caller: &str, id: &str) -> AppResult<()> {
        let upload = self.get(id).await?;
        access::ensure_owner(&upload, caller)?;

        match self.files.exists(&upload.file_name).await {
            Ok(true) => match self.files.remove(&upload.file_name).await {
                Ok(()) | Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            },
            Ok(false) => {
                tracing::debug!(file_name = %upload.file_name, "backing file already gone");
            }
            Err(StorageError::InvalidName(name)) => {
                tracing::warn!(file_name = %name, "skipping removal of unsafe file name");
            }
            Err(e) => return Err(e.into()),
        }

        self.store.delete_by_id(&upload.id).await?;

        tracing::info!(upload_id = %upload.id, file_name = %upload.file_name, "upload deleted");
        Ok(())
    }

    /// Resolve a download request to its record and a stream of its bytes.
    ///
    /// The name is checked before anything is looked up, so traversal
    /// attempts fail with `InvalidName` whatever the storage root holds.
    pub async fn download(&self, caller: &str, file_name: &str) -> AppResult<(Upload, ByteStream)> {
        storage::validate_name(file_name)?;

        let upload = self
            .store
            .find_one(UploadFilter::FileName(file_name.to_string()))
            .await?
            .ok_or_else(|| AppError::NotFound("Upload not found".into()))?;
        access::ensure_readable(&upload, caller)?;

        let stream = self.files.open(&upload.file_name).await?;
        Ok((upload, stream))
    }

    async fn get(&self, id: &str) -> AppResult<Upload> {
        self.store
            .find_one(UploadFilter::Id(access::normalize_id(id).to_string()))
            .await?
            .ok_or_else(|| AppError::NotFound("Upload not found".into()))
    }
}
