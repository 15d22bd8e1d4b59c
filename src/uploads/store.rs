use std::collections::HashMap;

use async_trait::async_trait;
use sea_orm::*;
use uuid::Uuid;

use crate::entities::{upload, upload_share};
use crate::error::{AppError, AppResult};

use super::Upload;

/// Predicates the upload engine needs from its store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadFilter {
    Id(String),
    OwnedBy(String),
    FileName(String),
    /// `sharedTo` contains the id
    SharedWith(String),
}

#[derive(Debug, Clone)]
pub struct NewUpload {
    pub user_id: String,
    pub label: Option<String>,
    pub file_name: String,
    pub mime_type: String,
    pub size: i64,
}

/// Field replacements; `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct UploadChanges {
    pub label: Option<Option<String>>,
    pub shared_to: Option<Vec<String>>,
}

#[async_trait]
pub trait UploadStore: Send + Sync {
    async fn create(&self, new: NewUpload) -> AppResult<Upload>;

    async fn find(&self, filter: UploadFilter) -> AppResult<Vec<Upload>>;

    async fn find_one(&self, filter: UploadFilter) -> AppResult<Option<Upload>> {
        Ok(self.find(filter).await?.into_iter().next())
    }

    /// Fails with `NotFound` when no record has this id.
    async fn update_by_id(&self, id: &str, changes: UploadChanges) -> AppResult<Upload>;

    /// Fails with `NotFound` when no record has this id.
    async fn delete_by_id(&self, id: &str) -> AppResult<()>;
}

fn not_found() -> AppError {
    AppError::NotFound("Upload not found".into())
}

/// sea-orm backed store. `sharedTo` lives in `upload_shares`, one row per
/// recipient, ordered by `position`.
#[derive(Clone)]
pub struct SeaUploadStore {
    db: DatabaseConnection,
}

impl SeaUploadStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn select(filter: &UploadFilter) -> Select<upload::Entity> {
        let query = upload::Entity::find();
        let query = match filter {
            UploadFilter::Id(id) => query.filter(upload::Column::Id.eq(id.as_str())),
            UploadFilter::OwnedBy(user_id) => {
                query.filter(upload::Column::UserId.eq(user_id.as_str()))
            }
            UploadFilter::FileName(name) => {
                query.filter(upload::Column::FileName.eq(name.as_str()))
            }
            UploadFilter::SharedWith(user_id) => query
                .inner_join(upload_share::Entity)
                .filter(upload_share::Column::UserId.eq(user_id.as_str())),
        };

        query
            .order_by_asc(upload::Column::CreatedAt)
            .order_by_asc(upload::Column::Id)
    }

    async fn with_shares(&self, rows: Vec<upload::Model>) -> AppResult<Vec<Upload>> {
        if rows.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let shares = upload_share::Entity::find()
            .filter(upload_share::Column::UploadId.is_in(ids))
            .order_by_asc(upload_share::Column::Position)
            .all(&self.db)
            .await?;

        let mut by_upload: HashMap<String, Vec<String>> = HashMap::new();
        for share in shares {
            by_upload
                .entry(share.upload_id)
                .or_default()
                .push(share.user_id);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let shared_to = by_upload.remove(&row.id).unwrap_or_default();
                Upload::from_row(row, shared_to)
            })
            .collect())
    }
}

#[async_trait]
impl UploadStore for SeaUploadStore {
    async fn create(&self, new: NewUpload) -> AppResult<Upload> {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let conflict = format!("A file named {} already exists", new.file_name);

        let row = upload::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            user_id: Set(new.user_id),
            label: Set(new.label),
            file_name: Set(new.file_name),
            mime_type: Set(new.mime_type),
            size: Set(new.size),
            created_at: Set(now),
        }
        .insert(&self.db)
        .await
        .map_err(|e| AppError::unique_violation(e, conflict))?;

        Ok(Upload::from_row(row, vec![]))
    }

    async fn find(&self, filter: UploadFilter) -> AppResult<Vec<Upload>> {
        let rows = Self::select(&filter).all(&self.db).await?;
        self.with_shares(rows).await
    }

    async fn update_by_id(&self, id: &str, changes: UploadChanges) -> AppResult<Upload> {
        let txn = self.db.begin().await?;

        let row = upload::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(not_found)?;

        if let Some(label) = changes.label {
            let mut active: upload::ActiveModel = row.into();
            active.label = Set(label);
            active.update(&txn).await?;
        }

        if let Some(shared_to) = changes.shared_to {
            upload_share::Entity::delete_many()
                .filter(upload_share::Column::UploadId.eq(id))
                .exec(&txn)
                .await?;

            if !shared_to.is_empty() {
                let shares = shared_to
                    .into_iter()
                    .enumerate()
                    .map(|(position, user_id)| upload_share::ActiveModel {
                        upload_id: Set(id.to_string()),
                        user_id: Set(user_id),
                        position: Set(position as i32),
                    });
                upload_share::Entity::insert_many(shares)
                    .exec_without_returning(&txn)
                    .await?;
            }
        }

        txn.commit().await?;

        self.find_one(UploadFilter::Id(id.to_string()))
            .await?
            .ok_or_else(not_found)
    }

    async fn delete_by_id(&self, id: &str) -> AppResult<()> {
        let txn = self.db.begin().await?;

        upload_share::Entity::delete_many()
            .filter(upload_share::Column::UploadId.eq(id))
            .exec(&txn)
            .await?;

        let result = upload::Entity::delete_by_id(id).exec(&txn).await?;
        if result.rows_affected == 0 {
            return Err(not_found());
        }

        txn.commit().await?;
        Ok(())
    }
}
