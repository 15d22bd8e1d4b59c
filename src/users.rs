use async_trait::async_trait;
use sea_orm::*;
use uuid::Uuid;

use crate::entities::user;
use crate::error::{AppError, AppResult};
use crate::uploads::{UserLookup, UserSummary};

/// User rows, shared by the identity routes and the upload engine.
#[derive(Clone)]
pub struct UserDirectory {
    db: DatabaseConnection,
}

#[derive(Debug, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

impl UserDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> AppResult<user::Model> {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

        let new_user = user::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            name: Set(name.to_string()),
            email: Set(email.to_string()),
            password_hash: Set(password_hash.to_string()),
            created_at: Set(now),
        };

        new_user
            .insert(&self.db)
            .await
            .map_err(|e| AppError::unique_violation(e, "Email already registered"))
    }

    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<user::Model>> {
        Ok(user::Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<user::Model>> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(&self.db)
            .await?)
    }

    pub async fn list(&self) -> AppResult<Vec<user::Model>> {
        Ok(user::Entity::find()
            .order_by_asc(user::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    pub async fn update(&self, id: &str, changes: UserChanges) -> AppResult<user::Model> {
        let existing = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;

        let mut active: user::ActiveModel = existing.into();
        if let Some(name) = changes.name {
            active.name = Set(name);
        }
        if let Some(email) = changes.email {
            active.email = Set(email);
        }
        if let Some(password_hash) = changes.password_hash {
            active.password_hash = Set(password_hash);
        }

        active
            .update(&self.db)
            .await
            .map_err(|e| AppError::unique_violation(e, "Email already registered"))
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let result = user::Entity::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound("User not found".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserLookup for UserDirectory {
    async fn find_all(&self) -> AppResult<Vec<UserSummary>> {
        let users = user::Entity::find()
            .select_only()
            .column(user::Column::Id)
            .column(user::Column::Name)
            .into_tuple::<(String, String)>()
            .all(&self.db)
            .await?;

        Ok(users
            .into_iter()
            .map(|(id, name)| UserSummary { id, name })
            .collect())
    }
}
