//! Fixtures shared by the unit tests: a migrated SQLite file and a storage
//! root, both inside one temporary directory.

use std::sync::Arc;

use futures::TryStreamExt;
use sea_orm::DatabaseConnection;
use tempfile::TempDir;

use crate::config::{AuthConfig, DatabaseConfig};
use crate::db;
use crate::entities::user;
use crate::state::AppState;
use crate::storage::{ByteStream, LocalStorage};
use crate::users::UserDirectory;

pub const TEST_SECRET: &str = "test-secret";
pub const TEST_MAX_FILE_SIZE: usize = 1024 * 1024;

pub struct Fixture {
    pub dir: TempDir,
    pub db: DatabaseConnection,
    pub storage: Arc<LocalStorage>,
}

impl Fixture {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("test.db").display().to_string(),
            max_connections: 1,
        };
        let db = db::connect(&config).await.unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path().join("uploads")).await.unwrap());

        Self { dir, db, storage }
    }

    pub fn state(&self) -> AppState {
        AppState::new(
            self.db.clone(),
            self.storage.clone(),
            AuthConfig {
                jwt_secret: TEST_SECRET.to_string(),
                token_ttl_days: 1,
            },
            TEST_MAX_FILE_SIZE,
        )
    }

    pub async fn user(&self, name: &str) -> user::Model {
        UserDirectory::new(self.db.clone())
            .create(name, &format!("{}@example.com", name.to_lowercase()), "unused-hash")
            .await
            .unwrap()
    }
}

/// Collect a download stream into memory.
pub async fn read_all(stream: ByteStream) -> Vec<u8> {
    stream
        .try_fold(Vec::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await
        .unwrap()
}
