use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use sea_orm::DatabaseConnection;

use crate::config::AuthConfig;
use crate::storage::FileStorage;
use crate::uploads::{SeaUploadStore, UploadService};
use crate::users::UserDirectory;

/// Fixed-window limiter keyed by an arbitrary string (login email).
pub struct RateLimiter {
    /// Maps key → (request count, window start)
    limits: DashMap<String, (u32, Instant)>,
    max_requests: u32,
    window_secs: u64,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            limits: DashMap::new(),
            max_requests,
            window_secs,
        }
    }

    /// Returns true if the request is allowed, false if rate-limited.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entry = self.limits.entry(key.to_string()).or_insert((0, now));
        let (count, window_start) = entry.value_mut();
        if now.duration_since(*window_start).as_secs() >= self.window_secs {
            // Reset window
            *count = 1;
            *window_start = now;
            true
        } else if *count < self.max_requests {
            *count += 1;
            true
        } else {
            false
        }
    }

    /// Drop entries whose window is long over (call from a background task)
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.limits.retain(|_, (_, start)| {
            now.duration_since(*start).as_secs() < self.window_secs * 2
        });
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub users: UserDirectory,
    pub uploads: UploadService,
    pub auth: AuthConfig,
    /// Largest accepted upload payload in bytes
    pub max_file_size: usize,
    /// Rate limiter for login attempts
    pub auth_rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(
        db: DatabaseConnection,
        files: Arc<dyn FileStorage>,
        auth: AuthConfig,
        max_file_size: usize,
    ) -> Self {
        let users = UserDirectory::new(db.clone());
        let uploads = UploadService::new(
            Arc::new(SeaUploadStore::new(db.clone())),
            Arc::new(users.clone()),
            files,
        );

        Self {
            db,
            users,
            uploads,
            auth,
            max_file_size,
            auth_rate_limiter: Arc::new(RateLimiter::new(10, 60)), // 10 attempts/min per email
        }
    }
}
