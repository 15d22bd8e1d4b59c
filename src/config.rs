use std::path::{Path, PathBuf};

use clap::Parser;
use rand::Rng;

const SECRET_FILE: &str = "jwt_secret.key";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Database path
    #[arg(short, long, env = "DATABASE_PATH", default_value = "dashboard.db")]
    pub db_path: String,

    /// Directory uploaded files are written to and served from
    #[arg(long, env = "STORAGE_ROOT", default_value = "./public/uploads")]
    pub storage_root: PathBuf,

    /// Largest accepted upload, in megabytes
    #[arg(long, env = "MAX_UPLOAD_MB", default_value_t = 25)]
    pub max_upload_mb: usize,

    /// Lifetime of issued login tokens
    #[arg(long, env = "TOKEN_TTL_DAYS", default_value_t = 30)]
    pub token_ttl_days: i64,

    /// JWT signing secret; read from or generated into jwt_secret.key when unset
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub max_file_size: usize,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_days: i64,
}

impl Config {
    pub fn database(&self) -> DatabaseConfig {
        DatabaseConfig {
            path: self.db_path.clone(),
            max_connections: 5,
        }
    }

    pub fn storage(&self) -> StorageConfig {
        StorageConfig {
            root: self.storage_root.clone(),
            max_file_size: self.max_upload_mb * 1024 * 1024,
        }
    }

    pub fn auth(&self) -> AuthConfig {
        let jwt_secret = match &self.jwt_secret {
            Some(secret) if !secret.trim().is_empty() => secret.trim().to_string(),
            _ => load_or_generate_secret(Path::new(SECRET_FILE)),
        };

        AuthConfig {
            jwt_secret,
            token_ttl_days: self.token_ttl_days,
        }
    }
}

/// Reuse the secret saved by a previous run so issued tokens stay valid.
fn load_or_generate_secret(secret_path: &Path) -> String {
    if let Ok(saved) = std::fs::read_to_string(secret_path) {
        let saved = saved.trim().to_string();
        if !saved.is_empty() {
            tracing::info!("Loaded JWT secret from {}", secret_path.display());
            return saved;
        }
    }

    let secret: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();

    if let Err(e) = std::fs::write(secret_path, &secret) {
        tracing::warn!("Could not save JWT secret to {}: {e}", secret_path.display());
    } else {
        tracing::info!("Generated and saved JWT secret to {}", secret_path.display());
    }
    secret
}
