use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, http::HeaderMap, Json};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::{AppError, AppResult};
use crate::models::{ApiResponse, LoginRequest, LoginResponse, SignUpRequest, UserInfo};
use crate::state::AppState;

const INVALID_CREDENTIALS: &str = "Invalid credentials";

// ─── JWT Claims ───

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user_id
    pub email: String,
    pub name: String,
    pub exp: usize,
}

// ─── Routes ───

/// POST /users/create
pub async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> AppResult<Json<ApiResponse<String>>> {
    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);

    validate_name(&name)?;
    validate_email(&email)?;
    validate_password(&req.password)?;

    if state.users.find_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let password_hash = hash_password(&req.password)?;
    let user = state.users.create(&name, &email, &password_hash).await?;

    tracing::info!(user_id = %user.id, "user registered");
    Ok(ApiResponse::with_message(user.id, "New user created!"))
}

/// POST /users/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<LoginResponse>>> {
    let email = normalize_email(&req.email);

    if !state.auth_rate_limiter.check(&email) {
        tracing::warn!(email = %email, "login rate limited");
        return Err(AppError::TooManyRequests);
    }

    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.into()))?;

    verify_password(&req.password, &user.password_hash)?;

    let token = create_jwt(&state.auth, &user.id, &user.email, &user.name)?;

    Ok(ApiResponse::with_message(
        LoginResponse {
            token,
            user: UserInfo {
                id: user.id,
                email: user.email,
                name: user.name,
            },
        },
        "User Authenticated!",
    ))
}

// ─── Validation ───

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn validate_name(name: &str) -> AppResult<()> {
    if name.is_empty() || name.chars().count() > 64 {
        return Err(AppError::Validation("Name must be 1-64 characters".into()));
    }
    Ok(())
}

pub(crate) fn validate_email(email: &str) -> AppResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    };
    if !valid {
        return Err(AppError::Validation("Invalid email address".into()));
    }
    Ok(())
}

pub(crate) fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < 4 {
        return Err(AppError::Validation(
            "Password must be at least 4 characters".into(),
        ));
    }
    Ok(())
}

// ─── Password helpers ───

pub(crate) fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Hash error: {e}")))
}

fn verify_password(password: &str, password_hash: &str) -> AppResult<()> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|_| AppError::Internal("Hash parse error".into()))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::Unauthorized(INVALID_CREDENTIALS.into()))
}

// ─── JWT helpers ───

pub(crate) fn create_jwt(
    auth: &AuthConfig,
    user_id: &str,
    email: &str,
    name: &str,
) -> AppResult<String> {
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::days(auth.token_ttl_days))
        .ok_or_else(|| AppError::Internal("Token expiry out of range".into()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        name: name.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(auth.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("JWT error: {e}")))
}

pub fn extract_claims(secret: &str, headers: &HeaderMap) -> AppResult<Claims> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

    let token = auth
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization format".into()))?;

    decode_jwt(secret, token)
}

pub fn decode_jwt(secret: &str, token: &str) -> AppResult<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {e}")))?;

    Ok(data.claims)
}
