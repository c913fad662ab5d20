use crate::error::ApiError;
use crate::models::{now_millis, AuthResponse, Change, CredentialsRequest, User, UserResponse};
use crate::ratelimit::{Bucket, RateLimiter};
use crate::store::Store;
use crate::validate::{is_valid_email, is_valid_password, ValidationError};
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

// ── JWT ────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,        // user id
    pub email: String,
    pub exp: usize,       // expiry timestamp
    pub iat: usize,       // issued at
}

#[derive(Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub expiration_in_minutes: u32,
}

// ── Shared state ───────────────────────────────────────────────

pub struct AppState {
    pub store: Store,
    pub limiter: RateLimiter,
    pub tokens: TokenConfig,
    pub changes: broadcast::Sender<Change>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(store: Store, tokens: TokenConfig) -> Self {
        let (changes, _) = broadcast::channel(256);
        AppState {
            store,
            limiter: RateLimiter::new(),
            tokens,
            changes,
        }
    }

    /// Fan a change out to live subscribers. Nobody listening is fine.
    pub fn publish(&self, change: Change) {
        let _ = self.changes.send(change);
    }
}

// ── Helpers ────────────────────────────────────────────────────

pub fn create_token(user: &User, config: &TokenConfig) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let expiry = now + Duration::minutes(i64::from(config.expiration_in_minutes));

    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        exp: expiry.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

pub fn verify_token(token: &str, config: &TokenConfig) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Token → stored user. Any failure reads as "not authenticated".
pub fn resolve_user(state: &AppState, token: &str) -> Result<User, ApiError> {
    let claims = verify_token(token, &state.tokens).map_err(|_| ApiError::AuthenticationRequired)?;
    state
        .store
        .get_user(claims.sub)?
        .ok_or(ApiError::AuthenticationRequired)
}

fn issue(state: &AppState, user: &User) -> Result<AuthResponse, ApiError> {
    let token = create_token(user, &state.tokens).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(AuthResponse {
        token,
        user: UserResponse::from(user),
    })
}

// ── Handlers ───────────────────────────────────────────────────

// POST /api/auth/signup
pub async fn sign_up(
    State(state): State<SharedState>,
    client: Option<ConnectInfo<SocketAddr>>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        return Err(ValidationError::InvalidEmail.into());
    }
    if !is_valid_password(&payload.password) {
        return Err(ValidationError::WeakPassword.into());
    }

    // Each address registers once, so an email key only stops retries of the
    // same address. The peer IP caps how many accounts one client can open.
    let limit_key = match client {
        Some(ConnectInfo(addr)) => addr.ip().to_string(),
        None => email.clone(),
    };
    state.limiter.limit(Bucket::SignUp, &limit_key)?;

    let user = User {
        id: Uuid::new_v4(),
        email,
        password_hash: hash_password(&payload.password)?,
        created_at: now_millis(),
    };
    state.store.create_user(&user)?;

    tracing::info!(user_id = %user.id, "user signed up");
    Ok((StatusCode::CREATED, Json(issue(&state, &user)?)))
}

// POST /api/auth/login
pub async fn login(
    State(state): State<SharedState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = state
        .store
        .get_user_by_email(&normalize_email(&payload.email))?
        .ok_or(ApiError::InvalidCredentials)?;

    if !verify_password(&payload.password, &user.password_hash) {
        return Err(ApiError::InvalidCredentials);
    }

    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(issue(&state, &user)?))
}

// Tokens are stateless; the client drops its copy.
pub async fn logout() -> impl IntoResponse {
    StatusCode::OK
}

// GET /api/auth/me
pub async fn me(Extension(user): Extension<User>) -> Json<UserResponse> {
    Json(UserResponse::from(&user))
}

/// Resolve `Authorization: Bearer <jwt>` to a `User` extension, or reject.
pub async fn auth_middleware(
    State(state): State<SharedState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(ApiError::AuthenticationRequired)?;

    let user = resolve_user(&state, token)?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

// ── Tests ──────────────────────────────────────────────────────
