use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand_core::OsRng;
use tracing::{error, info};
use uuid::Uuid;

use relief_db::{Database, NewUser};
use relief_gateway::Dispatcher;
use relief_gateway::connection::AccountLookup;
use relief_types::api::{AuthResponse, Claims, Envelope, LoginRequest, RegisterRequest};
use relief_types::models::{Role, User};

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
}

impl AccountLookup for AppStateInner {
    fn current_role(&self, user_id: Uuid) -> anyhow::Result<Option<Role>> {
        Ok(self.db.get_user(user_id)?.map(|u| u.role))
    }
}

const TOKEN_TTL_DAYS: i64 = 30;
const MIN_PASSWORD_LEN: usize = 6;

/// Run a blocking database call off the async runtime.
pub async fn run_db<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("database task failed"))
        })?
        .map_err(ApiError::from)
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = req.name.trim().to_string();
    let email = req.email.trim().to_lowercase();
    if name.is_empty() {
        return Err(ApiError::bad_request("Name is required"));
    }
    if !email.contains('@') {
        return Err(ApiError::bad_request("A valid email is required"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let role = req.role.unwrap_or(Role::AffectedIndividual);

    let password_hash = hash_password(req.password).await?;

    let volunteer = req.volunteer_details.unwrap_or_default();
    let new_user = NewUser {
        id: Uuid::new_v4(),
        name,
        email,
        password_hash,
        role,
        is_verified: role.verified_on_registration(),
        phone: req.phone,
        address: req.address,
        ngo_details: req.ngo_details.filter(|_| role == Role::Ngo),
        skills: volunteer.skills,
        availability: volunteer.availability,
        affected_details: req.affected_details.filter(|_| role == Role::AffectedIndividual),
    };

    // Duplicate emails and a second self-registered admin are refused here.
    let user = run_db(&state, move |db| db.register_user(&new_user)).await?;
    let token = create_token(&state.jwt_secret, &user)?;
    info!("Registered {} ({}) as {}", user.email, user.id, user.role);

    Ok((
        StatusCode::CREATED,
        Json(Envelope::data(AuthResponse { user, token }).with_message("User registered successfully")),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = req.email.trim().to_lowercase();
    let (user, stored_hash) = run_db(&state, move |db| db.get_credentials(&email))
        .await?
        .ok_or_else(invalid_credentials)?;

    let password = req.password;
    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password task failed: {}", e)))?;
    if !matches {
        return Err(invalid_credentials());
    }

    if !user.is_verified {
        return Err(ApiError::forbidden(
            "Your account is pending verification by an administrator",
        ));
    }

    let token = create_token(&state.jwt_secret, &user)?;
    Ok(Json(Envelope::data(AuthResponse { user, token }).with_message("Login successful")))
}

pub async fn me(Extension(user): Extension<User>) -> Json<Envelope<User>> {
    Json(Envelope::data(user))
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid credentials".to_string())
}

/// Hash a password with Argon2id on the blocking pool.
pub async fn hash_password(password: String) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("password task failed: {}", e)))?
    .map_err(ApiError::from)
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn create_token(secret: &str, user: &User) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        role: user.role,
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
