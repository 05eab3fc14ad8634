use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use relief_types::api::Claims;
use relief_types::models::{Role, User};

use crate::auth::{AppState, run_db};
use crate::error::{ApiError, ApiResult};

/// Validate the bearer token and load the caller into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> ApiResult<Response> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or_else(|| {
        ApiError::Unauthorized("Not authorized, no token".to_string())
    })?;

    let token_data = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!("Rejected token: {}", e);
        ApiError::Unauthorized("Not authorized, token failed".to_string())
    })?;

    let user_id = token_data.claims.sub;
    let user = run_db(&state, move |db| db.get_user(user_id))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User no longer exists".to_string()))?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// 403 unless the caller holds one of `roles`.
pub fn require_role(user: &User, roles: &[Role]) -> ApiResult<()> {
    if roles.contains(&user.role) {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!(
            "User role {} is not authorized to access this route",
            user.role
        )))
    }
}

/// 403 until an admin has approved the account.
pub fn require_verified(user: &User) -> ApiResult<()> {
    if user.is_verified {
        Ok(())
    } else {
        Err(ApiError::forbidden("Your account is pending verification"))
    }
}

/// Role check followed by the verification check.
pub fn require_verified_role(user: &User, roles: &[Role]) -> ApiResult<()> {
    require_role(user, roles)?;
    require_verified(user)
}
