use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};

use tracing::debug;

use crate::auth::{AppState, decode_token};
use crate::blocking;
use crate::error::ApiError;

/// Extract and validate the JWT from `Authorization: Bearer`, then expose its
/// claims to handlers as an `Extension<Claims>`. Tokens outlive accounts, so
/// the subject must still exist.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.map_err(|_| ApiError::Unauthorized)?;

    let claims = decode_token(&state.jwt_secret, bearer.token())?;

    let db = state.db.clone();
    let sub = claims.sub.to_string();
    let account = blocking(move || Ok(db.get_user_by_id(&sub)?)).await?;
    if account.is_none() {
        debug!("token for deleted account {}", claims.sub);
        return Err(ApiError::Unauthorized);
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
