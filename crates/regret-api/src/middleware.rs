use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use regret_types::api::Claims;
use regret_types::models::Confession;

use crate::error::ApiError;
use crate::state::AppState;

/// Who is calling, if anyone. Inserted by [`optional_auth`].
#[derive(Debug, Clone, Default)]
pub struct Requester(pub Option<Claims>);

impl Requester {
    pub fn user_id(&self) -> Option<Uuid> {
        self.0.as_ref().map(|c| c.sub)
    }

    /// Claims, or 401 for anonymous callers.
    pub fn claims(&self) -> Result<&Claims, ApiError> {
        self.0.as_ref().ok_or(ApiError::Unauthorized)
    }

    /// Private confessions are visible to their author and to admins only.
    pub fn can_view(&self, confession: &Confession) -> bool {
        confession.is_public || self.0.as_ref().is_some_and(|c| can_modify(c, confession))
    }
}

/// Authors may change their own confessions; admins may change any.
/// Confessions without an author are therefore admin-only. The role here is
/// the stored one, refreshed by [`authenticate`] on every request.
pub fn can_modify(claims: &Claims, confession: &Confession) -> bool {
    claims.is_admin() || confession.author == Some(claims.sub)
}

/// Extract and validate JWT from Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&req)?
        .map(str::to_owned)
        .ok_or(ApiError::Unauthorized)?;
    let claims = authenticate(&state, &token).await?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Like [`require_auth`] but lets anonymous callers through. A token that is
/// present but invalid is still rejected.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&req)?.map(str::to_owned);
    let claims = match token {
        Some(token) => Some(authenticate(&state, &token).await?),
        None => None,
    };

    req.extensions_mut().insert(Requester(claims));
    Ok(next.run(req).await)
}

/// Decode the token, then check the account still exists. Name and role are
/// taken from the store so a demotion applies before the token expires.
async fn authenticate(state: &AppState, token: &str) -> Result<Claims, ApiError> {
    let mut claims = decode_claims(&state.jwt_secret, token)?;

    let user_id = claims.sub;
    let user = state
        .with_db(move |db| match db.get_user_by_id(user_id)? {
            Some(row) => Ok(Some(row.into_model()?)),
            None => Ok(None),
        })
        .await?
        .ok_or(ApiError::Unauthorized)?;

    claims.username = user.username;
    claims.role = user.role;
    Ok(claims)
}

fn bearer_token(req: &Request) -> Result<Option<&str>, ApiError> {
    let Some(value) = req.headers().get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized)?;
    Ok(Some(token))
}

pub fn decode_claims(secret: &str, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::Unauthorized)
}
