use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use regret_types::api::{
    AuthResponse, Claims, LoginRequest, RegisterRequest, UpdatePasswordRequest, UserEnvelope,
};
use regret_types::models::{Role, User};

use crate::error::{ApiError, ValidationCode, ValidationErrors};
use crate::state::AppState;

const TOKEN_LIFETIME_DAYS: i64 = 30;
const MIN_PASSWORD_LEN: usize = 8;
const BAD_LOGIN: &str = "Invalid email or password";

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let username = req.username.trim().to_string();
    let email = req.email.trim().to_lowercase();

    let mut errors = ValidationErrors::default();
    if !(3..=32).contains(&username.chars().count()) {
        errors.push("username", ValidationCode::InvalidUsername, "Username must be 3-32 characters");
    }
    if !looks_like_email(&email) {
        errors.push("email", ValidationCode::InvalidEmail, "A valid email address is required");
    }
    check_password_strength(&mut errors, "password", &req.password);
    errors.finish(())?;

    let password_hash = hash_password(&req.password)?;

    let user_id = Uuid::new_v4();
    let user = state
        .with_db(move |db| {
            // The UNIQUE index settles concurrent registrations
            if !db.create_user(user_id, &username, &email, &password_hash, Role::User)? {
                return Err(ApiError::Conflict("Email is already registered".into()));
            }
            let row = db
                .get_user_by_id(user_id)?
                .ok_or_else(|| anyhow::anyhow!("user {} vanished after insert", user_id))?;
            Ok(row.into_model()?)
        })
        .await?;

    let token = create_token(&state.jwt_secret, &user)?;
    info!("User {} registered", user.id);

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let email = req.email.trim().to_lowercase();

    let row = state
        .with_db(move |db| Ok(db.get_user_by_email(&email)?))
        .await?
        .ok_or(ApiError::InvalidCredentials(BAD_LOGIN))?;

    if !verify_password(&req.password, &row.password)? {
        return Err(ApiError::InvalidCredentials(BAD_LOGIN));
    }

    let mut user = row.into_model()?;
    let now = Utc::now();
    let user_id = user.id;
    state
        .with_db(move |db| Ok(db.touch_last_login(user_id, now)?))
        .await?;
    user.last_login = Some(now);

    let token = create_token(&state.jwt_secret, &user)?;
    Ok(Json(AuthResponse { token, user }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let user = state
        .with_db(move |db| match db.get_user_by_id(user_id)? {
            Some(row) => Ok(Some(row.into_model()?)),
            None => Ok(None),
        })
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    Ok(Json(UserEnvelope { user }))
}

/// Change the caller's password after re-checking the current one. The
/// response carries a fresh token.
pub async fn update_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<UpdatePasswordRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let mut errors = ValidationErrors::default();
    check_password_strength(&mut errors, "newPassword", &req.new_password);
    errors.finish(())?;

    let user_id = claims.sub;
    let row = state
        .with_db(move |db| Ok(db.get_user_by_id(user_id)?))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    if !verify_password(&req.current_password, &row.password)? {
        return Err(ApiError::InvalidCredentials("Current password is incorrect"));
    }

    let password_hash = hash_password(&req.new_password)?;
    let updated = state
        .with_db(move |db| Ok(db.set_user_password(user_id, &password_hash)?))
        .await?;
    if !updated {
        return Err(ApiError::Unauthorized);
    }

    let user = row.into_model()?;
    let token = create_token(&state.jwt_secret, &user)?;
    info!("User {} changed their password", user.id);

    Ok(Json(AuthResponse { token, user }))
}

/// HS256 token carrying the user's id, name and role.
pub fn create_token(secret: &str, user: &User) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        role: user.role,
        exp: (Utc::now() + chrono::Duration::days(TOKEN_LIFETIME_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn check_password_strength(errors: &mut ValidationErrors, field: &str, password: &str) {
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(
            field,
            ValidationCode::WeakPassword,
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        );
    }
}

/// Argon2id with a fresh salt.
fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ApiError::Persistence(anyhow::anyhow!("password hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, stored: &str) -> Result<bool, ApiError> {
    let parsed_hash = PasswordHash::new(stored)
        .map_err(|e| ApiError::Persistence(anyhow::anyhow!("corrupt password hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
                && email.len() <= 254
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    #[test]
    fn email_shape() {
        assert!(looks_like_email("sam@example.com"));
        assert!(!looks_like_email("sam"));
        assert!(!looks_like_email("@example.com"));
        assert!(!looks_like_email("sam@localhost"));
        assert!(!looks_like_email("sam@example."));
        assert!(!looks_like_email("s am@example.com"));
    }

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse battery", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn token_carries_role() {
        let user = User {
            id: Uuid::new_v4(),
            username: "warden".into(),
            email: "warden@example.com".into(),
            role: Role::Admin,
            created_at: Utc::now(),
            last_login: None,
        };
        let token = create_token("unit-test-secret", &user).unwrap();
        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"unit-test-secret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(data.claims.sub, user.id);
        assert!(data.claims.is_admin());
        assert!(data.claims.exp as i64 > Utc::now().timestamp() + 29 * 24 * 3600);
    }
}
