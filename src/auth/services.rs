use axum::extract::FromRef;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        avatar::gravatar_url,
        dto::{LoginRequest, PublicUser, RegisterRequest},
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        repo_types::NewUser,
        validation::{validate_login, validate_register},
    },
    error::{AppError, AppResult},
    state::AppState,
};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Creates the account and returns a token for it.
pub async fn register(state: &AppState, mut req: RegisterRequest) -> AppResult<String> {
    req.email = req.email.trim().to_lowercase();
    req.name = req.name.trim().to_string();

    let errors = validate_register(&req);
    if !errors.is_empty() {
        warn!(email = %req.email, count = errors.len(), "register validation failed");
        return Err(AppError::Validation(errors));
    }

    if state.users.find_by_email(&req.email).await?.is_some() {
        warn!(email = %req.email, "email already registered");
        return Err(AppError::Conflict("user already exists".into()));
    }

    let password_hash = hash_password(&req.password)?;
    let avatar = gravatar_url(&req.email);
    let user = state
        .users
        .create(NewUser {
            name: req.name,
            email: req.email,
            password_hash,
            avatar,
        })
        .await?
        // lost a race with a concurrent registration
        .ok_or_else(|| AppError::Conflict("user already exists".into()))?;

    let token = JwtKeys::from_ref(state).sign(user.id)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(token)
}

/// Checks credentials and returns a token. Unknown email and wrong password
/// are indistinguishable to the caller.
pub async fn login(state: &AppState, mut req: LoginRequest) -> AppResult<String> {
    req.email = req.email.trim().to_lowercase();

    let errors = validate_login(&req);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let Some(user) = state.users.find_by_email(&req.email).await? else {
        warn!(email = %req.email, "login unknown email");
        return Err(AppError::Auth(INVALID_CREDENTIALS.into()));
    };

    if !verify_password(&req.password, &user.password_hash)? {
        warn!(email = %req.email, user_id = %user.id, "login invalid password");
        return Err(AppError::Auth(INVALID_CREDENTIALS.into()));
    }

    let token = JwtKeys::from_ref(state).sign(user.id)?;
    info!(user_id = %user.id, "user logged in");
    Ok(token)
}

pub async fn current_user(state: &AppState, user_id: Uuid) -> AppResult<PublicUser> {
    let user = state.users.find_by_id(user_id).await?.ok_or_else(|| {
        warn!(user_id = %user_id, "token for unknown user");
        AppError::Auth("User not found".into())
    })?;
    Ok(user.into())
}
