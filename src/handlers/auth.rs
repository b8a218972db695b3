use axum::{Json, extract::State};

use crate::{
    AppState,
    auth::{self, AuthUser, TokenType},
    error::{AppError, AppResult},
    models::{LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, User, UserProfile},
    response::{ApiResponse, Reply},
};

fn profile_of(state: &AppState, user: &User) -> UserProfile {
    UserProfile {
        id: user.id,
        username: user.username.clone(),
        email: user.email.clone(),
        full_name: user.full_name.clone(),
        role_id: user.role_id,
        role: state
            .permissions
            .role_name(user.role_id)
            .unwrap_or_default()
            .to_string(),
        permissions: state.permissions.permissions_for(user.role_id),
    }
}

/// login
///
/// Accepts a username or email. Unknown users and wrong passwords both answer 401 with
/// the same message. A deactivated account answers 403 before its password is checked.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Tokens and profile", body = ApiResponse<LoginResponse>),
        (status = 400, description = "Missing username or password"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account inactive")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Reply<LoginResponse>> {
    let login = payload.username.trim();
    if login.is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("username and password are required"));
    }

    let creds = state
        .repo
        .find_credentials(login)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid username or password"))?;

    if !creds.user.is_active {
        return Err(AppError::forbidden("account is inactive"));
    }
    if !auth::verify_password(&payload.password, &creds.password_hash)? {
        tracing::info!(login, "login rejected: wrong password");
        return Err(AppError::unauthorized("invalid username or password"));
    }

    let user = creds.user;
    let profile = profile_of(&state, &user);
    let (access_token, expires_in) =
        auth::issue_token(&state.config, &user, &profile.role, TokenType::Access)?;
    let (refresh_token, _) =
        auth::issue_token(&state.config, &user, &profile.role, TokenType::Refresh)?;

    tracing::info!(user_id = %user.id, role = %profile.role, "login succeeded");
    Ok(Reply::ok(
        "login successful",
        LoginResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
            user: profile,
        },
    ))
}

/// refresh
///
/// Trades a valid refresh token for a new access token. The user is re-read so a
/// deleted or deactivated account cannot keep refreshing.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = ApiResponse<RefreshResponse>),
        (status = 400, description = "Missing refresh token"),
        (status = 401, description = "Invalid or expired refresh token"),
        (status = 403, description = "Account inactive")
    ),
    tag = "auth"
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Reply<RefreshResponse>> {
    let token = payload.refresh_token.trim();
    if token.is_empty() {
        return Err(AppError::bad_request("refresh_token is required"));
    }

    let claims = auth::decode_token(&state.config, token, TokenType::Refresh)?;
    let user = state
        .repo
        .get_user(claims.sub)
        .await?
        .ok_or_else(|| AppError::unauthorized("user no longer exists"))?;
    if !user.is_active {
        return Err(AppError::forbidden("account is inactive"));
    }

    let role = state
        .permissions
        .role_name(user.role_id)
        .unwrap_or_default()
        .to_string();
    let (access_token, expires_in) =
        auth::issue_token(&state.config, &user, &role, TokenType::Access)?;

    Ok(Reply::ok(
        "token refreshed",
        RefreshResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
        },
    ))
}

/// logout
///
/// Tokens are stateless; the client discards them.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses((status = 200, description = "Logged out")),
    tag = "auth"
)]
pub async fn logout(user: AuthUser) -> Reply<()> {
    tracing::debug!(user_id = %user.id, "logout");
    Reply::done("logout successful")
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/profile",
    responses(
        (status = 200, description = "Caller profile", body = ApiResponse<UserProfile>),
        (status = 401, description = "Unauthenticated")
    ),
    tag = "auth"
)]
pub async fn profile(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Reply<UserProfile>> {
    let user = state
        .repo
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    Ok(Reply::ok("profile", profile_of(&state, &user)))
}
