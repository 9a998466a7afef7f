use axum::{extract::State, http::HeaderMap, Extension, Json};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::api::responses::{ApiResult, StatusResponse};
use crate::api::AppState;
use crate::auth::auth_middleware::client_ip;
use crate::core::models::Role;
use crate::services::accounts::{AuthTokens, AuthUser, Registration, UserProfile};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub account: String,
    pub email: String,
    pub nickname: Option<String>,
    pub password: SecretString,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub account: String,
    pub password: SecretString,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: SecretString,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: SecretString,
    pub new_password: SecretString,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmEmailRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub nickname: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<Json<AuthTokens>> {
    let nickname = body.nickname.as_deref().unwrap_or(&body.account);
    let tokens = state
        .accounts
        .register(Registration {
            account: &body.account,
            email: &body.email,
            nickname,
            password: body.password.expose_secret(),
        })
        .await?;
    Ok(Json(tokens))
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<AuthTokens>> {
    let ip = client_ip(&headers);
    let tokens = state
        .accounts
        .login(&body.account, body.password.expose_secret(), ip.as_deref())
        .await?;
    Ok(Json(tokens))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<Json<AuthTokens>> {
    Ok(Json(state.accounts.refresh(&body.refresh_token).await?))
}

pub async fn logout(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<Json<StatusResponse>> {
    state.accounts.logout(&body.refresh_token).await?;
    Ok(StatusResponse::ok())
}

/// Always answers ok so the response does not reveal registered emails
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<StatusResponse>> {
    state.accounts.request_password_reset(&body.email).await?;
    Ok(StatusResponse::ok())
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> ApiResult<Json<StatusResponse>> {
    state
        .accounts
        .reset_password(&body.token, body.new_password.expose_secret())
        .await?;
    Ok(StatusResponse::ok())
}

pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(state.accounts.profile(user.user_id).await?))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<UpdateProfileRequest>,
) -> ApiResult<Json<UserProfile>> {
    Ok(Json(
        state.accounts.update_nickname(user.user_id, &body.nickname).await?,
    ))
}

pub async fn my_roles(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Role>>> {
    Ok(Json(state.rbac.roles_of(user.user_id).await?))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ChangePasswordRequest>,
) -> ApiResult<Json<StatusResponse>> {
    state
        .accounts
        .change_password(
            user.user_id,
            body.current_password.expose_secret(),
            body.new_password.expose_secret(),
        )
        .await?;
    Ok(StatusResponse::ok())
}

pub async fn confirm_email(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ConfirmEmailRequest>,
) -> ApiResult<Json<StatusResponse>> {
    state.accounts.confirm_email(user.user_id, &body.token).await?;
    Ok(StatusResponse::ok())
}
