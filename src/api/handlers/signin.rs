use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Datelike;
use serde::Deserialize;

use crate::api::responses::ApiResult;
use crate::api::AppState;
use crate::core::models::SignInRecord;
use crate::services::accounts::AuthUser;
use crate::services::signin::{MonthCalendar, SignInStatus};

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

pub async fn sign_in(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<SignInRecord>> {
    Ok(Json(state.signin.sign_in(user.user_id).await?))
}

pub async fn status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<SignInStatus>> {
    Ok(Json(state.signin.status(user.user_id).await?))
}

pub async fn history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<SignInRecord>>> {
    let days = query.days.unwrap_or(30);
    Ok(Json(state.signin.history(user.user_id, days).await?))
}

/// Defaults to the current UTC month
pub async fn calendar(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<CalendarQuery>,
) -> ApiResult<Json<MonthCalendar>> {
    let today = state.signin.today();
    let year = query.year.unwrap_or_else(|| today.year());
    let month = query.month.unwrap_or_else(|| today.month());
    Ok(Json(state.signin.month_calendar(user.user_id, year, month).await?))
}
