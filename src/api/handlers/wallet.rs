use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::api::responses::{ApiResult, PageQuery};
use crate::api::AppState;
use crate::core::models::*;
use crate::services::accounts::AuthUser;
use crate::services::wallet::{EVoucherPass, OwnedCoupon, OwnedEVoucher, TransferReceipt};

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub to_user_id: i64,
    pub points: i64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct OwnedQuery {
    #[serde(default)]
    pub include_used: bool,
}

#[derive(Debug, Deserialize)]
pub struct RedeemCouponRequest {
    pub coupon_type_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct RedeemEVoucherRequest {
    pub evoucher_type_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<u32>,
}

pub async fn get_wallet(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Wallet>> {
    Ok(Json(state.wallet.get_wallet(user.user_id).await?))
}

pub async fn history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<WalletHistory>>> {
    Ok(Json(state.wallet.history(user.user_id, page.into()).await?))
}

pub async fn transfer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<TransferRequest>,
) -> ApiResult<Json<TransferReceipt>> {
    let receipt = state
        .wallet
        .transfer(user.user_id, body.to_user_id, body.points, &body.description)
        .await?;
    Ok(Json(receipt))
}

pub async fn coupons(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<OwnedQuery>,
) -> ApiResult<Json<Vec<OwnedCoupon>>> {
    Ok(Json(state.wallet.coupons(user.user_id, query.include_used).await?))
}

pub async fn redeem_coupon(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<RedeemCouponRequest>,
) -> ApiResult<Json<Coupon>> {
    Ok(Json(
        state.wallet.redeem_coupon(user.user_id, body.coupon_type_id).await?,
    ))
}

pub async fn evouchers(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<OwnedQuery>,
) -> ApiResult<Json<Vec<OwnedEVoucher>>> {
    Ok(Json(state.wallet.evouchers(user.user_id, query.include_used).await?))
}

pub async fn redeem_evoucher(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<RedeemEVoucherRequest>,
) -> ApiResult<Json<EVoucher>> {
    Ok(Json(
        state.wallet.redeem_evoucher(user.user_id, body.evoucher_type_id).await?,
    ))
}

pub async fn use_evoucher(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(code): Path<String>,
) -> ApiResult<Json<EVoucher>> {
    Ok(Json(state.wallet.use_evoucher(user.user_id, &code).await?))
}

pub async fn evoucher_token(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(code): Path<String>,
) -> ApiResult<Json<EVoucherPass>> {
    Ok(Json(state.wallet.issue_evoucher_token(user.user_id, &code).await?))
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<Json<Vec<LeaderboardEntry>>> {
    let entries = state.wallet.leaderboard(query.limit.unwrap_or(10)).await?;
    Ok(Json(entries.as_ref().clone()))
}

pub async fn coupon_catalogue(State(state): State<AppState>) -> ApiResult<Json<Vec<CouponType>>> {
    Ok(Json(state.wallet.coupon_catalogue().await?))
}

pub async fn evoucher_catalogue(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<EVoucherType>>> {
    Ok(Json(state.wallet.evoucher_catalogue().await?))
}
