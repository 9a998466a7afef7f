// Back-office endpoints. Every call is checked against the caller's
// permissions inside the service, so these handlers only shape requests.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::responses::{ApiResult, PageQuery, StatusResponse};
use crate::api::AppState;
use crate::core::models::*;
use crate::services::accounts::AuthUser;
use crate::services::admin::{Dashboard, ManagedUser, RightsChange};
use crate::services::shop::ProductInput;
use crate::services::wallet::{CouponTypeInput, EVoucherTypeInput, ScanApproval};

#[derive(Debug, Default, Deserialize)]
pub struct LockRequest {
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustPointsRequest {
    pub delta: i64,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: i64,
    pub points: i64,
}

#[derive(Debug, Serialize)]
pub struct ChangedResponse {
    pub changed: bool,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub name: String,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Deserialize)]
pub struct RoleUpdateRequest {
    pub name: Option<String>,
    pub permissions: Option<Vec<Permission>>,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct StockRequest {
    pub stock: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct OrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    pub user_id: i64,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ForumRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForumUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FlagRequest {
    pub value: bool,
}

// -- users ------------------------------------------------------------------

pub async fn dashboard(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
) -> ApiResult<Json<Dashboard>> {
    Ok(Json(state.admin.dashboard(admin.user_id).await?))
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<ManagedUser>>> {
    Ok(Json(state.admin.list_users(admin.user_id, page.into()).await?))
}

/// An empty body locks indefinitely
pub async fn lock_user(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(user_id): Path<i64>,
    body: Option<Json<LockRequest>>,
) -> ApiResult<Json<ManagedUser>> {
    let until = body.and_then(|Json(b)| b.until);
    Ok(Json(state.admin.lock_user(admin.user_id, user_id, until).await?))
}

pub async fn unlock_user(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<ManagedUser>> {
    Ok(Json(state.admin.unlock_user(admin.user_id, user_id).await?))
}

pub async fn set_rights(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(user_id): Path<i64>,
    Json(change): Json<RightsChange>,
) -> ApiResult<Json<ManagedUser>> {
    Ok(Json(
        state.admin.set_user_rights(admin.user_id, user_id, change).await?,
    ))
}

pub async fn adjust_points(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(user_id): Path<i64>,
    Json(body): Json<AdjustPointsRequest>,
) -> ApiResult<Json<BalanceResponse>> {
    let points = state
        .admin
        .adjust_points(admin.user_id, user_id, body.delta, &body.reason)
        .await?;
    Ok(Json(BalanceResponse { user_id, points }))
}

// -- roles ------------------------------------------------------------------

pub async fn list_roles(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Role>>> {
    Ok(Json(state.rbac.list_roles(admin.user_id).await?))
}

pub async fn create_role(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Json(body): Json<RoleRequest>,
) -> ApiResult<Json<Role>> {
    Ok(Json(
        state
            .rbac
            .create_role(admin.user_id, &body.name, body.permissions)
            .await?,
    ))
}

pub async fn update_role(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(role_id): Path<i64>,
    Json(body): Json<RoleUpdateRequest>,
) -> ApiResult<Json<Role>> {
    let role = state
        .rbac
        .update_role(admin.user_id, role_id, body.name.as_deref(), body.permissions)
        .await?;
    Ok(Json(role))
}

pub async fn assign_role(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path((user_id, role_id)): Path<(i64, i64)>,
) -> ApiResult<Json<ChangedResponse>> {
    let changed = state.rbac.assign_role(admin.user_id, user_id, role_id).await?;
    Ok(Json(ChangedResponse { changed }))
}

pub async fn revoke_role(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path((user_id, role_id)): Path<(i64, i64)>,
) -> ApiResult<Json<ChangedResponse>> {
    let changed = state.rbac.revoke_role(admin.user_id, user_id, role_id).await?;
    Ok(Json(ChangedResponse { changed }))
}

// -- coupon and e-voucher types --------------------------------------------

pub async fn list_coupon_types(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
) -> ApiResult<Json<Vec<CouponType>>> {
    Ok(Json(state.wallet.list_coupon_types(admin.user_id).await?))
}

pub async fn create_coupon_type(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Json(input): Json<CouponTypeInput>,
) -> ApiResult<Json<CouponType>> {
    Ok(Json(state.wallet.create_coupon_type(admin.user_id, input).await?))
}

pub async fn update_coupon_type(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(input): Json<CouponTypeInput>,
) -> ApiResult<Json<CouponType>> {
    Ok(Json(
        state.wallet.update_coupon_type(admin.user_id, id, input).await?,
    ))
}

pub async fn list_evoucher_types(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
) -> ApiResult<Json<Vec<EVoucherType>>> {
    Ok(Json(state.wallet.list_evoucher_types(admin.user_id).await?))
}

pub async fn create_evoucher_type(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Json(input): Json<EVoucherTypeInput>,
) -> ApiResult<Json<EVoucherType>> {
    Ok(Json(
        state.wallet.create_evoucher_type(admin.user_id, input).await?,
    ))
}

pub async fn update_evoucher_type(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(input): Json<EVoucherTypeInput>,
) -> ApiResult<Json<EVoucherType>> {
    Ok(Json(
        state.wallet.update_evoucher_type(admin.user_id, id, input).await?,
    ))
}

pub async fn scan_evoucher(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthUser>,
    Json(body): Json<ScanRequest>,
) -> ApiResult<Json<ScanApproval>> {
    Ok(Json(
        state.wallet.scan_evoucher_token(staff.user_id, &body.token).await?,
    ))
}

pub async fn redeem_logs(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<EVoucherRedeemLog>>> {
    Ok(Json(state.wallet.redeem_logs(staff.user_id, page.into()).await?))
}

// -- store ------------------------------------------------------------------

pub async fn create_product(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Json(input): Json<ProductInput>,
) -> ApiResult<Json<Product>> {
    Ok(Json(state.shop.create_product(admin.user_id, input).await?))
}

pub async fn update_product(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(input): Json<ProductInput>,
) -> ApiResult<Json<Product>> {
    Ok(Json(state.shop.update_product(admin.user_id, id, input).await?))
}

/// Soft delete; the product stays on past orders
pub async fn delete_product(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Product>> {
    Ok(Json(state.shop.delete_product(admin.user_id, id).await?))
}

pub async fn set_stock(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(body): Json<StockRequest>,
) -> ApiResult<Json<Product>> {
    Ok(Json(state.shop.set_stock(admin.user_id, id, body.stock).await?))
}

pub async fn set_order_status(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(body): Json<OrderStatusRequest>,
) -> ApiResult<Json<Order>> {
    Ok(Json(state.shop.set_status(admin.user_id, id, body.status).await?))
}

// -- pets and notifications -------------------------------------------------

pub async fn view_pet(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<Pet>> {
    Ok(Json(state.pets.view_pet(admin.user_id, user_id).await?))
}

pub async fn reset_pet(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<Pet>> {
    Ok(Json(state.pets.reset_pet(admin.user_id, user_id).await?))
}

pub async fn send_notification(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthUser>,
    Json(body): Json<SendNotificationRequest>,
) -> ApiResult<Json<Notification>> {
    let sent = state
        .notifications
        .send(staff.user_id, body.user_id, &body.title, &body.message)
        .await?;
    Ok(Json(sent))
}

// -- forum moderation -------------------------------------------------------

pub async fn create_forum(
    State(state): State<AppState>,
    Extension(moderator): Extension<AuthUser>,
    Json(body): Json<ForumRequest>,
) -> ApiResult<Json<Forum>> {
    let forum = state
        .forum
        .create_forum(moderator.user_id, &body.name, body.description)
        .await?;
    Ok(Json(forum))
}

pub async fn update_forum(
    State(state): State<AppState>,
    Extension(moderator): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(body): Json<ForumUpdateRequest>,
) -> ApiResult<Json<Forum>> {
    let forum = state
        .forum
        .update_forum(moderator.user_id, id, body.name.as_deref(), body.description)
        .await?;
    Ok(Json(forum))
}

pub async fn delete_forum(
    State(state): State<AppState>,
    Extension(moderator): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<StatusResponse>> {
    state.forum.delete_forum(moderator.user_id, id).await?;
    Ok(StatusResponse::ok())
}

pub async fn pin_thread(
    State(state): State<AppState>,
    Extension(moderator): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(body): Json<FlagRequest>,
) -> ApiResult<Json<Thread>> {
    Ok(Json(state.forum.set_pinned(moderator.user_id, id, body.value).await?))
}

pub async fn lock_thread(
    State(state): State<AppState>,
    Extension(moderator): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(body): Json<FlagRequest>,
) -> ApiResult<Json<Thread>> {
    Ok(Json(state.forum.set_locked(moderator.user_id, id, body.value).await?))
}
