use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::api::responses::{ApiResult, PageQuery, StatusResponse};
use crate::api::AppState;
use crate::core::errors::GameError;
use crate::core::models::{CartItem, Order, Page, Product};
use crate::services::accounts::AuthUser;
use crate::services::shop::{CartView, CheckoutRequest, OrderDetail};

#[derive(Debug, Deserialize)]
pub struct ProductListQuery {
    pub product_type: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// Either `q`, or a `min_price`/`max_price` range
#[derive(Debug, Deserialize)]
pub struct ProductSearchQuery {
    pub q: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    pub removed: bool,
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> ApiResult<Json<Page<Product>>> {
    let page = PageQuery {
        page: query.page,
        page_size: query.page_size,
    };
    let products = state
        .shop
        .list_products(query.product_type.as_deref(), page.into())
        .await?;
    Ok(Json(products))
}

pub async fn search_products(
    State(state): State<AppState>,
    Query(query): Query<ProductSearchQuery>,
) -> ApiResult<Json<Page<Product>>> {
    let page = PageQuery {
        page: query.page,
        page_size: query.page_size,
    }
    .into();
    let products = match (query.q.as_deref(), query.min_price, query.max_price) {
        (Some(keyword), _, _) => state.shop.search(keyword, page).await?,
        (None, None, None) => {
            return Err(GameError::validation("Give a keyword or a price range").into())
        }
        (None, min, max) => {
            state
                .shop
                .search_by_price(min.unwrap_or(0), max.unwrap_or(i64::MAX), page)
                .await?
        }
    };
    Ok(Json(products))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
) -> ApiResult<Json<Product>> {
    let product = state.shop.get_product(product_id).await?;
    Ok(Json(product.as_ref().clone()))
}

pub async fn view_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<CartView>> {
    Ok(Json(state.shop.view_cart(user.user_id).await?))
}

pub async fn add_to_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<AddToCartRequest>,
) -> ApiResult<Json<CartItem>> {
    let item = state
        .shop
        .add_to_cart(user.user_id, body.product_id, body.quantity)
        .await?;
    Ok(Json(item))
}

/// Quantity 0 removes the line
pub async fn update_cart_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(product_id): Path<i64>,
    Json(body): Json<QuantityRequest>,
) -> ApiResult<Json<StatusResponse>> {
    state
        .shop
        .update_cart_item(user.user_id, product_id, body.quantity)
        .await?;
    Ok(StatusResponse::ok())
}

pub async fn remove_from_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(product_id): Path<i64>,
) -> ApiResult<Json<RemovedResponse>> {
    let removed = state.shop.remove_from_cart(user.user_id, product_id).await?;
    Ok(Json(RemovedResponse { removed }))
}

pub async fn clear_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<StatusResponse>> {
    state.shop.clear_cart(user.user_id).await?;
    Ok(StatusResponse::ok())
}

pub async fn checkout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CheckoutRequest>,
) -> ApiResult<Json<OrderDetail>> {
    Ok(Json(state.shop.checkout(user.user_id, body).await?))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<Order>>> {
    Ok(Json(state.shop.list_orders(user.user_id, page.into()).await?))
}

pub async fn get_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(order_id): Path<i64>,
) -> ApiResult<Json<OrderDetail>> {
    Ok(Json(state.shop.get_order(user.user_id, order_id).await?))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(order_id): Path<i64>,
) -> ApiResult<Json<Order>> {
    Ok(Json(state.shop.cancel_order(user.user_id, order_id).await?))
}
