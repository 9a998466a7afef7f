// Online store: catalogue, cart, checkout and orders

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use super::ledger::notify;
use super::{bounded_text, rbac, ServiceContext};
use crate::core::constants::shop::MAX_LINE_QUANTITY;
use crate::core::errors::{GameError, GameResult};
use crate::core::models::*;
use crate::state::cache::ReadCache;
use crate::store::StoreTx;

#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    pub name: String,
    pub product_type: String,
    pub description: Option<String>,
    pub price: i64,
    /// Omitted means unlimited
    pub stock: Option<i64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl ProductInput {
    pub(crate) fn validate(&self) -> GameResult<()> {
        bounded_text("Name", &self.name, 1, 100)?;
        bounded_text("Product type", &self.product_type, 1, 50)?;
        if self.price < 0 {
            return Err(GameError::validation("Price cannot be negative"));
        }
        check_stock(self.stock)
    }
}

fn check_stock(stock: Option<i64>) -> GameResult<()> {
    match stock {
        Some(n) if n < 0 => Err(GameError::validation("Stock cannot be negative")),
        _ => Ok(()),
    }
}

fn ensure_stock(product: &Product, quantity: i64) -> GameResult<()> {
    match product.stock {
        Some(available) if available < quantity => Err(GameError::conflict(format!(
            "Insufficient stock for {}",
            product.name
        ))),
        _ => Ok(()),
    }
}

fn quantity_too_large() -> GameError {
    GameError::validation(format!("Quantity cannot exceed {}", MAX_LINE_QUANTITY))
}

async fn active_product(tx: &mut dyn StoreTx, product_id: i64) -> GameResult<Product> {
    tx.product_by_id_for_update(product_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| GameError::not_found("Product"))
}

#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub product_id: i64,
    pub name: String,
    pub unit_price: i64,
    pub quantity: i64,
    pub line_total: i64,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub subtotal: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub shipping_address: String,
    pub payment_method: String,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

pub struct ShopService {
    ctx: ServiceContext,
    cache: Arc<ReadCache>,
}

impl ShopService {
    pub fn new(ctx: ServiceContext, cache: Arc<ReadCache>) -> Self {
        Self { ctx, cache }
    }

    // -- catalogue --------------------------------------------------------

    pub async fn get_product(&self, product_id: i64) -> GameResult<Arc<Product>> {
        if let Some(product) = self.cache.product(product_id).await {
            return Ok(product);
        }
        let mut tx = self.ctx.store.begin().await?;
        let product = Arc::new(active_product(tx.as_mut(), product_id).await?);
        drop(tx);
        self.cache.put_product(Arc::clone(&product)).await;
        Ok(product)
    }

    pub async fn list_products(
        &self,
        product_type: Option<&str>,
        page: PageRequest,
    ) -> GameResult<Page<Product>> {
        let mut tx = self.ctx.store.begin().await?;
        let (items, total) = tx.list_products(product_type, page).await?;
        Ok(Page::new(items, total, page))
    }

    pub async fn search(&self, keyword: &str, page: PageRequest) -> GameResult<Page<Product>> {
        let keyword = bounded_text("Keyword", keyword, 1, 100)?;
        let mut tx = self.ctx.store.begin().await?;
        let (items, total) = tx.search_products(keyword, page).await?;
        Ok(Page::new(items, total, page))
    }

    pub async fn search_by_price(&self, min: i64, max: i64, page: PageRequest) -> GameResult<Page<Product>> {
        if min < 0 || max < min {
            return Err(GameError::validation("Price range must satisfy 0 <= min <= max"));
        }
        let mut tx = self.ctx.store.begin().await?;
        let (items, total) = tx.products_by_price(min, max, page).await?;
        Ok(Page::new(items, total, page))
    }

    pub async fn create_product(&self, admin_id: i64, input: ProductInput) -> GameResult<Product> {
        input.validate()?;
        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), admin_id, Permission::ShoppingPermissionManagement).await?;
        let name = input.name.trim();
        if tx.product_by_name(name).await?.is_some() {
            return Err(GameError::conflict("Product already exists"));
        }
        let product = tx
            .insert_product(&Product {
                id: 0,
                name: name.to_string(),
                product_type: input.product_type.trim().to_string(),
                description: input.description,
                price: input.price,
                stock: input.stock,
                is_active: input.is_active,
                created_at: now,
                updated_at: now,
            })
            .await?;
        tx.commit().await?;
        info!(admin_id, product_id = product.id, "Product created");
        Ok(product)
    }

    pub async fn update_product(
        &self,
        admin_id: i64,
        product_id: i64,
        input: ProductInput,
    ) -> GameResult<Product> {
        input.validate()?;
        self.edit_product(admin_id, product_id, move |p| {
            p.name = input.name.trim().to_string();
            p.product_type = input.product_type.trim().to_string();
            p.description = input.description;
            p.price = input.price;
            p.stock = input.stock;
            p.is_active = input.is_active;
        })
        .await
    }

    /// Soft delete: the product leaves the catalogue, orders keep it
    pub async fn delete_product(&self, admin_id: i64, product_id: i64) -> GameResult<Product> {
        self.edit_product(admin_id, product_id, |p| p.is_active = false).await
    }

    pub async fn set_stock(&self, admin_id: i64, product_id: i64, stock: Option<i64>) -> GameResult<Product> {
        check_stock(stock)?;
        self.edit_product(admin_id, product_id, move |p| p.stock = stock).await
    }

    async fn edit_product(
        &self,
        admin_id: i64,
        product_id: i64,
        change: impl FnOnce(&mut Product),
    ) -> GameResult<Product> {
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), admin_id, Permission::ShoppingPermissionManagement).await?;
        let mut product = tx
            .product_by_id_for_update(product_id)
            .await?
            .ok_or_else(|| GameError::not_found("Product"))?;
        change(&mut product);
        if let Some(other) = tx.product_by_name(&product.name).await? {
            if other.id != product.id {
                return Err(GameError::conflict("Product already exists"));
            }
        }
        product.updated_at = self.ctx.clock.now();
        tx.update_product(&product).await?;
        tx.commit().await?;
        self.cache.invalidate_product(product_id).await;
        info!(admin_id, product_id, "Product updated");
        Ok(product)
    }

    // -- cart -------------------------------------------------------------

    pub async fn view_cart(&self, user_id: i64) -> GameResult<CartView> {
        let mut tx = self.ctx.store.begin().await?;
        let items = tx.cart_items(user_id).await?;
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let product = tx.product_by_id_for_update(item.product_id).await?;
            let (name, unit_price, available) = match product {
                Some(p) => (p.name, p.price, p.is_active),
                None => (String::new(), 0, false),
            };
            lines.push(CartLine {
                product_id: item.product_id,
                name,
                unit_price,
                quantity: item.quantity,
                line_total: unit_price
                    .checked_mul(item.quantity)
                    .ok_or_else(|| GameError::validation("Cart total overflow"))?,
                available,
            });
        }
        let subtotal = lines
            .iter()
            .filter(|l| l.available)
            .try_fold(0i64, |acc, l| acc.checked_add(l.line_total))
            .ok_or_else(|| GameError::validation("Cart total overflow"))?;
        Ok(CartView { lines, subtotal })
    }

    /// Add to the cart, merging with any quantity already there
    pub async fn add_to_cart(&self, user_id: i64, product_id: i64, quantity: i64) -> GameResult<CartItem> {
        if quantity < 1 {
            return Err(GameError::validation("Quantity must be at least 1"));
        }
        if quantity > MAX_LINE_QUANTITY {
            return Err(quantity_too_large());
        }
        let mut tx = self.ctx.store.begin().await?;
        let product = active_product(tx.as_mut(), product_id).await?;
        let existing = tx
            .cart_items(user_id)
            .await?
            .into_iter()
            .find(|i| i.product_id == product_id);
        let merged = existing
            .as_ref()
            .map_or(0, |i| i.quantity)
            .checked_add(quantity)
            .filter(|q| *q <= MAX_LINE_QUANTITY)
            .ok_or_else(quantity_too_large)?;
        ensure_stock(&product, merged)?;

        let item = CartItem {
            user_id,
            product_id,
            quantity: merged,
            added_at: existing.map_or_else(|| self.ctx.clock.now(), |i| i.added_at),
        };
        tx.upsert_cart_item(&item).await?;
        tx.commit().await?;
        Ok(item)
    }

    /// Set a line's quantity; zero removes the line
    pub async fn update_cart_item(&self, user_id: i64, product_id: i64, quantity: i64) -> GameResult<()> {
        if quantity < 0 {
            return Err(GameError::validation("Quantity cannot be negative"));
        }
        if quantity > MAX_LINE_QUANTITY {
            return Err(quantity_too_large());
        }
        let mut tx = self.ctx.store.begin().await?;
        let existing = tx
            .cart_items(user_id)
            .await?
            .into_iter()
            .find(|i| i.product_id == product_id)
            .ok_or_else(|| GameError::not_found("Cart item"))?;
        if quantity == 0 {
            tx.delete_cart_item(user_id, product_id).await?;
        } else {
            let product = active_product(tx.as_mut(), product_id).await?;
            ensure_stock(&product, quantity)?;
            tx.upsert_cart_item(&CartItem { quantity, ..existing }).await?;
        }
        tx.commit().await
    }

    pub async fn remove_from_cart(&self, user_id: i64, product_id: i64) -> GameResult<bool> {
        let mut tx = self.ctx.store.begin().await?;
        let removed = tx.delete_cart_item(user_id, product_id).await?;
        tx.commit().await?;
        Ok(removed)
    }

    pub async fn clear_cart(&self, user_id: i64) -> GameResult<()> {
        let mut tx = self.ctx.store.begin().await?;
        tx.clear_cart(user_id).await?;
        tx.commit().await
    }

    // -- checkout ---------------------------------------------------------

    pub async fn checkout(&self, user_id: i64, request: CheckoutRequest) -> GameResult<OrderDetail> {
        let shipping_address = bounded_text("Shipping address", &request.shipping_address, 1, 200)?;
        let payment_method = bounded_text("Payment method", &request.payment_method, 1, 50)?;
        let now = self.ctx.clock.now();

        let mut tx = self.ctx.store.begin().await?;
        let user = tx
            .user_by_id(user_id)
            .await?
            .ok_or_else(|| GameError::not_found("User"))?;
        if !user.shopping_permission {
            return Err(GameError::forbidden("Shopping is disabled for this account"));
        }
        let cart = tx.cart_items(user_id).await?;
        if cart.is_empty() {
            return Err(GameError::validation("Cart is empty"));
        }

        let mut lines = Vec::with_capacity(cart.len());
        let mut subtotal: i64 = 0;
        for item in &cart {
            let mut product = tx
                .product_by_id_for_update(item.product_id)
                .await?
                .filter(|p| p.is_active)
                .ok_or_else(|| GameError::conflict("A product in the cart is no longer available"))?;
            ensure_stock(&product, item.quantity)?;
            if let Some(stock) = product.stock.as_mut() {
                *stock -= item.quantity;
                product.updated_at = now;
                tx.update_product(&product).await?;
            }
            let line_total = product
                .price
                .checked_mul(item.quantity)
                .ok_or_else(|| GameError::validation("Order total overflow"))?;
            subtotal = subtotal
                .checked_add(line_total)
                .ok_or_else(|| GameError::validation("Order total overflow"))?;
            lines.push((product, item.quantity, line_total));
        }

        let mut coupon = None;
        let mut discount = 0;
        if let Some(code) = request.coupon_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            let found = tx
                .coupon_by_code_for_update(code)
                .await?
                .filter(|c| c.user_id == user_id)
                .ok_or_else(|| GameError::not_found("Coupon"))?;
            if found.is_used {
                return Err(GameError::conflict("Coupon already used"));
            }
            if found.expires_at <= now {
                return Err(GameError::conflict("Coupon expired"));
            }
            let coupon_type = tx
                .coupon_type_by_id(found.coupon_type_id)
                .await?
                .ok_or_else(|| GameError::Storage("Coupon without type".into()))?;
            if subtotal < coupon_type.min_spend {
                return Err(GameError::validation(format!(
                    "Coupon requires a minimum spend of {}",
                    coupon_type.min_spend
                )));
            }
            discount = coupon_type.discount_for(subtotal);
            coupon = Some(found);
        }

        let order = tx
            .insert_order(&Order {
                id: 0,
                user_id,
                status: OrderStatus::Pending,
                subtotal,
                discount,
                total: subtotal - discount,
                coupon_id: coupon.as_ref().map(|c| c.id),
                coupon_code: coupon.as_ref().map(|c| c.code.clone()),
                shipping_address: shipping_address.to_string(),
                payment_method: payment_method.to_string(),
                created_at: now,
                updated_at: now,
            })
            .await?;

        let mut items = Vec::with_capacity(lines.len());
        for (product, quantity, line_total) in &lines {
            items.push(
                tx.insert_order_item(&OrderItem {
                    id: 0,
                    order_id: order.id,
                    product_id: product.id,
                    product_name: product.name.clone(),
                    unit_price: product.price,
                    quantity: *quantity,
                    line_total: *line_total,
                })
                .await?,
            );
        }
        if let Some(mut coupon) = coupon {
            coupon.is_used = true;
            coupon.used_at = Some(now);
            coupon.used_in_order_id = Some(order.id);
            tx.update_coupon(&coupon).await?;
        }
        tx.clear_cart(user_id).await?;
        tx.commit().await?;

        for (product, _, _) in &lines {
            self.cache.invalidate_product(product.id).await;
        }
        self.ctx.metrics.orders_placed.inc();
        info!(user_id, order_id = order.id, total = order.total, "Order placed");
        Ok(OrderDetail { order, items })
    }

    // -- orders -----------------------------------------------------------

    pub async fn list_orders(&self, user_id: i64, page: PageRequest) -> GameResult<Page<Order>> {
        let mut tx = self.ctx.store.begin().await?;
        let (items, total) = tx.orders_of_user(user_id, page).await?;
        Ok(Page::new(items, total, page))
    }

    /// Visible to the owner and to customer service
    pub async fn get_order(&self, user_id: i64, order_id: i64) -> GameResult<OrderDetail> {
        let mut tx = self.ctx.store.begin().await?;
        let order = tx
            .order_by_id_for_update(order_id)
            .await?
            .ok_or_else(|| GameError::not_found("Order"))?;
        if order.user_id != user_id
            && !rbac::permissions_in(tx.as_mut(), user_id)
                .await?
                .contains(&Permission::CustomerService)
        {
            return Err(GameError::not_found("Order"));
        }
        let items = tx.order_items(order.id).await?;
        Ok(OrderDetail { order, items })
    }

    pub async fn cancel_order(&self, user_id: i64, order_id: i64) -> GameResult<Order> {
        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;
        let mut order = tx
            .order_by_id_for_update(order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| GameError::not_found("Order"))?;
        if !order.status.can_transition_to(OrderStatus::Cancelled) {
            return Err(GameError::conflict(format!(
                "Cannot cancel an order that is {}",
                order.status
            )));
        }
        let touched = Self::unwind(tx.as_mut(), &order, now).await?;
        order.status = OrderStatus::Cancelled;
        order.updated_at = now;
        tx.update_order(&order).await?;
        tx.commit().await?;

        for product_id in touched {
            self.cache.invalidate_product(product_id).await;
        }
        info!(user_id, order_id, "Order cancelled");
        Ok(order)
    }

    pub async fn set_status(&self, admin_id: i64, order_id: i64, status: OrderStatus) -> GameResult<Order> {
        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), admin_id, Permission::ShoppingPermissionManagement).await?;
        let mut order = tx
            .order_by_id_for_update(order_id)
            .await?
            .ok_or_else(|| GameError::not_found("Order"))?;
        if !order.status.can_transition_to(status) {
            return Err(GameError::conflict(format!(
                "Cannot move order from {} to {}",
                order.status, status
            )));
        }
        let touched = if status == OrderStatus::Cancelled {
            Self::unwind(tx.as_mut(), &order, now).await?
        } else {
            BTreeSet::new()
        };
        order.status = status;
        order.updated_at = now;
        tx.update_order(&order).await?;
        notify(
            tx.as_mut(),
            order.user_id,
            "Order update",
            format!("Your order #{} is now {}", order.id, status),
            now,
        )
        .await?;
        tx.commit().await?;

        for product_id in touched {
            self.cache.invalidate_product(product_id).await;
        }
        info!(admin_id, order_id, status = %status, "Order status changed");
        Ok(order)
    }

    /// Put stock back and release the coupon of an order being cancelled.
    /// Returns the products whose stock changed.
    async fn unwind(
        tx: &mut dyn StoreTx,
        order: &Order,
        now: chrono::DateTime<chrono::Utc>,
    ) -> GameResult<BTreeSet<i64>> {
        let mut touched = BTreeSet::new();
        for item in tx.order_items(order.id).await? {
            if let Some(mut product) = tx.product_by_id_for_update(item.product_id).await? {
                if let Some(stock) = product.stock.as_mut() {
                    *stock += item.quantity;
                    product.updated_at = now;
                    tx.update_product(&product).await?;
                    touched.insert(product.id);
                }
            }
        }
        if let Some(coupon_id) = order.coupon_id {
            if let Some(mut coupon) = tx.coupon_by_id(coupon_id).await? {
                coupon.is_used = false;
                coupon.used_at = None;
                coupon.used_in_order_id = None;
                tx.update_coupon(&coupon).await?;
            }
        }
        Ok(touched)
    }
}
