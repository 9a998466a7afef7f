// Points wallet, coupons and e-vouchers

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::ledger::{self, Entry, Postings};
use super::{bounded_text, rbac, ServiceContext};
use crate::auth::tokens::OpaqueToken;
use crate::core::constants::wallet as rules;
use crate::core::errors::{GameError, GameResult};
use crate::core::models::*;
use crate::state::cache::ReadCache;
use crate::store::StoreTx;

/// Balances after a transfer
#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub points: i64,
    pub from_balance: i64,
}

/// A user's coupon with the terms of its type
#[derive(Debug, Clone, Serialize)]
pub struct OwnedCoupon {
    #[serde(flatten)]
    pub coupon: Coupon,
    pub type_name: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub min_spend: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnedEVoucher {
    #[serde(flatten)]
    pub evoucher: EVoucher,
    pub type_name: String,
    pub value_amount: i64,
}

/// Short-lived token shown at a counter to redeem an e-voucher
#[derive(Debug, Clone, Serialize)]
pub struct EVoucherPass {
    pub evoucher_code: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of an approved scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanApproval {
    pub status: RedeemStatus,
    pub evoucher_code: String,
    pub user_id: i64,
    pub value_amount: i64,
}

/// Fields for creating or replacing a coupon type
#[derive(Debug, Clone, Deserialize)]
pub struct CouponTypeInput {
    pub name: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    #[serde(default)]
    pub min_spend: i64,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub points_cost: i64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EVoucherTypeInput {
    pub name: String,
    pub value_amount: i64,
    pub points_cost: i64,
    pub total_available: i64,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub description: Option<String>,
}

fn default_true() -> bool {
    true
}

impl CouponTypeInput {
    pub(crate) fn validate(&self) -> GameResult<()> {
        bounded_text("Name", &self.name, 1, 100)?;
        if self.discount_value <= 0 {
            return Err(GameError::validation("Discount must be positive"));
        }
        if self.discount_type == DiscountType::Percent && self.discount_value > 100 {
            return Err(GameError::validation("Percent discount cannot exceed 100"));
        }
        if self.min_spend < 0 || self.points_cost < 0 {
            return Err(GameError::validation("Amounts cannot be negative"));
        }
        if self.valid_from > self.valid_to {
            return Err(GameError::validation("valid_from must not be after valid_to"));
        }
        Ok(())
    }

    pub(crate) fn into_model(self, id: i64) -> CouponType {
        CouponType {
            id,
            name: self.name.trim().to_string(),
            discount_type: self.discount_type,
            discount_value: self.discount_value,
            min_spend: self.min_spend,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            points_cost: self.points_cost,
            is_active: self.is_active,
            description: self.description,
        }
    }
}

impl EVoucherTypeInput {
    pub(crate) fn validate(&self) -> GameResult<()> {
        bounded_text("Name", &self.name, 1, 100)?;
        if self.value_amount <= 0 {
            return Err(GameError::validation("Value must be positive"));
        }
        if self.points_cost < 0 || self.total_available < 0 {
            return Err(GameError::validation("Amounts cannot be negative"));
        }
        if self.valid_from > self.valid_to {
            return Err(GameError::validation("valid_from must not be after valid_to"));
        }
        Ok(())
    }

    pub(crate) fn into_model(self, id: i64) -> EVoucherType {
        EVoucherType {
            id,
            name: self.name.trim().to_string(),
            value_amount: self.value_amount,
            points_cost: self.points_cost,
            total_available: self.total_available,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            is_active: self.is_active,
            description: self.description,
        }
    }
}

pub struct WalletService {
    ctx: ServiceContext,
    cache: Arc<ReadCache>,
}

impl WalletService {
    pub fn new(ctx: ServiceContext, cache: Arc<ReadCache>) -> Self {
        Self { ctx, cache }
    }

    pub async fn get_wallet(&self, user_id: i64) -> GameResult<Wallet> {
        let mut tx = self.ctx.store.begin().await?;
        tx.wallet_for_update(user_id)
            .await?
            .ok_or_else(|| GameError::not_found("Wallet"))
    }

    pub async fn history(&self, user_id: i64, page: PageRequest) -> GameResult<Page<WalletHistory>> {
        let mut tx = self.ctx.store.begin().await?;
        let (items, total) = tx.wallet_history(user_id, page).await?;
        Ok(Page::new(items, total, page))
    }

    /// Add points outside any other flow. Returns the new balance.
    pub async fn credit(&self, user_id: i64, points: i64, entry: Entry) -> GameResult<i64> {
        let mut fx = Postings::at(self.ctx.clock.now());
        let mut tx = self.ctx.store.begin().await?;
        let balance = ledger::credit(tx.as_mut(), &mut fx, user_id, points, entry).await?;
        tx.commit().await?;
        fx.publish(&self.ctx.metrics);
        Ok(balance)
    }

    pub async fn debit(&self, user_id: i64, points: i64, entry: Entry) -> GameResult<i64> {
        let mut fx = Postings::at(self.ctx.clock.now());
        let mut tx = self.ctx.store.begin().await?;
        let balance = ledger::debit(tx.as_mut(), &mut fx, user_id, points, entry).await?;
        tx.commit().await?;
        fx.publish(&self.ctx.metrics);
        Ok(balance)
    }

    pub async fn transfer(
        &self,
        from_user_id: i64,
        to_user_id: i64,
        points: i64,
        description: &str,
    ) -> GameResult<TransferReceipt> {
        if from_user_id == to_user_id {
            return Err(GameError::validation("Cannot transfer to yourself"));
        }
        if points <= 0 {
            return Err(GameError::validation("Points must be positive"));
        }
        let description = match description.trim() {
            "" => "Points transfer",
            text => text,
        };

        let mut fx = Postings::at(self.ctx.clock.now());
        let mut tx = self.ctx.store.begin().await?;
        // lock both wallets in id order
        for user_id in [from_user_id.min(to_user_id), from_user_id.max(to_user_id)] {
            tx.wallet_for_update(user_id)
                .await?
                .ok_or_else(|| GameError::not_found("Wallet"))?;
        }

        let from_balance = ledger::debit(
            tx.as_mut(),
            &mut fx,
            from_user_id,
            points,
            Entry::new(
                ChangeType::Transfer,
                format!("{} (To User {})", description, to_user_id),
            ),
        )
        .await?;
        ledger::credit(
            tx.as_mut(),
            &mut fx,
            to_user_id,
            points,
            Entry::new(
                ChangeType::Transfer,
                format!("{} (From User {})", description, from_user_id),
            ),
        )
        .await?;
        tx.commit().await?;
        fx.publish(&self.ctx.metrics);

        info!(from_user_id, to_user_id, points, "Points transferred");
        Ok(TransferReceipt {
            from_user_id,
            to_user_id,
            points,
            from_balance,
        })
    }

    /// Spend points on a coupon from the catalogue
    pub async fn redeem_coupon(&self, user_id: i64, coupon_type_id: i64) -> GameResult<Coupon> {
        let mut fx = Postings::at(self.ctx.clock.now());
        let mut tx = self.ctx.store.begin().await?;
        let coupon_type = tx
            .coupon_type_by_id(coupon_type_id)
            .await?
            .ok_or_else(|| GameError::not_found("Coupon type"))?;
        if !coupon_type.is_redeemable(fx.now) {
            return Err(GameError::conflict("Coupon type is not available"));
        }

        let coupon = ledger::issue_coupon(
            tx.as_mut(),
            &mut fx,
            user_id,
            &coupon_type,
            coupon_type.valid_to,
        )
        .await?;
        if coupon_type.points_cost > 0 {
            ledger::debit(
                tx.as_mut(),
                &mut fx,
                user_id,
                coupon_type.points_cost,
                Entry::new(ChangeType::Coupon, format!("Redeemed coupon {}", coupon_type.name))
                    .with_item(coupon.code.clone()),
            )
            .await?;
        }
        tx.commit().await?;
        fx.publish(&self.ctx.metrics);

        info!(user_id, coupon_type_id, code = %coupon.code, "Coupon redeemed");
        Ok(coupon)
    }

    /// Spend points on an e-voucher, bounded by the type's stock
    pub async fn redeem_evoucher(&self, user_id: i64, evoucher_type_id: i64) -> GameResult<EVoucher> {
        let mut fx = Postings::at(self.ctx.clock.now());
        let mut tx = self.ctx.store.begin().await?;
        let evoucher_type = tx
            .evoucher_type_by_id(evoucher_type_id)
            .await?
            .ok_or_else(|| GameError::not_found("E-voucher type"))?;
        if !evoucher_type.is_redeemable(fx.now) {
            return Err(GameError::conflict("E-voucher type is not available"));
        }
        let issued = tx.count_evouchers_of_type(evoucher_type.id).await?;
        if issued >= evoucher_type.total_available {
            return Err(GameError::conflict("E-voucher type is sold out"));
        }

        let code = ledger::unique_evoucher_code(tx.as_mut()).await?;
        let evoucher = tx
            .insert_evoucher(&EVoucher {
                id: 0,
                code,
                evoucher_type_id: evoucher_type.id,
                user_id,
                is_used: false,
                acquired_at: fx.now,
                expires_at: evoucher_type.valid_to,
                used_at: None,
            })
            .await?;
        if evoucher_type.points_cost > 0 {
            ledger::debit(
                tx.as_mut(),
                &mut fx,
                user_id,
                evoucher_type.points_cost,
                Entry::new(
                    ChangeType::EVoucher,
                    format!("Redeemed e-voucher {}", evoucher_type.name),
                )
                .with_item(evoucher.code.clone()),
            )
            .await?;
        }
        tx.commit().await?;
        fx.publish(&self.ctx.metrics);

        info!(user_id, evoucher_type_id, "E-voucher redeemed");
        Ok(evoucher)
    }

    pub async fn coupons(&self, user_id: i64, include_used: bool) -> GameResult<Vec<OwnedCoupon>> {
        let mut tx = self.ctx.store.begin().await?;
        let coupons = tx.coupons_of_user(user_id, include_used).await?;
        let mut owned = Vec::with_capacity(coupons.len());
        for coupon in coupons {
            let coupon_type = tx
                .coupon_type_by_id(coupon.coupon_type_id)
                .await?
                .ok_or_else(|| GameError::Storage("Coupon without type".into()))?;
            owned.push(OwnedCoupon {
                coupon,
                type_name: coupon_type.name,
                discount_type: coupon_type.discount_type,
                discount_value: coupon_type.discount_value,
                min_spend: coupon_type.min_spend,
            });
        }
        Ok(owned)
    }

    pub async fn evouchers(&self, user_id: i64, include_used: bool) -> GameResult<Vec<OwnedEVoucher>> {
        let mut tx = self.ctx.store.begin().await?;
        let evouchers = tx.evouchers_of_user(user_id, include_used).await?;
        let mut owned = Vec::with_capacity(evouchers.len());
        for evoucher in evouchers {
            let evoucher_type = tx
                .evoucher_type_by_id(evoucher.evoucher_type_id)
                .await?
                .ok_or_else(|| GameError::Storage("E-voucher without type".into()))?;
            owned.push(OwnedEVoucher {
                evoucher,
                type_name: evoucher_type.name,
                value_amount: evoucher_type.value_amount,
            });
        }
        Ok(owned)
    }

    /// An owned, unused and unexpired e-voucher, locked for update
    async fn usable_evoucher(
        tx: &mut dyn StoreTx,
        user_id: i64,
        code: &str,
        now: DateTime<Utc>,
    ) -> GameResult<EVoucher> {
        let evoucher = tx
            .evoucher_by_code_for_update(code)
            .await?
            .filter(|e| e.user_id == user_id)
            .ok_or_else(|| GameError::not_found("E-voucher"))?;
        if evoucher.is_used {
            return Err(GameError::conflict("E-voucher already used"));
        }
        if evoucher.expires_at <= now {
            return Err(GameError::conflict("E-voucher expired"));
        }
        Ok(evoucher)
    }

    pub async fn use_evoucher(&self, user_id: i64, code: &str) -> GameResult<EVoucher> {
        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;
        let mut evoucher = Self::usable_evoucher(tx.as_mut(), user_id, code, now).await?;
        evoucher.is_used = true;
        evoucher.used_at = Some(now);
        tx.update_evoucher(&evoucher).await?;
        tx.revoke_evoucher_tokens(evoucher.id).await?;
        tx.commit().await?;
        info!(user_id, code = %evoucher.code, "E-voucher used");
        Ok(evoucher)
    }

    /// Issue a presentation token; earlier tokens of the voucher stop working
    pub async fn issue_evoucher_token(&self, user_id: i64, code: &str) -> GameResult<EVoucherPass> {
        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;
        let evoucher = Self::usable_evoucher(tx.as_mut(), user_id, code, now).await?;
        tx.revoke_evoucher_tokens(evoucher.id).await?;

        let token = OpaqueToken::generate();
        let expires_at = now + Duration::minutes(rules::EVOUCHER_TOKEN_TTL_MINUTES);
        tx.insert_evoucher_token(&EVoucherToken {
            id: 0,
            evoucher_id: evoucher.id,
            token_hash: token.hash().as_str().to_string(),
            created_at: now,
            expires_at,
            revoked: false,
        })
        .await?;
        tx.commit().await?;

        Ok(EVoucherPass {
            evoucher_code: evoucher.code,
            token: token.expose_secret().to_string(),
            expires_at,
        })
    }

    /// Counter-side redemption of a presentation token.
    ///
    /// Every scan is logged, rejected ones in a transaction of their own.
    pub async fn scan_evoucher_token(&self, staff_id: i64, token: &str) -> GameResult<ScanApproval> {
        let now = self.ctx.clock.now();
        let hash = OpaqueToken::new(token).hash();
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), staff_id, Permission::CustomerService).await?;

        let (status, evoucher) = match tx.evoucher_token_by_hash(hash.as_str()).await? {
            None => (RedeemStatus::NotFound, None),
            Some(stored) => {
                let evoucher = tx.evoucher_by_id_for_update(stored.evoucher_id).await?;
                let status = match &evoucher {
                    None => RedeemStatus::NotFound,
                    Some(e) if e.is_used => RedeemStatus::AlreadyUsed,
                    Some(_) if stored.revoked => RedeemStatus::Revoked,
                    Some(_) if stored.expires_at <= now => RedeemStatus::Expired,
                    Some(e) if e.expires_at <= now => RedeemStatus::Expired,
                    Some(_) => RedeemStatus::Approved,
                };
                (status, evoucher)
            }
        };

        let log = EVoucherRedeemLog {
            id: 0,
            evoucher_id: evoucher.as_ref().map(|e| e.id),
            user_id: evoucher.as_ref().map(|e| e.user_id),
            scanned_by: staff_id,
            status,
            created_at: now,
        };

        match (status, evoucher) {
            (RedeemStatus::Approved, Some(mut evoucher)) => {
                evoucher.is_used = true;
                evoucher.used_at = Some(now);
                tx.update_evoucher(&evoucher).await?;
                tx.revoke_evoucher_tokens(evoucher.id).await?;
                tx.insert_redeem_log(&log).await?;
                let value_amount = tx
                    .evoucher_type_by_id(evoucher.evoucher_type_id)
                    .await?
                    .map_or(0, |t| t.value_amount);
                tx.commit().await?;
                info!(staff_id, code = %evoucher.code, "E-voucher scan approved");
                Ok(ScanApproval {
                    status,
                    evoucher_code: evoucher.code,
                    user_id: evoucher.user_id,
                    value_amount,
                })
            }
            _ => {
                drop(tx);
                let mut log_tx = self.ctx.store.begin().await?;
                log_tx.insert_redeem_log(&log).await?;
                log_tx.commit().await?;
                warn!(staff_id, status = %status, "E-voucher scan rejected");
                Err(match status {
                    RedeemStatus::NotFound => GameError::not_found("E-voucher token"),
                    RedeemStatus::Revoked => GameError::conflict("E-voucher token revoked"),
                    RedeemStatus::Expired => GameError::conflict("E-voucher token expired"),
                    _ => GameError::conflict("E-voucher already used"),
                })
            }
        }
    }

    pub async fn redeem_logs(
        &self,
        staff_id: i64,
        page: PageRequest,
    ) -> GameResult<Page<EVoucherRedeemLog>> {
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), staff_id, Permission::CustomerService).await?;
        let (items, total) = tx.redeem_logs(page).await?;
        Ok(Page::new(items, total, page))
    }

    /// Top balances, served from the read cache when warm
    pub async fn leaderboard(&self, limit: u32) -> GameResult<Arc<Vec<LeaderboardEntry>>> {
        let limit = limit.clamp(1, rules::LEADERBOARD_MAX);
        if let Some(entries) = self.cache.leaderboard(limit).await {
            return Ok(entries);
        }
        let mut tx = self.ctx.store.begin().await?;
        let entries = Arc::new(tx.top_wallets(i64::from(limit)).await?);
        drop(tx);
        self.cache.put_leaderboard(limit, Arc::clone(&entries)).await;
        Ok(entries)
    }

    // -- catalogue --------------------------------------------------------

    /// Coupon types a member can buy right now
    pub async fn coupon_catalogue(&self) -> GameResult<Vec<CouponType>> {
        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;
        Ok(tx
            .list_coupon_types()
            .await?
            .into_iter()
            .filter(|t| t.is_redeemable(now))
            .collect())
    }

    pub async fn evoucher_catalogue(&self) -> GameResult<Vec<EVoucherType>> {
        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;
        Ok(tx
            .list_evoucher_types()
            .await?
            .into_iter()
            .filter(|t| t.is_redeemable(now))
            .collect())
    }

    pub async fn list_coupon_types(&self, admin_id: i64) -> GameResult<Vec<CouponType>> {
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), admin_id, Permission::ShoppingPermissionManagement).await?;
        tx.list_coupon_types().await
    }

    pub async fn create_coupon_type(&self, admin_id: i64, input: CouponTypeInput) -> GameResult<CouponType> {
        input.validate()?;
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), admin_id, Permission::ShoppingPermissionManagement).await?;
        let created = tx.insert_coupon_type(&input.into_model(0)).await?;
        tx.commit().await?;
        info!(admin_id, coupon_type_id = created.id, "Coupon type created");
        Ok(created)
    }

    pub async fn update_coupon_type(
        &self,
        admin_id: i64,
        coupon_type_id: i64,
        input: CouponTypeInput,
    ) -> GameResult<CouponType> {
        input.validate()?;
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), admin_id, Permission::ShoppingPermissionManagement).await?;
        tx.coupon_type_by_id(coupon_type_id)
            .await?
            .ok_or_else(|| GameError::not_found("Coupon type"))?;
        let updated = input.into_model(coupon_type_id);
        tx.update_coupon_type(&updated).await?;
        tx.commit().await?;
        Ok(updated)
    }

    pub async fn list_evoucher_types(&self, admin_id: i64) -> GameResult<Vec<EVoucherType>> {
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), admin_id, Permission::ShoppingPermissionManagement).await?;
        tx.list_evoucher_types().await
    }

    pub async fn create_evoucher_type(
        &self,
        admin_id: i64,
        input: EVoucherTypeInput,
    ) -> GameResult<EVoucherType> {
        input.validate()?;
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), admin_id, Permission::ShoppingPermissionManagement).await?;
        let created = tx.insert_evoucher_type(&input.into_model(0)).await?;
        tx.commit().await?;
        info!(admin_id, evoucher_type_id = created.id, "E-voucher type created");
        Ok(created)
    }

    pub async fn update_evoucher_type(
        &self,
        admin_id: i64,
        evoucher_type_id: i64,
        input: EVoucherTypeInput,
    ) -> GameResult<EVoucherType> {
        input.validate()?;
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), admin_id, Permission::ShoppingPermissionManagement).await?;
        tx.evoucher_type_by_id(evoucher_type_id)
            .await?
            .ok_or_else(|| GameError::not_found("E-voucher type"))?;
        let updated = input.into_model(evoucher_type_id);
        tx.update_evoucher_type(&updated).await?;
        tx.commit().await?;
        Ok(updated)
    }
}
