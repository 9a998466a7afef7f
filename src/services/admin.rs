// Back-office: dashboard, user status and rights, point adjustments

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use super::ledger::{self, Entry, Postings};
use super::{bounded_text, rbac, ServiceContext};
use crate::core::clock::day_bounds;
use crate::core::errors::{GameError, GameResult};
use crate::core::models::*;
use crate::store::StoreTx;

/// Lock length when the admin gives no end
const INDEFINITE_LOCK_YEARS: i64 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub user_count: i64,
    pub total_points: i64,
    pub orders_by_status: BTreeMap<String, i64>,
    pub games_today: i64,
    pub sign_ins_today: i64,
}

/// A user as shown to administrators
#[derive(Debug, Clone, Serialize)]
pub struct ManagedUser {
    pub id: i64,
    pub account: String,
    pub email: String,
    pub nickname: String,
    pub is_active: bool,
    pub email_confirmed: bool,
    pub shopping_permission: bool,
    pub message_permission: bool,
    pub access_failed_count: i32,
    pub lockout_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<User> for ManagedUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            account: user.account,
            email: user.email,
            nickname: user.nickname,
            is_active: user.is_active,
            email_confirmed: user.email_confirmed,
            shopping_permission: user.shopping_permission,
            message_permission: user.message_permission,
            access_failed_count: user.access_failed_count,
            lockout_end: user.lockout_end,
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

/// Fields left as `None` are not touched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RightsChange {
    pub is_active: Option<bool>,
    pub shopping_permission: Option<bool>,
    pub message_permission: Option<bool>,
}

async fn target_user(tx: &mut dyn StoreTx, user_id: i64) -> GameResult<User> {
    tx.user_by_id(user_id)
        .await?
        .ok_or_else(|| GameError::not_found("User"))
}

pub struct AdminService {
    ctx: ServiceContext,
}

impl AdminService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn dashboard(&self, admin_id: i64) -> GameResult<Dashboard> {
        let today = self.ctx.clock.today();
        let (from, to) = day_bounds(today);
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), admin_id, Permission::AdministratorPrivilegesManagement).await?;

        let (_, user_count) = tx.list_users(PageRequest::new(1, 1)).await?;
        let orders_by_status = tx
            .count_orders_by_status()
            .await?
            .into_iter()
            .map(|(status, count)| (status.to_string(), count))
            .collect();
        Ok(Dashboard {
            user_count,
            total_points: tx.total_points().await?,
            orders_by_status,
            games_today: tx.count_games_between(from, to).await?,
            sign_ins_today: tx.count_sign_ins_on(today).await?,
        })
    }

    pub async fn list_users(&self, admin_id: i64, page: PageRequest) -> GameResult<Page<ManagedUser>> {
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_any(tx.as_mut(), admin_id, Permission::ALL).await?;
        let (users, total) = tx.list_users(page).await?;
        Ok(Page::new(
            users.into_iter().map(ManagedUser::from).collect(),
            total,
            page,
        ))
    }

    /// Lock until `until`, or indefinitely when not given
    pub async fn lock_user(
        &self,
        admin_id: i64,
        user_id: i64,
        until: Option<DateTime<Utc>>,
    ) -> GameResult<ManagedUser> {
        let now = self.ctx.clock.now();
        let until = until.unwrap_or_else(|| now + Duration::days(365 * INDEFINITE_LOCK_YEARS));
        if until <= now {
            return Err(GameError::validation("Lock end must be in the future"));
        }
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), admin_id, Permission::UserStatusManagement).await?;
        let mut user = target_user(tx.as_mut(), user_id).await?;
        user.lockout_end = Some(until);
        tx.update_user(&user).await?;
        tx.commit().await?;
        info!(admin_id, user_id, until = %until, "User locked");
        Ok(user.into())
    }

    pub async fn unlock_user(&self, admin_id: i64, user_id: i64) -> GameResult<ManagedUser> {
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), admin_id, Permission::UserStatusManagement).await?;
        let mut user = target_user(tx.as_mut(), user_id).await?;
        user.lockout_end = None;
        user.access_failed_count = 0;
        tx.update_user(&user).await?;
        tx.commit().await?;
        info!(admin_id, user_id, "User unlocked");
        Ok(user.into())
    }

    /// Each field needs its own permission
    pub async fn set_user_rights(
        &self,
        admin_id: i64,
        user_id: i64,
        change: RightsChange,
    ) -> GameResult<ManagedUser> {
        let mut needed = Vec::new();
        if change.is_active.is_some() {
            needed.push(Permission::UserStatusManagement);
        }
        if change.shopping_permission.is_some() {
            needed.push(Permission::ShoppingPermissionManagement);
        }
        if change.message_permission.is_some() {
            needed.push(Permission::MessagePermissionManagement);
        }
        if needed.is_empty() {
            return Err(GameError::validation("No rights to change"));
        }

        let mut tx = self.ctx.store.begin().await?;
        for permission in needed {
            rbac::require_permission(tx.as_mut(), admin_id, permission).await?;
        }
        let mut user = target_user(tx.as_mut(), user_id).await?;
        if let Some(active) = change.is_active {
            user.is_active = active;
        }
        if let Some(shopping) = change.shopping_permission {
            user.shopping_permission = shopping;
        }
        if let Some(messaging) = change.message_permission {
            user.message_permission = messaging;
        }
        tx.update_user(&user).await?;
        tx.commit().await?;
        info!(
            admin_id,
            user_id,
            active = user.is_active,
            shopping = user.shopping_permission,
            messaging = user.message_permission,
            "User rights changed"
        );
        Ok(user.into())
    }

    /// Credit (positive) or debit (negative) a member's wallet
    pub async fn adjust_points(
        &self,
        admin_id: i64,
        user_id: i64,
        delta: i64,
        reason: &str,
    ) -> GameResult<i64> {
        let reason = bounded_text("Reason", reason, 1, 200)?;
        if delta == 0 {
            return Err(GameError::validation("Adjustment cannot be zero"));
        }
        let mut fx = Postings::at(self.ctx.clock.now());
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), admin_id, Permission::AdministratorPrivilegesManagement).await?;
        let entry = Entry::new(ChangeType::Point, format!("Admin adjustment: {}", reason));
        let balance = if delta > 0 {
            ledger::credit(tx.as_mut(), &mut fx, user_id, delta, entry).await?
        } else {
            ledger::debit(tx.as_mut(), &mut fx, user_id, delta.saturating_neg(), entry).await?
        };
        tx.commit().await?;
        fx.publish(&self.ctx.metrics);
        info!(admin_id, user_id, delta, balance, "Points adjusted");
        Ok(balance)
    }
}
