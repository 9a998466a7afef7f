// PostgreSQL-backed store
//
// Rows that a transaction mutates are read with `FOR UPDATE`, so concurrent
// balance and stock changes serialise in the database.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use tracing::info;

use super::{Store, StoreTx, Window};
use crate::core::errors::{GameError, GameResult};
use crate::core::models::*;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Map a driver error to a domain error without leaking SQL details
fn db_err(e: sqlx::Error) -> GameError {
    if let Some(db) = e.as_database_error() {
        if db.is_unique_violation() {
            return GameError::conflict("Duplicate entry");
        }
    }
    GameError::Storage(e.to_string())
}

/// Same as `db_err` but with a caller-chosen conflict message
fn db_err_conflict(message: &'static str) -> impl Fn(sqlx::Error) -> GameError {
    move |e| match e.as_database_error() {
        Some(db) if db.is_unique_violation() => GameError::conflict(message),
        _ => GameError::Storage(e.to_string()),
    }
}

/// Database-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and apply the embedded schema
    pub async fn connect(database_url: &str, max_connections: u32) -> GameResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(db_err)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> GameResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        info!("Database schema applied");
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> GameResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn ping(&self) -> GameResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(db_err)
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[derive(FromRow)]
struct RoleRow {
    id: i64,
    name: String,
    permissions: Vec<String>,
}

impl TryFrom<RoleRow> for Role {
    type Error = GameError;

    fn try_from(row: RoleRow) -> Result<Self, Self::Error> {
        let permissions = row
            .permissions
            .iter()
            .map(|p| p.parse::<Permission>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Role {
            id: row.id,
            name: row.name,
            permissions,
        })
    }
}

fn permission_texts(role: &Role) -> Vec<String> {
    role.permissions.iter().map(|p| p.as_str().to_string()).collect()
}

impl PgTx {
    async fn count(&mut self, sql: &str, bind: i64) -> GameResult<i64> {
        sqlx::query_scalar::<_, i64>(sql)
            .bind(bind)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_err)
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn commit(self: Box<Self>) -> GameResult<()> {
        self.tx.commit().await.map_err(db_err)
    }

    // -- users ------------------------------------------------------------

    async fn insert_user(&mut self, user: &User) -> GameResult<User> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (account, email, nickname, password_hash, is_active, email_confirmed,
                                shopping_permission, message_permission, access_failed_count,
                                lockout_end, created_at, last_login_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING *",
        )
        .bind(&user.account)
        .bind(&user.email)
        .bind(&user.nickname)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.email_confirmed)
        .bind(user.shopping_permission)
        .bind(user.message_permission)
        .bind(user.access_failed_count)
        .bind(user.lockout_end)
        .bind(user.created_at)
        .bind(user.last_login_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err_conflict("Account or email already registered"))
    }

    async fn user_by_id(&mut self, id: i64) -> GameResult<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn user_by_account(&mut self, account: &str) -> GameResult<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(account) = LOWER($1) FOR UPDATE")
            .bind(account)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn user_by_email(&mut self, email: &str) -> GameResult<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1) FOR UPDATE")
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn update_user(&mut self, user: &User) -> GameResult<()> {
        sqlx::query(
            "UPDATE users SET nickname = $2, password_hash = $3, is_active = $4, email_confirmed = $5,
                              shopping_permission = $6, message_permission = $7,
                              access_failed_count = $8, lockout_end = $9, last_login_at = $10
             WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.nickname)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.email_confirmed)
        .bind(user.shopping_permission)
        .bind(user.message_permission)
        .bind(user.access_failed_count)
        .bind(user.lockout_end)
        .bind(user.last_login_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_users(&mut self, window: Window) -> GameResult<(Vec<User>, i64)> {
        let rows = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id LIMIT $1 OFFSET $2")
            .bind(window.limit())
            .bind(window.offset())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)?;
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok((rows, total))
    }

    // -- tokens & email -----------------------------------------------------

    async fn insert_user_token(&mut self, token: &UserToken) -> GameResult<UserToken> {
        sqlx::query_as::<_, UserToken>(
            "INSERT INTO user_tokens (user_id, purpose, token_hash, expires_at, created_at)
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(token.user_id)
        .bind(token.purpose.as_str())
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .bind(token.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn user_token_by_hash(
        &mut self,
        purpose: TokenPurpose,
        token_hash: &str,
    ) -> GameResult<Option<UserToken>> {
        sqlx::query_as::<_, UserToken>(
            "SELECT * FROM user_tokens WHERE purpose = $1 AND token_hash = $2 FOR UPDATE",
        )
        .bind(purpose.as_str())
        .bind(token_hash)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn delete_user_token(&mut self, id: i64) -> GameResult<()> {
        sqlx::query("DELETE FROM user_tokens WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_user_tokens(&mut self, user_id: i64, purpose: TokenPurpose) -> GameResult<()> {
        sqlx::query("DELETE FROM user_tokens WHERE user_id = $1 AND purpose = $2")
            .bind(user_id)
            .bind(purpose.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_email(&mut self, email: &QueuedEmail) -> GameResult<QueuedEmail> {
        sqlx::query_as::<_, QueuedEmail>(
            "INSERT INTO email_queue (to_email, subject, body, created_at, sent_at)
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(&email.to_email)
        .bind(&email.subject)
        .bind(&email.body)
        .bind(email.created_at)
        .bind(email.sent_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn emails_to(&mut self, to_email: &str) -> GameResult<Vec<QueuedEmail>> {
        sqlx::query_as::<_, QueuedEmail>(
            "SELECT * FROM email_queue WHERE LOWER(to_email) = LOWER($1) ORDER BY id",
        )
        .bind(to_email)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    // -- roles ------------------------------------------------------------

    async fn insert_role(&mut self, role: &Role) -> GameResult<Role> {
        sqlx::query_as::<_, RoleRow>(
            "INSERT INTO roles (name, permissions) VALUES ($1, $2) RETURNING *",
        )
        .bind(&role.name)
        .bind(permission_texts(role))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err_conflict("Role already exists"))?
        .try_into()
    }

    async fn update_role(&mut self, role: &Role) -> GameResult<()> {
        sqlx::query("UPDATE roles SET name = $2, permissions = $3 WHERE id = $1")
            .bind(role.id)
            .bind(&role.name)
            .bind(permission_texts(role))
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn role_by_id(&mut self, id: i64) -> GameResult<Option<Role>> {
        sqlx::query_as::<_, RoleRow>("SELECT * FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?
            .map(Role::try_from)
            .transpose()
    }

    async fn role_by_name(&mut self, name: &str) -> GameResult<Option<Role>> {
        sqlx::query_as::<_, RoleRow>("SELECT * FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?
            .map(Role::try_from)
            .transpose()
    }

    async fn list_roles(&mut self) -> GameResult<Vec<Role>> {
        sqlx::query_as::<_, RoleRow>("SELECT * FROM roles ORDER BY id")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(Role::try_from)
            .collect()
    }

    async fn roles_of_user(&mut self, user_id: i64) -> GameResult<Vec<Role>> {
        sqlx::query_as::<_, RoleRow>(
            "SELECT r.* FROM roles r JOIN user_roles ur ON ur.role_id = r.id
             WHERE ur.user_id = $1 ORDER BY r.id",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(Role::try_from)
        .collect()
    }

    async fn assign_role(&mut self, user_id: i64, role_id: i64) -> GameResult<bool> {
        let result = sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(role_id)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_role(&mut self, user_id: i64, role_id: i64) -> GameResult<bool> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id)
            .bind(role_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    // -- wallet -----------------------------------------------------------

    async fn insert_wallet(&mut self, wallet: &Wallet) -> GameResult<()> {
        sqlx::query("INSERT INTO wallets (user_id, points, updated_at) VALUES ($1, $2, $3)")
            .bind(wallet.user_id)
            .bind(wallet.points)
            .bind(wallet.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err_conflict("Wallet already exists"))?;
        Ok(())
    }

    async fn wallet_for_update(&mut self, user_id: i64) -> GameResult<Option<Wallet>> {
        sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn set_wallet_points(
        &mut self,
        user_id: i64,
        points: i64,
        at: DateTime<Utc>,
    ) -> GameResult<()> {
        let result = sqlx::query("UPDATE wallets SET points = $2, updated_at = $3 WHERE user_id = $1")
            .bind(user_id)
            .bind(points)
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(GameError::not_found("Wallet"));
        }
        Ok(())
    }

    async fn insert_wallet_history(&mut self, entry: &WalletHistory) -> GameResult<WalletHistory> {
        sqlx::query_as::<_, WalletHistory>(
            "INSERT INTO wallet_history (user_id, change_type, points_changed, item_code, description, created_at)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(entry.user_id)
        .bind(entry.change_type.as_str())
        .bind(entry.points_changed)
        .bind(&entry.item_code)
        .bind(&entry.description)
        .bind(entry.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn wallet_history(
        &mut self,
        user_id: i64,
        window: Window,
    ) -> GameResult<(Vec<WalletHistory>, i64)> {
        let rows = sqlx::query_as::<_, WalletHistory>(
            "SELECT * FROM wallet_history WHERE user_id = $1
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        let total = self
            .count("SELECT COUNT(*) FROM wallet_history WHERE user_id = $1", user_id)
            .await?;
        Ok((rows, total))
    }

    async fn top_wallets(&mut self, limit: i64) -> GameResult<Vec<LeaderboardEntry>> {
        sqlx::query_as::<_, LeaderboardEntry>(
            "SELECT u.id AS user_id, u.nickname, w.points
             FROM wallets w JOIN users u ON u.id = w.user_id
             ORDER BY w.points DESC, u.id ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn total_points(&mut self) -> GameResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COALESCE(SUM(points), 0)::BIGINT FROM wallets")
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    // -- coupons ----------------------------------------------------------

    async fn insert_coupon_type(&mut self, coupon_type: &CouponType) -> GameResult<CouponType> {
        sqlx::query_as::<_, CouponType>(
            "INSERT INTO coupon_types (name, discount_type, discount_value, min_spend, valid_from,
                                       valid_to, points_cost, is_active, description)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
        )
        .bind(&coupon_type.name)
        .bind(coupon_type.discount_type.as_str())
        .bind(coupon_type.discount_value)
        .bind(coupon_type.min_spend)
        .bind(coupon_type.valid_from)
        .bind(coupon_type.valid_to)
        .bind(coupon_type.points_cost)
        .bind(coupon_type.is_active)
        .bind(&coupon_type.description)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn update_coupon_type(&mut self, coupon_type: &CouponType) -> GameResult<()> {
        sqlx::query(
            "UPDATE coupon_types SET name = $2, discount_type = $3, discount_value = $4, min_spend = $5,
                                     valid_from = $6, valid_to = $7, points_cost = $8, is_active = $9,
                                     description = $10
             WHERE id = $1",
        )
        .bind(coupon_type.id)
        .bind(&coupon_type.name)
        .bind(coupon_type.discount_type.as_str())
        .bind(coupon_type.discount_value)
        .bind(coupon_type.min_spend)
        .bind(coupon_type.valid_from)
        .bind(coupon_type.valid_to)
        .bind(coupon_type.points_cost)
        .bind(coupon_type.is_active)
        .bind(&coupon_type.description)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn coupon_type_by_id(&mut self, id: i64) -> GameResult<Option<CouponType>> {
        sqlx::query_as::<_, CouponType>("SELECT * FROM coupon_types WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn coupon_type_by_name(&mut self, name: &str) -> GameResult<Option<CouponType>> {
        sqlx::query_as::<_, CouponType>("SELECT * FROM coupon_types WHERE name = $1 ORDER BY id LIMIT 1")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn list_coupon_types(&mut self) -> GameResult<Vec<CouponType>> {
        sqlx::query_as::<_, CouponType>("SELECT * FROM coupon_types ORDER BY id")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn insert_coupon(&mut self, coupon: &Coupon) -> GameResult<Coupon> {
        sqlx::query_as::<_, Coupon>(
            "INSERT INTO coupons (code, coupon_type_id, user_id, is_used, acquired_at, expires_at,
                                  used_at, used_in_order_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(&coupon.code)
        .bind(coupon.coupon_type_id)
        .bind(coupon.user_id)
        .bind(coupon.is_used)
        .bind(coupon.acquired_at)
        .bind(coupon.expires_at)
        .bind(coupon.used_at)
        .bind(coupon.used_in_order_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err_conflict("Coupon code already exists"))
    }

    async fn coupon_by_code_for_update(&mut self, code: &str) -> GameResult<Option<Coupon>> {
        sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE code = $1 FOR UPDATE")
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn coupon_by_id(&mut self, id: i64) -> GameResult<Option<Coupon>> {
        sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn coupons_of_user(&mut self, user_id: i64, include_used: bool) -> GameResult<Vec<Coupon>> {
        sqlx::query_as::<_, Coupon>(
            "SELECT * FROM coupons WHERE user_id = $1 AND ($2 OR NOT is_used)
             ORDER BY acquired_at DESC, id DESC",
        )
        .bind(user_id)
        .bind(include_used)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn update_coupon(&mut self, coupon: &Coupon) -> GameResult<()> {
        sqlx::query(
            "UPDATE coupons SET is_used = $2, used_at = $3, used_in_order_id = $4 WHERE id = $1",
        )
        .bind(coupon.id)
        .bind(coupon.is_used)
        .bind(coupon.used_at)
        .bind(coupon.used_in_order_id)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    // -- e-vouchers -------------------------------------------------------

    async fn insert_evoucher_type(&mut self, evoucher_type: &EVoucherType) -> GameResult<EVoucherType> {
        sqlx::query_as::<_, EVoucherType>(
            "INSERT INTO evoucher_types (name, value_amount, points_cost, total_available, valid_from,
                                         valid_to, is_active, description)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(&evoucher_type.name)
        .bind(evoucher_type.value_amount)
        .bind(evoucher_type.points_cost)
        .bind(evoucher_type.total_available)
        .bind(evoucher_type.valid_from)
        .bind(evoucher_type.valid_to)
        .bind(evoucher_type.is_active)
        .bind(&evoucher_type.description)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn update_evoucher_type(&mut self, evoucher_type: &EVoucherType) -> GameResult<()> {
        sqlx::query(
            "UPDATE evoucher_types SET name = $2, value_amount = $3, points_cost = $4,
                                       total_available = $5, valid_from = $6, valid_to = $7,
                                       is_active = $8, description = $9
             WHERE id = $1",
        )
        .bind(evoucher_type.id)
        .bind(&evoucher_type.name)
        .bind(evoucher_type.value_amount)
        .bind(evoucher_type.points_cost)
        .bind(evoucher_type.total_available)
        .bind(evoucher_type.valid_from)
        .bind(evoucher_type.valid_to)
        .bind(evoucher_type.is_active)
        .bind(&evoucher_type.description)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn evoucher_type_by_id(&mut self, id: i64) -> GameResult<Option<EVoucherType>> {
        // locked so the availability count stays consistent across issuers
        sqlx::query_as::<_, EVoucherType>("SELECT * FROM evoucher_types WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn evoucher_type_by_name(&mut self, name: &str) -> GameResult<Option<EVoucherType>> {
        sqlx::query_as::<_, EVoucherType>(
            "SELECT * FROM evoucher_types WHERE name = $1 ORDER BY id LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn list_evoucher_types(&mut self) -> GameResult<Vec<EVoucherType>> {
        sqlx::query_as::<_, EVoucherType>("SELECT * FROM evoucher_types ORDER BY id")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn count_evouchers_of_type(&mut self, evoucher_type_id: i64) -> GameResult<i64> {
        self.count(
            "SELECT COUNT(*) FROM evouchers WHERE evoucher_type_id = $1",
            evoucher_type_id,
        )
        .await
    }

    async fn insert_evoucher(&mut self, evoucher: &EVoucher) -> GameResult<EVoucher> {
        sqlx::query_as::<_, EVoucher>(
            "INSERT INTO evouchers (code, evoucher_type_id, user_id, is_used, acquired_at, expires_at, used_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(&evoucher.code)
        .bind(evoucher.evoucher_type_id)
        .bind(evoucher.user_id)
        .bind(evoucher.is_used)
        .bind(evoucher.acquired_at)
        .bind(evoucher.expires_at)
        .bind(evoucher.used_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err_conflict("E-voucher code already exists"))
    }

    async fn evoucher_by_code_for_update(&mut self, code: &str) -> GameResult<Option<EVoucher>> {
        sqlx::query_as::<_, EVoucher>("SELECT * FROM evouchers WHERE code = $1 FOR UPDATE")
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn evoucher_by_id_for_update(&mut self, id: i64) -> GameResult<Option<EVoucher>> {
        sqlx::query_as::<_, EVoucher>("SELECT * FROM evouchers WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn evouchers_of_user(&mut self, user_id: i64, include_used: bool) -> GameResult<Vec<EVoucher>> {
        sqlx::query_as::<_, EVoucher>(
            "SELECT * FROM evouchers WHERE user_id = $1 AND ($2 OR NOT is_used)
             ORDER BY acquired_at DESC, id DESC",
        )
        .bind(user_id)
        .bind(include_used)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn update_evoucher(&mut self, evoucher: &EVoucher) -> GameResult<()> {
        sqlx::query("UPDATE evouchers SET is_used = $2, used_at = $3 WHERE id = $1")
            .bind(evoucher.id)
            .bind(evoucher.is_used)
            .bind(evoucher.used_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_evoucher_token(&mut self, token: &EVoucherToken) -> GameResult<EVoucherToken> {
        sqlx::query_as::<_, EVoucherToken>(
            "INSERT INTO evoucher_tokens (evoucher_id, token_hash, created_at, expires_at, revoked)
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(token.evoucher_id)
        .bind(&token.token_hash)
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(token.revoked)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn evoucher_token_by_hash(&mut self, token_hash: &str) -> GameResult<Option<EVoucherToken>> {
        sqlx::query_as::<_, EVoucherToken>(
            "SELECT * FROM evoucher_tokens WHERE token_hash = $1 FOR UPDATE",
        )
        .bind(token_hash)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn revoke_evoucher_tokens(&mut self, evoucher_id: i64) -> GameResult<()> {
        sqlx::query("UPDATE evoucher_tokens SET revoked = TRUE WHERE evoucher_id = $1")
            .bind(evoucher_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_redeem_log(&mut self, log: &EVoucherRedeemLog) -> GameResult<EVoucherRedeemLog> {
        sqlx::query_as::<_, EVoucherRedeemLog>(
            "INSERT INTO evoucher_redeem_logs (evoucher_id, user_id, scanned_by, status, created_at)
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(log.evoucher_id)
        .bind(log.user_id)
        .bind(log.scanned_by)
        .bind(log.status.as_str())
        .bind(log.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn redeem_logs(&mut self, window: Window) -> GameResult<(Vec<EVoucherRedeemLog>, i64)> {
        let rows = sqlx::query_as::<_, EVoucherRedeemLog>(
            "SELECT * FROM evoucher_redeem_logs ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
        )
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM evoucher_redeem_logs")
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok((rows, total))
    }

    // -- sign-in ----------------------------------------------------------

    async fn insert_sign_in(&mut self, record: &SignInRecord) -> GameResult<SignInRecord> {
        sqlx::query_as::<_, SignInRecord>(
            "INSERT INTO sign_ins (user_id, sign_date, signed_at, streak, points_gained, exp_gained, coupon_code)
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(record.user_id)
        .bind(record.sign_date)
        .bind(record.signed_at)
        .bind(record.streak)
        .bind(record.points_gained)
        .bind(record.exp_gained)
        .bind(&record.coupon_code)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err_conflict("Already signed in today"))
    }

    async fn sign_in_on(&mut self, user_id: i64, day: NaiveDate) -> GameResult<Option<SignInRecord>> {
        sqlx::query_as::<_, SignInRecord>(
            "SELECT * FROM sign_ins WHERE user_id = $1 AND sign_date = $2",
        )
        .bind(user_id)
        .bind(day)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn sign_ins_since(&mut self, user_id: i64, since: NaiveDate) -> GameResult<Vec<SignInRecord>> {
        sqlx::query_as::<_, SignInRecord>(
            "SELECT * FROM sign_ins WHERE user_id = $1 AND sign_date >= $2 ORDER BY sign_date DESC",
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn count_sign_ins_on(&mut self, day: NaiveDate) -> GameResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sign_ins WHERE sign_date = $1")
            .bind(day)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    // -- pets -------------------------------------------------------------

    async fn insert_pet(&mut self, pet: &Pet) -> GameResult<Pet> {
        sqlx::query_as::<_, Pet>(
            "INSERT INTO pets (user_id, name, level, experience, hunger, mood, stamina, cleanliness,
                               health, skin_color, background_color, attributes_updated_at,
                               level_up_time, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) RETURNING *",
        )
        .bind(pet.user_id)
        .bind(&pet.name)
        .bind(pet.level)
        .bind(pet.experience)
        .bind(pet.hunger)
        .bind(pet.mood)
        .bind(pet.stamina)
        .bind(pet.cleanliness)
        .bind(pet.health)
        .bind(&pet.skin_color)
        .bind(&pet.background_color)
        .bind(pet.attributes_updated_at)
        .bind(pet.level_up_time)
        .bind(pet.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err_conflict("User already has a pet"))
    }

    async fn pet_of_user_for_update(&mut self, user_id: i64) -> GameResult<Option<Pet>> {
        sqlx::query_as::<_, Pet>("SELECT * FROM pets WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn update_pet(&mut self, pet: &Pet) -> GameResult<()> {
        sqlx::query(
            "UPDATE pets SET name = $2, level = $3, experience = $4, hunger = $5, mood = $6,
                             stamina = $7, cleanliness = $8, health = $9, skin_color = $10,
                             background_color = $11, attributes_updated_at = $12, level_up_time = $13
             WHERE id = $1",
        )
        .bind(pet.id)
        .bind(&pet.name)
        .bind(pet.level)
        .bind(pet.experience)
        .bind(pet.hunger)
        .bind(pet.mood)
        .bind(pet.stamina)
        .bind(pet.cleanliness)
        .bind(pet.health)
        .bind(&pet.skin_color)
        .bind(&pet.background_color)
        .bind(pet.attributes_updated_at)
        .bind(pet.level_up_time)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    // -- mini-game --------------------------------------------------------

    async fn insert_game(&mut self, game: &GamePlay) -> GameResult<GamePlay> {
        sqlx::query_as::<_, GamePlay>(
            "INSERT INTO mini_games (user_id, pet_id, level, monster_count, speed_multiplier, result,
                                     points_gained, exp_gained, coupon_code, hunger_delta, mood_delta,
                                     stamina_delta, cleanliness_delta, started_at, ended_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) RETURNING *",
        )
        .bind(game.user_id)
        .bind(game.pet_id)
        .bind(game.level)
        .bind(game.monster_count)
        .bind(game.speed_multiplier)
        .bind(game.result.as_str())
        .bind(game.points_gained)
        .bind(game.exp_gained)
        .bind(&game.coupon_code)
        .bind(game.hunger_delta)
        .bind(game.mood_delta)
        .bind(game.stamina_delta)
        .bind(game.cleanliness_delta)
        .bind(game.started_at)
        .bind(game.ended_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn game_by_id_for_update(&mut self, id: i64) -> GameResult<Option<GamePlay>> {
        sqlx::query_as::<_, GamePlay>("SELECT * FROM mini_games WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn update_game(&mut self, game: &GamePlay) -> GameResult<()> {
        sqlx::query(
            "UPDATE mini_games SET result = $2, points_gained = $3, exp_gained = $4, coupon_code = $5,
                                   hunger_delta = $6, mood_delta = $7, stamina_delta = $8,
                                   cleanliness_delta = $9, ended_at = $10
             WHERE id = $1",
        )
        .bind(game.id)
        .bind(game.result.as_str())
        .bind(game.points_gained)
        .bind(game.exp_gained)
        .bind(&game.coupon_code)
        .bind(game.hunger_delta)
        .bind(game.mood_delta)
        .bind(game.stamina_delta)
        .bind(game.cleanliness_delta)
        .bind(game.ended_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn games_started_between(
        &mut self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> GameResult<Vec<GamePlay>> {
        sqlx::query_as::<_, GamePlay>(
            "SELECT * FROM mini_games WHERE user_id = $1 AND started_at >= $2 AND started_at < $3
             ORDER BY started_at DESC, id DESC",
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn games_of_user(&mut self, user_id: i64, window: Window) -> GameResult<(Vec<GamePlay>, i64)> {
        let rows = sqlx::query_as::<_, GamePlay>(
            "SELECT * FROM mini_games WHERE user_id = $1
             ORDER BY started_at DESC, id DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        let total = self
            .count("SELECT COUNT(*) FROM mini_games WHERE user_id = $1", user_id)
            .await?;
        Ok((rows, total))
    }

    async fn count_games_between(&mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> GameResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM mini_games WHERE started_at >= $1 AND started_at < $2",
        )
        .bind(from)
        .bind(to)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    // -- forum ------------------------------------------------------------

    async fn insert_forum(&mut self, forum: &Forum) -> GameResult<Forum> {
        sqlx::query_as::<_, Forum>(
            "INSERT INTO forums (name, description, created_at) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(&forum.name)
        .bind(&forum.description)
        .bind(forum.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err_conflict("Forum name already taken"))
    }

    async fn update_forum(&mut self, forum: &Forum) -> GameResult<()> {
        sqlx::query("UPDATE forums SET name = $2, description = $3 WHERE id = $1")
            .bind(forum.id)
            .bind(&forum.name)
            .bind(&forum.description)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err_conflict("Forum name already taken"))?;
        Ok(())
    }

    async fn delete_forum(&mut self, id: i64) -> GameResult<()> {
        // threads, posts and reactions follow via ON DELETE CASCADE
        sqlx::query("DELETE FROM forums WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn forum_by_id(&mut self, id: i64) -> GameResult<Option<Forum>> {
        sqlx::query_as::<_, Forum>("SELECT * FROM forums WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn forum_by_name(&mut self, name: &str) -> GameResult<Option<Forum>> {
        sqlx::query_as::<_, Forum>("SELECT * FROM forums WHERE name = $1")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn list_forums(&mut self) -> GameResult<Vec<Forum>> {
        sqlx::query_as::<_, Forum>("SELECT * FROM forums ORDER BY name")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn insert_thread(&mut self, thread: &Thread) -> GameResult<Thread> {
        sqlx::query_as::<_, Thread>(
            "INSERT INTO threads (forum_id, author_id, title, is_pinned, is_locked, view_count,
                                  reply_count, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
        )
        .bind(thread.forum_id)
        .bind(thread.author_id)
        .bind(&thread.title)
        .bind(thread.is_pinned)
        .bind(thread.is_locked)
        .bind(thread.view_count)
        .bind(thread.reply_count)
        .bind(thread.created_at)
        .bind(thread.updated_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn thread_by_id_for_update(&mut self, id: i64) -> GameResult<Option<Thread>> {
        sqlx::query_as::<_, Thread>("SELECT * FROM threads WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn update_thread(&mut self, thread: &Thread) -> GameResult<()> {
        sqlx::query(
            "UPDATE threads SET title = $2, is_pinned = $3, is_locked = $4, view_count = $5,
                                reply_count = $6, updated_at = $7
             WHERE id = $1",
        )
        .bind(thread.id)
        .bind(&thread.title)
        .bind(thread.is_pinned)
        .bind(thread.is_locked)
        .bind(thread.view_count)
        .bind(thread.reply_count)
        .bind(thread.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn threads_in_forum(&mut self, forum_id: i64, window: Window) -> GameResult<(Vec<Thread>, i64)> {
        let rows = sqlx::query_as::<_, Thread>(
            "SELECT * FROM threads WHERE forum_id = $1
             ORDER BY is_pinned DESC, updated_at DESC, id DESC LIMIT $2 OFFSET $3",
        )
        .bind(forum_id)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        let total = self
            .count("SELECT COUNT(*) FROM threads WHERE forum_id = $1", forum_id)
            .await?;
        Ok((rows, total))
    }

    async fn search_threads(&mut self, keyword: &str, window: Window) -> GameResult<(Vec<Thread>, i64)> {
        let pattern = like_pattern(keyword);
        let rows = sqlx::query_as::<_, Thread>(
            "SELECT * FROM threads WHERE title ILIKE $1 ESCAPE '\\'
             ORDER BY updated_at DESC, id DESC LIMIT $2 OFFSET $3",
        )
        .bind(&pattern)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM threads WHERE title ILIKE $1 ESCAPE '\\'",
        )
        .bind(&pattern)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok((rows, total))
    }

    async fn insert_post(&mut self, post: &Post) -> GameResult<Post> {
        sqlx::query_as::<_, Post>(
            "INSERT INTO posts (thread_id, author_id, parent_post_id, content, is_deleted, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(post.thread_id)
        .bind(post.author_id)
        .bind(post.parent_post_id)
        .bind(&post.content)
        .bind(post.is_deleted)
        .bind(post.created_at)
        .bind(post.updated_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn post_by_id_for_update(&mut self, id: i64) -> GameResult<Option<Post>> {
        sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn update_post(&mut self, post: &Post) -> GameResult<()> {
        sqlx::query("UPDATE posts SET content = $2, is_deleted = $3, updated_at = $4 WHERE id = $1")
            .bind(post.id)
            .bind(&post.content)
            .bind(post.is_deleted)
            .bind(post.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn posts_in_thread(&mut self, thread_id: i64, window: Window) -> GameResult<(Vec<Post>, i64)> {
        let rows = sqlx::query_as::<_, Post>(
            "SELECT * FROM posts WHERE thread_id = $1 ORDER BY created_at ASC, id ASC LIMIT $2 OFFSET $3",
        )
        .bind(thread_id)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        let total = self
            .count("SELECT COUNT(*) FROM posts WHERE thread_id = $1", thread_id)
            .await?;
        Ok((rows, total))
    }

    async fn search_posts(&mut self, keyword: &str, window: Window) -> GameResult<(Vec<Post>, i64)> {
        let pattern = like_pattern(keyword);
        let rows = sqlx::query_as::<_, Post>(
            "SELECT * FROM posts WHERE NOT is_deleted AND content ILIKE $1 ESCAPE '\\'
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
        )
        .bind(&pattern)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM posts WHERE NOT is_deleted AND content ILIKE $1 ESCAPE '\\'",
        )
        .bind(&pattern)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok((rows, total))
    }

    async fn reaction_of_user(&mut self, post_id: i64, user_id: i64) -> GameResult<Option<Reaction>> {
        sqlx::query_as::<_, Reaction>("SELECT * FROM reactions WHERE post_id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn insert_reaction(&mut self, reaction: &Reaction) -> GameResult<Reaction> {
        sqlx::query_as::<_, Reaction>(
            "INSERT INTO reactions (post_id, user_id, kind, created_at) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(reaction.post_id)
        .bind(reaction.user_id)
        .bind(&reaction.kind)
        .bind(reaction.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err_conflict("Already reacted to this post"))
    }

    async fn delete_reaction(&mut self, id: i64) -> GameResult<()> {
        sqlx::query("DELETE FROM reactions WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn reactions_for_post(&mut self, post_id: i64) -> GameResult<Vec<Reaction>> {
        sqlx::query_as::<_, Reaction>("SELECT * FROM reactions WHERE post_id = $1 ORDER BY id")
            .bind(post_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    // -- products & cart --------------------------------------------------

    async fn insert_product(&mut self, product: &Product) -> GameResult<Product> {
        sqlx::query_as::<_, Product>(
            "INSERT INTO products (name, product_type, description, price, stock, is_active, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(&product.name)
        .bind(&product.product_type)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.stock)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn product_by_id_for_update(&mut self, id: i64) -> GameResult<Option<Product>> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn product_by_name(&mut self, name: &str) -> GameResult<Option<Product>> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE name = $1 ORDER BY id LIMIT 1")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn update_product(&mut self, product: &Product) -> GameResult<()> {
        sqlx::query(
            "UPDATE products SET name = $2, product_type = $3, description = $4, price = $5,
                                 stock = $6, is_active = $7, updated_at = $8
             WHERE id = $1",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.product_type)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.stock)
        .bind(product.is_active)
        .bind(product.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_products(
        &mut self,
        product_type: Option<&str>,
        window: Window,
    ) -> GameResult<(Vec<Product>, i64)> {
        let rows = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE is_active AND ($1::TEXT IS NULL OR product_type = $1)
             ORDER BY id LIMIT $2 OFFSET $3",
        )
        .bind(product_type)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM products WHERE is_active AND ($1::TEXT IS NULL OR product_type = $1)",
        )
        .bind(product_type)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok((rows, total))
    }

    async fn search_products(&mut self, keyword: &str, window: Window) -> GameResult<(Vec<Product>, i64)> {
        let pattern = like_pattern(keyword);
        let rows = sqlx::query_as::<_, Product>(
            "SELECT * FROM products
             WHERE is_active AND (name ILIKE $1 ESCAPE '\\' OR description ILIKE $1 ESCAPE '\\')
             ORDER BY id LIMIT $2 OFFSET $3",
        )
        .bind(&pattern)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM products
             WHERE is_active AND (name ILIKE $1 ESCAPE '\\' OR description ILIKE $1 ESCAPE '\\')",
        )
        .bind(&pattern)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok((rows, total))
    }

    async fn products_by_price(&mut self, min: i64, max: i64, window: Window) -> GameResult<(Vec<Product>, i64)> {
        let rows = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE is_active AND price BETWEEN $1 AND $2
             ORDER BY price ASC, id ASC LIMIT $3 OFFSET $4",
        )
        .bind(min)
        .bind(max)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM products WHERE is_active AND price BETWEEN $1 AND $2",
        )
        .bind(min)
        .bind(max)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok((rows, total))
    }

    async fn cart_items(&mut self, user_id: i64) -> GameResult<Vec<CartItem>> {
        sqlx::query_as::<_, CartItem>("SELECT * FROM cart_items WHERE user_id = $1 ORDER BY product_id")
            .bind(user_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn upsert_cart_item(&mut self, item: &CartItem) -> GameResult<()> {
        sqlx::query(
            "INSERT INTO cart_items (user_id, product_id, quantity, added_at) VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity",
        )
        .bind(item.user_id)
        .bind(item.product_id)
        .bind(item.quantity)
        .bind(item.added_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_cart_item(&mut self, user_id: i64, product_id: i64) -> GameResult<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_cart(&mut self, user_id: i64) -> GameResult<()> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // -- orders -----------------------------------------------------------

    async fn insert_order(&mut self, order: &Order) -> GameResult<Order> {
        sqlx::query_as::<_, Order>(
            "INSERT INTO orders (user_id, status, subtotal, discount, total, coupon_id, coupon_code,
                                 shipping_address, payment_method, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
        )
        .bind(order.user_id)
        .bind(order.status.as_str())
        .bind(order.subtotal)
        .bind(order.discount)
        .bind(order.total)
        .bind(order.coupon_id)
        .bind(&order.coupon_code)
        .bind(&order.shipping_address)
        .bind(&order.payment_method)
        .bind(order.created_at)
        .bind(order.updated_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn order_by_id_for_update(&mut self, id: i64) -> GameResult<Option<Order>> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn update_order(&mut self, order: &Order) -> GameResult<()> {
        sqlx::query(
            "UPDATE orders SET status = $2, coupon_id = $3, coupon_code = $4, updated_at = $5 WHERE id = $1",
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(order.coupon_id)
        .bind(&order.coupon_code)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn orders_of_user(&mut self, user_id: i64, window: Window) -> GameResult<(Vec<Order>, i64)> {
        let rows = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        let total = self
            .count("SELECT COUNT(*) FROM orders WHERE user_id = $1", user_id)
            .await?;
        Ok((rows, total))
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> GameResult<OrderItem> {
        sqlx::query_as::<_, OrderItem>(
            "INSERT INTO order_items (order_id, product_id, product_name, unit_price, quantity, line_total)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(item.order_id)
        .bind(item.product_id)
        .bind(&item.product_name)
        .bind(item.unit_price)
        .bind(item.quantity)
        .bind(item.line_total)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn order_items(&mut self, order_id: i64) -> GameResult<Vec<OrderItem>> {
        sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
            .bind(order_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn count_orders_by_status(&mut self) -> GameResult<Vec<(OrderStatus, i64)>> {
        sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM orders GROUP BY status ORDER BY status",
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(|(status, count)| Ok((status.parse::<OrderStatus>()?, count)))
        .collect()
    }

    // -- notifications ----------------------------------------------------

    async fn insert_notification(&mut self, notification: &Notification) -> GameResult<Notification> {
        sqlx::query_as::<_, Notification>(
            "INSERT INTO notifications (user_id, title, message, is_read, created_at, read_at)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(notification.user_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.is_read)
        .bind(notification.created_at)
        .bind(notification.read_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)
    }

    async fn notification_by_id(&mut self, id: i64) -> GameResult<Option<Notification>> {
        sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)
    }

    async fn update_notification(&mut self, notification: &Notification) -> GameResult<()> {
        sqlx::query("UPDATE notifications SET is_read = $2, read_at = $3 WHERE id = $1")
            .bind(notification.id)
            .bind(notification.is_read)
            .bind(notification.read_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn notifications_of_user(
        &mut self,
        user_id: i64,
        unread_only: bool,
        window: Window,
    ) -> GameResult<(Vec<Notification>, i64)> {
        let rows = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications WHERE user_id = $1 AND (NOT $2 OR NOT is_read)
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4",
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND (NOT $2 OR NOT is_read)",
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok((rows, total))
    }

    async fn count_unread_notifications(&mut self, user_id: i64) -> GameResult<i64> {
        self.count(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read",
            user_id,
        )
        .await
    }

    async fn mark_all_notifications_read(&mut self, user_id: i64, at: DateTime<Utc>) -> GameResult<i64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE, read_at = $2 WHERE user_id = $1 AND NOT is_read",
        )
        .bind(user_id)
        .bind(at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() as i64)
    }
}

/// `%keyword%` with LIKE metacharacters escaped
fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}
