// Balance-changing building blocks shared by the services
//
// These run inside the caller's transaction. Every wallet change writes
// exactly one history row for that wallet.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::core::codes::generate_code;
use crate::core::constants::{pet as pet_rules, wallet as wallet_rules};
use crate::core::errors::{GameError, GameResult};
use crate::core::models::*;
use crate::metrics::Metrics;
use crate::store::StoreTx;

const CODE_ATTEMPTS: usize = 8;

/// Side effects gathered during one transaction, published to the
/// counters only after the transaction committed.
#[derive(Debug, Clone)]
pub struct Postings {
    pub now: DateTime<Utc>,
    pub credited: i64,
    pub debited: i64,
    pub coupons_issued: u64,
    pub level_ups: u32,
}

impl Postings {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            credited: 0,
            debited: 0,
            coupons_issued: 0,
            level_ups: 0,
        }
    }

    pub fn publish(&self, metrics: &Metrics) {
        if self.credited > 0 {
            metrics.points_credited.inc_by(self.credited as u64);
        }
        if self.debited > 0 {
            metrics.points_debited.inc_by(self.debited as u64);
        }
        if self.coupons_issued > 0 {
            metrics.coupons_issued.inc_by(self.coupons_issued);
        }
    }
}

/// History line attached to a wallet change
#[derive(Debug, Clone)]
pub struct Entry {
    pub change_type: ChangeType,
    pub description: String,
    pub item_code: Option<String>,
}

impl Entry {
    pub fn new(change_type: ChangeType, description: impl Into<String>) -> Self {
        Self {
            change_type,
            description: description.into(),
            item_code: None,
        }
    }

    pub fn with_item(mut self, item_code: impl Into<String>) -> Self {
        self.item_code = Some(item_code.into());
        self
    }
}

async fn locked_wallet(tx: &mut dyn StoreTx, user_id: i64) -> GameResult<Wallet> {
    tx.wallet_for_update(user_id)
        .await?
        .ok_or_else(|| GameError::not_found("Wallet"))
}

async fn record(
    tx: &mut dyn StoreTx,
    user_id: i64,
    points_changed: i64,
    entry: Entry,
    now: DateTime<Utc>,
) -> GameResult<()> {
    tx.insert_wallet_history(&WalletHistory {
        id: 0,
        user_id,
        change_type: entry.change_type,
        points_changed,
        item_code: entry.item_code,
        description: entry.description,
        created_at: now,
    })
    .await?;
    Ok(())
}

/// Add `points` to a wallet. Returns the new balance.
pub async fn credit(
    tx: &mut dyn StoreTx,
    fx: &mut Postings,
    user_id: i64,
    points: i64,
    entry: Entry,
) -> GameResult<i64> {
    if points <= 0 {
        return Err(GameError::validation("Points must be positive"));
    }
    let wallet = locked_wallet(tx, user_id).await?;
    let balance = wallet
        .points
        .checked_add(points)
        .ok_or_else(|| GameError::validation("Balance overflow"))?;
    tx.set_wallet_points(user_id, balance, fx.now).await?;
    debug!(user_id, points, kind = %entry.change_type, balance, "Wallet credited");
    record(tx, user_id, points, entry, fx.now).await?;
    fx.credited += points;
    Ok(balance)
}

/// Remove `points` from a wallet. Returns the new balance.
pub async fn debit(
    tx: &mut dyn StoreTx,
    fx: &mut Postings,
    user_id: i64,
    points: i64,
    entry: Entry,
) -> GameResult<i64> {
    if points <= 0 {
        return Err(GameError::validation("Points must be positive"));
    }
    let wallet = locked_wallet(tx, user_id).await?;
    if wallet.points < points {
        return Err(GameError::InsufficientPoints {
            required: points,
            available: wallet.points,
        });
    }
    let balance = wallet.points - points;
    tx.set_wallet_points(user_id, balance, fx.now).await?;
    debug!(user_id, points, kind = %entry.change_type, balance, "Wallet debited");
    record(tx, user_id, -points, entry, fx.now).await?;
    fx.debited += points;
    Ok(balance)
}

pub async fn notify(
    tx: &mut dyn StoreTx,
    user_id: i64,
    title: impl Into<String>,
    message: impl Into<String>,
    now: DateTime<Utc>,
) -> GameResult<Notification> {
    tx.insert_notification(&Notification {
        id: 0,
        user_id,
        title: title.into(),
        message: message.into(),
        is_read: false,
        created_at: now,
        read_at: None,
    })
    .await
}

/// Exp needed to leave `level`
pub fn exp_to_next_level(level: i32) -> i64 {
    pet_rules::EXP_PER_LEVEL * i64::from(level.max(1))
}

/// Add experience to `pet`, levelling up as often as the exp allows.
///
/// Each level-up credits the bonus points and notifies the owner. The pet
/// row itself is not written; the caller persists it.
pub async fn grant_pet_experience(
    tx: &mut dyn StoreTx,
    fx: &mut Postings,
    pet: &mut Pet,
    exp: i64,
) -> GameResult<u32> {
    if exp <= 0 {
        return Ok(0);
    }
    pet.experience += exp;
    let mut gained = 0;
    while pet.experience >= exp_to_next_level(pet.level) {
        pet.experience -= exp_to_next_level(pet.level);
        pet.level += 1;
        pet.level_up_time = Some(fx.now);
        gained += 1;

        credit(
            tx,
            fx,
            pet.user_id,
            pet_rules::LEVEL_UP_BONUS_POINTS,
            Entry::new(ChangeType::PetLevelUp, "Pet level up bonus"),
        )
        .await?;
        notify(
            tx,
            pet.user_id,
            "Pet level up",
            format!("{} reached level {}!", pet.name, pet.level),
            fx.now,
        )
        .await?;
    }
    fx.level_ups += gained;
    Ok(gained)
}

/// Reward coupon template (sign-in streaks, mini-game wins)
#[derive(Debug, Clone)]
pub struct RewardCoupon {
    pub name: &'static str,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub min_spend: i64,
    pub valid_days: i64,
}

/// The coupon type behind a reward, created on first use. Reward types
/// are inactive so they never show up in the redeemable catalogue.
async fn reward_coupon_type(
    tx: &mut dyn StoreTx,
    template: &RewardCoupon,
    now: DateTime<Utc>,
) -> GameResult<CouponType> {
    if let Some(existing) = tx.coupon_type_by_name(template.name).await? {
        return Ok(existing);
    }
    tx.insert_coupon_type(&CouponType {
        id: 0,
        name: template.name.to_string(),
        discount_type: template.discount_type,
        discount_value: template.discount_value,
        min_spend: template.min_spend,
        valid_from: now,
        valid_to: now + Duration::days(365 * 100),
        points_cost: 0,
        is_active: false,
        description: Some("Reward coupon".to_string()),
    })
    .await
}

async fn unique_coupon_code(tx: &mut dyn StoreTx) -> GameResult<String> {
    for _ in 0..CODE_ATTEMPTS {
        let code = generate_code(wallet_rules::COUPON_CODE_LEN);
        if tx.coupon_by_code_for_update(&code).await?.is_none() {
            return Ok(code);
        }
    }
    Err(GameError::Storage("Could not allocate a unique coupon code".into()))
}

pub(crate) async fn unique_evoucher_code(tx: &mut dyn StoreTx) -> GameResult<String> {
    for _ in 0..CODE_ATTEMPTS {
        let code = generate_code(wallet_rules::EVOUCHER_CODE_LEN);
        if tx.evoucher_by_code_for_update(&code).await?.is_none() {
            return Ok(code);
        }
    }
    Err(GameError::Storage("Could not allocate a unique e-voucher code".into()))
}

/// Issue one coupon of `coupon_type` to a user
pub async fn issue_coupon(
    tx: &mut dyn StoreTx,
    fx: &mut Postings,
    user_id: i64,
    coupon_type: &CouponType,
    expires_at: DateTime<Utc>,
) -> GameResult<Coupon> {
    let code = unique_coupon_code(tx).await?;
    let coupon = tx
        .insert_coupon(&Coupon {
            id: 0,
            code,
            coupon_type_id: coupon_type.id,
            user_id,
            is_used: false,
            acquired_at: fx.now,
            expires_at,
            used_at: None,
            used_in_order_id: None,
        })
        .await?;
    fx.coupons_issued += 1;
    Ok(coupon)
}

/// Issue a reward coupon, valid for the template's number of days
pub async fn issue_reward_coupon(
    tx: &mut dyn StoreTx,
    fx: &mut Postings,
    user_id: i64,
    template: &RewardCoupon,
) -> GameResult<Coupon> {
    let coupon_type = reward_coupon_type(tx, template, fx.now).await?;
    let expires_at = fx.now + Duration::days(template.valid_days);
    let coupon = issue_coupon(tx, fx, user_id, &coupon_type, expires_at).await?;
    notify(
        tx,
        user_id,
        "New coupon",
        format!("You received a {} ({})", template.name, coupon.code),
        fx.now,
    )
    .await?;
    Ok(coupon)
}
