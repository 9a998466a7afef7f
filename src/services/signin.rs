// Daily sign-in rewards

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;
use tracing::info;

use super::ledger::{self, Entry, Postings, RewardCoupon};
use super::pet::apply_decay;
use super::ServiceContext;
use crate::core::constants::signin as rules;
use crate::core::errors::{GameError, GameResult};
use crate::core::models::*;
use crate::store::StoreTx;

/// What a sign-in on a given day with a given streak pays out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SignInReward {
    pub points: i64,
    pub exp: i64,
    pub coupon: bool,
}

pub fn reward_for(streak: i32, day: NaiveDate) -> SignInReward {
    let mut points = rules::BASE_POINTS;
    let mut coupon = false;
    if streak >= rules::WEEK_STREAK {
        points += rules::WEEK_BONUS_POINTS;
        coupon = true;
    } else if streak >= rules::SHORT_STREAK {
        points += rules::SHORT_BONUS_POINTS;
    }
    if day.weekday() == Weekday::Sun {
        points += rules::SUNDAY_BONUS_POINTS;
    }
    SignInReward {
        points,
        exp: rules::BASE_EXP,
        coupon,
    }
}

/// Number of consecutive signed days ending on `last`. Each record carries
/// the streak it closed, so only that day's record is read.
async fn streak_ending(tx: &mut dyn StoreTx, user_id: i64, last: NaiveDate) -> GameResult<i32> {
    Ok(tx.sign_in_on(user_id, last).await?.map_or(0, |r| r.streak))
}

const SIGN_IN_COUPON: RewardCoupon = RewardCoupon {
    name: rules::COUPON_NAME,
    discount_type: DiscountType::Percent,
    discount_value: rules::COUPON_PERCENT,
    min_spend: 0,
    valid_days: rules::COUPON_VALID_DAYS,
};

#[derive(Debug, Clone, Serialize)]
pub struct SignInStatus {
    pub today: NaiveDate,
    pub signed_today: bool,
    pub current_streak: i32,
    /// Reward for signing in today, or what today paid when already signed
    pub today_reward: SignInReward,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthCalendar {
    pub year: i32,
    pub month: u32,
    pub signed_days: Vec<u32>,
}

pub struct SignInService {
    ctx: ServiceContext,
}

impl SignInService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Current UTC day
    pub fn today(&self) -> NaiveDate {
        self.ctx.clock.today()
    }

    pub async fn sign_in(&self, user_id: i64) -> GameResult<SignInRecord> {
        let mut fx = Postings::at(self.ctx.clock.now());
        let today = fx.now.date_naive();
        let yesterday = today - Duration::days(1);

        let mut tx = self.ctx.store.begin().await?;
        if tx.sign_in_on(user_id, today).await?.is_some() {
            return Err(GameError::conflict("Already signed in today"));
        }
        let streak = streak_ending(tx.as_mut(), user_id, yesterday).await? + 1;
        let reward = reward_for(streak, today);

        ledger::credit(
            tx.as_mut(),
            &mut fx,
            user_id,
            reward.points,
            Entry::new(ChangeType::SignIn, format!("Daily sign-in (day {})", streak)),
        )
        .await?;

        if let Some(mut pet) = tx.pet_of_user_for_update(user_id).await? {
            apply_decay(&mut pet, fx.now);
            ledger::grant_pet_experience(tx.as_mut(), &mut fx, &mut pet, reward.exp).await?;
            tx.update_pet(&pet).await?;
        }

        let coupon_code = if reward.coupon {
            let coupon = ledger::issue_reward_coupon(tx.as_mut(), &mut fx, user_id, &SIGN_IN_COUPON).await?;
            Some(coupon.code)
        } else {
            None
        };

        let record = tx
            .insert_sign_in(&SignInRecord {
                id: 0,
                user_id,
                sign_date: today,
                signed_at: fx.now,
                streak,
                points_gained: reward.points,
                exp_gained: reward.exp,
                coupon_code,
            })
            .await?;
        tx.commit().await?;

        fx.publish(&self.ctx.metrics);
        self.ctx.metrics.sign_ins.inc();
        info!(user_id, streak, points = reward.points, "Signed in");
        Ok(record)
    }

    pub async fn status(&self, user_id: i64) -> GameResult<SignInStatus> {
        let today = self.ctx.clock.today();
        let mut tx = self.ctx.store.begin().await?;
        let todays = tx.sign_in_on(user_id, today).await?;
        let (current_streak, today_reward) = match &todays {
            Some(record) => (
                record.streak,
                SignInReward {
                    points: record.points_gained,
                    exp: record.exp_gained,
                    coupon: record.coupon_code.is_some(),
                },
            ),
            None => {
                let prior = streak_ending(tx.as_mut(), user_id, today - Duration::days(1)).await?;
                (prior, reward_for(prior + 1, today))
            }
        };

        Ok(SignInStatus {
            today,
            signed_today: todays.is_some(),
            current_streak,
            today_reward,
        })
    }

    /// Records of the last `days` days, newest first
    pub async fn history(&self, user_id: i64, days: u32) -> GameResult<Vec<SignInRecord>> {
        if days == 0 || days > rules::HISTORY_MAX_DAYS {
            return Err(GameError::validation(format!(
                "days must be 1 to {}",
                rules::HISTORY_MAX_DAYS
            )));
        }
        let since = self.ctx.clock.today() - Duration::days(i64::from(days) - 1);
        let mut tx = self.ctx.store.begin().await?;
        tx.sign_ins_since(user_id, since).await
    }

    pub async fn month_calendar(&self, user_id: i64, year: i32, month: u32) -> GameResult<MonthCalendar> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| GameError::validation("Invalid year or month"))?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| GameError::validation("Invalid year or month"))?;

        let mut tx = self.ctx.store.begin().await?;
        let mut signed_days: Vec<u32> = tx
            .sign_ins_since(user_id, first)
            .await?
            .into_iter()
            .filter(|r| r.sign_date < next)
            .map(|r| r.sign_date.day())
            .collect();
        signed_days.sort_unstable();

        Ok(MonthCalendar {
            year,
            month,
            signed_days,
        })
    }
}
