// Monster-battle mini-game

use serde::Serialize;
use tracing::info;

use super::ledger::{self, Entry, Postings, RewardCoupon};
use super::pet::{current_pet, Deltas};
use super::ServiceContext;
use crate::core::clock::day_bounds;
use crate::core::constants::{minigame as rules, ATTRIBUTE_MAX, ATTRIBUTE_MIN};
use crate::core::errors::{GameError, GameResult};
use crate::core::models::*;

const GAME_COUPON: RewardCoupon = RewardCoupon {
    name: rules::COUPON_NAME,
    discount_type: DiscountType::Amount,
    discount_value: rules::COUPON_AMOUNT,
    min_spend: rules::COUPON_MIN_SPEND,
    valid_days: rules::COUPON_VALID_DAYS,
};

/// Difficulty derived from the chosen level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Difficulty {
    pub level: i32,
    pub monster_count: i32,
    pub speed_tenths: i64,
}

impl Difficulty {
    pub fn for_level(level: i32) -> GameResult<Self> {
        if !(rules::MIN_LEVEL..=rules::MAX_LEVEL).contains(&level) {
            return Err(GameError::validation(format!(
                "Level must be {} to {}",
                rules::MIN_LEVEL,
                rules::MAX_LEVEL
            )));
        }
        Ok(Self {
            level,
            monster_count: (rules::BASE_MONSTERS + level).min(rules::MAX_MONSTERS),
            speed_tenths: (rules::BASE_SPEED_TENTHS + i64::from(level)).min(rules::MAX_SPEED_TENTHS),
        })
    }

    pub fn speed_multiplier(&self) -> f64 {
        self.speed_tenths as f64 / 10.0
    }
}

/// Payout of a finished game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub points: i64,
    pub exp: i64,
    pub deltas: Deltas,
    pub coupon: bool,
}

pub fn outcome_for(result: GameOutcome, difficulty: &Difficulty) -> GameResult<Outcome> {
    let level = i64::from(difficulty.level);
    let outcome = match result {
        GameOutcome::Win => Outcome {
            points: rules::WIN_POINTS_FACTOR
                * level
                * i64::from(difficulty.monster_count)
                * difficulty.speed_tenths
                / 10,
            exp: rules::WIN_EXP_PER_LEVEL * level,
            deltas: Deltas {
                hunger: -20,
                mood: 15,
                stamina: -30,
                cleanliness: -10,
                health: 0,
            },
            coupon: difficulty.level >= rules::COUPON_MIN_LEVEL,
        },
        GameOutcome::Lose => Outcome {
            points: rules::LOSE_POINTS,
            exp: rules::LOSE_EXP,
            deltas: Deltas {
                hunger: -10,
                mood: -10,
                stamina: -20,
                cleanliness: -5,
                health: 0,
            },
            coupon: false,
        },
        GameOutcome::Abort => Outcome {
            points: 0,
            exp: 0,
            deltas: Deltas {
                hunger: -5,
                mood: -5,
                stamina: -10,
                cleanliness: 0,
                health: 0,
            },
            coupon: false,
        },
        GameOutcome::Playing => {
            return Err(GameError::validation("Outcome must be Win, Lose or Abort"));
        }
    };
    Ok(outcome)
}

fn check_fit_to_play(pet: &Pet) -> GameResult<()> {
    let refusal = if pet.health <= ATTRIBUTE_MIN {
        Some("Pet is too sick to play")
    } else if pet.hunger >= ATTRIBUTE_MAX {
        Some("Pet is too hungry to play")
    } else if pet.mood <= ATTRIBUTE_MIN {
        Some("Pet is too sad to play")
    } else if pet.stamina <= ATTRIBUTE_MIN {
        Some("Pet is too tired to play")
    } else if pet.cleanliness <= ATTRIBUTE_MIN {
        Some("Pet is too dirty to play")
    } else {
        None
    };
    match refusal {
        Some(reason) => Err(GameError::conflict(reason)),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TodayStats {
    pub games: i64,
    pub wins: i64,
    pub points: i64,
    pub exp: i64,
    pub remaining: i64,
}

pub struct MiniGameService {
    ctx: ServiceContext,
}

impl MiniGameService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn start(&self, user_id: i64, level: i32) -> GameResult<GamePlay> {
        let difficulty = Difficulty::for_level(level)?;
        let now = self.ctx.clock.now();
        let (from, to) = day_bounds(now.date_naive());

        let mut tx = self.ctx.store.begin().await?;
        let started = tx.games_started_between(user_id, from, to).await?.len() as i64;
        if started >= rules::DAILY_LIMIT {
            return Err(GameError::LimitReached(format!(
                "Daily limit of {} games reached",
                rules::DAILY_LIMIT
            )));
        }
        let pet = current_pet(tx.as_mut(), user_id, now).await?;
        check_fit_to_play(&pet)?;
        tx.update_pet(&pet).await?;

        let game = tx
            .insert_game(&GamePlay {
                id: 0,
                user_id,
                pet_id: pet.id,
                level: difficulty.level,
                monster_count: difficulty.monster_count,
                speed_multiplier: difficulty.speed_multiplier(),
                result: GameOutcome::Playing,
                points_gained: 0,
                exp_gained: 0,
                coupon_code: None,
                hunger_delta: 0,
                mood_delta: 0,
                stamina_delta: 0,
                cleanliness_delta: 0,
                started_at: now,
                ended_at: None,
            })
            .await?;
        tx.commit().await?;
        info!(user_id, game_id = game.id, level, "Game started");
        Ok(game)
    }

    pub async fn finish(&self, user_id: i64, game_id: i64, result: GameOutcome) -> GameResult<GamePlay> {
        let mut fx = Postings::at(self.ctx.clock.now());
        let mut tx = self.ctx.store.begin().await?;
        let mut game = tx
            .game_by_id_for_update(game_id)
            .await?
            .filter(|g| g.user_id == user_id)
            .ok_or_else(|| GameError::not_found("Game"))?;
        if game.result != GameOutcome::Playing {
            return Err(GameError::conflict("Game already ended"));
        }
        let difficulty = Difficulty::for_level(game.level)?;
        let outcome = outcome_for(result, &difficulty)?;

        let mut pet = current_pet(tx.as_mut(), user_id, fx.now).await?;
        outcome.deltas.apply(&mut pet);
        ledger::grant_pet_experience(tx.as_mut(), &mut fx, &mut pet, outcome.exp).await?;
        tx.update_pet(&pet).await?;

        if outcome.points > 0 {
            ledger::credit(
                tx.as_mut(),
                &mut fx,
                user_id,
                outcome.points,
                Entry::new(
                    ChangeType::MiniGame,
                    format!("Mini-game {} (level {})", result, game.level),
                ),
            )
            .await?;
        }
        if outcome.coupon {
            let coupon = ledger::issue_reward_coupon(tx.as_mut(), &mut fx, user_id, &GAME_COUPON).await?;
            game.coupon_code = Some(coupon.code);
        }

        game.result = result;
        game.points_gained = outcome.points;
        game.exp_gained = outcome.exp;
        game.hunger_delta = outcome.deltas.hunger;
        game.mood_delta = outcome.deltas.mood;
        game.stamina_delta = outcome.deltas.stamina;
        game.cleanliness_delta = outcome.deltas.cleanliness;
        game.ended_at = Some(fx.now);
        tx.update_game(&game).await?;
        tx.commit().await?;

        fx.publish(&self.ctx.metrics);
        self.ctx
            .metrics
            .games_finished
            .with_label_values(&[result.as_str()])
            .inc();
        info!(user_id, game_id, result = %result, points = outcome.points, "Game finished");
        Ok(game)
    }

    pub async fn abort(&self, user_id: i64, game_id: i64) -> GameResult<GamePlay> {
        self.finish(user_id, game_id, GameOutcome::Abort).await
    }

    pub async fn remaining_today(&self, user_id: i64) -> GameResult<i64> {
        Ok(self.today_stats(user_id).await?.remaining)
    }

    pub async fn history(&self, user_id: i64, page: PageRequest) -> GameResult<Page<GamePlay>> {
        let mut tx = self.ctx.store.begin().await?;
        let (items, total) = tx.games_of_user(user_id, page).await?;
        Ok(Page::new(items, total, page))
    }

    /// Totals over games started today
    pub async fn today_stats(&self, user_id: i64) -> GameResult<TodayStats> {
        let (from, to) = day_bounds(self.ctx.clock.today());
        let mut tx = self.ctx.store.begin().await?;
        let games = tx.games_started_between(user_id, from, to).await?;
        let mut stats = games.iter().fold(TodayStats::default(), |mut acc, g| {
            acc.games += 1;
            if g.result == GameOutcome::Win {
                acc.wins += 1;
            }
            acc.points += g.points_gained;
            acc.exp += g.exp_gained;
            acc
        });
        stats.remaining = (rules::DAILY_LIMIT - stats.games).max(0);
        Ok(stats)
    }
}
