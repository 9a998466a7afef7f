// Virtual pet care

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use super::ledger::{self, Entry, Postings};
use super::{bounded_text, is_hex_color, rbac, ServiceContext};
use crate::core::constants::{pet as rules, ATTRIBUTE_MAX, ATTRIBUTE_MIN};
use crate::core::errors::{GameError, GameResult};
use crate::core::models::{ChangeType, Permission, Pet};
use crate::store::StoreTx;

fn clamp(value: i32) -> i32 {
    value.clamp(ATTRIBUTE_MIN, ATTRIBUTE_MAX)
}

/// Apply the hourly attribute decay accrued since the last update.
///
/// Only whole hours count; the remainder carries over to the next call.
pub(crate) fn apply_decay(pet: &mut Pet, now: DateTime<Utc>) {
    let hours = (now - pet.attributes_updated_at).num_hours();
    if hours <= 0 {
        return;
    }
    let h = i32::try_from(hours).unwrap_or(i32::MAX / rules::DECAY_HUNGER_PER_HOUR);

    pet.hunger = clamp(pet.hunger.saturating_add(h.saturating_mul(rules::DECAY_HUNGER_PER_HOUR)));
    if pet.hunger > rules::DECAY_HUNGRY_THRESHOLD {
        pet.mood = clamp(pet.mood.saturating_sub(h));
    }
    pet.cleanliness = clamp(pet.cleanliness.saturating_sub(h));
    if pet.hunger > rules::DECAY_STARVING_THRESHOLD || pet.cleanliness < rules::DECAY_DIRTY_THRESHOLD {
        pet.health = clamp(pet.health.saturating_sub(h));
    }
    pet.stamina = clamp(pet.stamina.saturating_sub(h));
    pet.attributes_updated_at += Duration::hours(hours);
}

/// Attribute changes of one care action or game outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deltas {
    pub hunger: i32,
    pub mood: i32,
    pub stamina: i32,
    pub cleanliness: i32,
    pub health: i32,
}

impl Deltas {
    pub(crate) fn apply(&self, pet: &mut Pet) {
        pet.hunger = clamp(pet.hunger + self.hunger);
        pet.mood = clamp(pet.mood + self.mood);
        pet.stamina = clamp(pet.stamina + self.stamina);
        pet.cleanliness = clamp(pet.cleanliness + self.cleanliness);
        pet.health = clamp(pet.health + self.health);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Care {
    Feed,
    Play,
    Bathe,
    Rest,
}

impl Care {
    fn deltas(self) -> Deltas {
        match self {
            Care::Feed => Deltas {
                hunger: rules::FEED_HUNGER,
                mood: rules::FEED_MOOD,
                health: rules::FEED_HEALTH,
                ..Deltas::default()
            },
            Care::Play => Deltas {
                mood: rules::PLAY_MOOD,
                stamina: rules::PLAY_STAMINA,
                ..Deltas::default()
            },
            Care::Bathe => Deltas {
                cleanliness: rules::BATHE_CLEANLINESS,
                mood: rules::BATHE_MOOD,
                health: rules::BATHE_HEALTH,
                ..Deltas::default()
            },
            Care::Rest => Deltas {
                stamina: rules::REST_STAMINA,
                health: rules::REST_HEALTH,
                mood: rules::REST_MOOD,
                ..Deltas::default()
            },
        }
    }

    fn check(self, pet: &Pet) -> GameResult<()> {
        if self != Care::Rest && pet.health <= 0 {
            return Err(GameError::conflict("Pet is too sick, let it rest first"));
        }
        if self == Care::Play && pet.stamina < rules::PLAY_MIN_STAMINA {
            return Err(GameError::conflict("Pet is too tired to play"));
        }
        Ok(())
    }
}

fn fresh_attributes(pet: &mut Pet, now: DateTime<Utc>) {
    pet.hunger = rules::INITIAL_ATTRIBUTE;
    pet.mood = rules::INITIAL_ATTRIBUTE;
    pet.stamina = rules::INITIAL_ATTRIBUTE;
    pet.cleanliness = rules::INITIAL_ATTRIBUTE;
    pet.health = rules::INITIAL_HEALTH;
    pet.attributes_updated_at = now;
}

/// The user's pet with decay applied, locked for update
pub(crate) async fn current_pet(
    tx: &mut dyn StoreTx,
    user_id: i64,
    now: DateTime<Utc>,
) -> GameResult<Pet> {
    let mut pet = tx
        .pet_of_user_for_update(user_id)
        .await?
        .ok_or_else(|| GameError::not_found("Pet"))?;
    apply_decay(&mut pet, now);
    Ok(pet)
}

fn checked_color(value: &str) -> GameResult<String> {
    let value = value.trim();
    if !is_hex_color(value) {
        return Err(GameError::validation("Color must be #RRGGBB"));
    }
    Ok(value.to_ascii_uppercase())
}

pub struct PetService {
    ctx: ServiceContext,
}

impl PetService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn create(&self, user_id: i64, name: &str) -> GameResult<Pet> {
        let name = bounded_text("Pet name", name, 1, rules::NAME_MAX_CHARS)?;
        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;
        if tx.pet_of_user_for_update(user_id).await?.is_some() {
            return Err(GameError::conflict("User already has a pet"));
        }
        let mut pet = Pet {
            id: 0,
            user_id,
            name: name.to_string(),
            level: rules::INITIAL_LEVEL,
            experience: 0,
            hunger: 0,
            mood: 0,
            stamina: 0,
            cleanliness: 0,
            health: 0,
            skin_color: rules::DEFAULT_SKIN_COLOR.to_string(),
            background_color: rules::DEFAULT_BACKGROUND_COLOR.to_string(),
            attributes_updated_at: now,
            level_up_time: None,
            created_at: now,
        };
        fresh_attributes(&mut pet, now);
        let pet = tx.insert_pet(&pet).await?;
        tx.commit().await?;
        info!(user_id, pet_id = pet.id, "Pet adopted");
        Ok(pet)
    }

    pub async fn get(&self, user_id: i64) -> GameResult<Pet> {
        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;
        let pet = current_pet(tx.as_mut(), user_id, now).await?;
        tx.update_pet(&pet).await?;
        tx.commit().await?;
        Ok(pet)
    }

    async fn care(&self, user_id: i64, care: Care) -> GameResult<Pet> {
        let mut fx = Postings::at(self.ctx.clock.now());
        let mut tx = self.ctx.store.begin().await?;
        let mut pet = current_pet(tx.as_mut(), user_id, fx.now).await?;
        care.check(&pet)?;
        care.deltas().apply(&mut pet);
        if care == Care::Play {
            ledger::grant_pet_experience(tx.as_mut(), &mut fx, &mut pet, rules::PLAY_EXP).await?;
        }
        tx.update_pet(&pet).await?;
        tx.commit().await?;
        fx.publish(&self.ctx.metrics);
        Ok(pet)
    }

    pub async fn feed(&self, user_id: i64) -> GameResult<Pet> {
        self.care(user_id, Care::Feed).await
    }

    pub async fn play(&self, user_id: i64) -> GameResult<Pet> {
        self.care(user_id, Care::Play).await
    }

    pub async fn bathe(&self, user_id: i64) -> GameResult<Pet> {
        self.care(user_id, Care::Bathe).await
    }

    pub async fn rest(&self, user_id: i64) -> GameResult<Pet> {
        self.care(user_id, Care::Rest).await
    }

    /// Paid recolour; the debit and the pet change commit together
    pub async fn change_skin_color(&self, user_id: i64, color: &str) -> GameResult<Pet> {
        let color = checked_color(color)?;
        let mut fx = Postings::at(self.ctx.clock.now());
        let mut tx = self.ctx.store.begin().await?;
        let mut pet = current_pet(tx.as_mut(), user_id, fx.now).await?;
        ledger::debit(
            tx.as_mut(),
            &mut fx,
            user_id,
            rules::SKIN_COLOR_COST,
            Entry::new(ChangeType::Point, "Change pet skin color"),
        )
        .await?;
        pet.skin_color = color;
        tx.update_pet(&pet).await?;
        tx.commit().await?;
        fx.publish(&self.ctx.metrics);
        Ok(pet)
    }

    pub async fn change_background_color(&self, user_id: i64, color: &str) -> GameResult<Pet> {
        let color = checked_color(color)?;
        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;
        let mut pet = current_pet(tx.as_mut(), user_id, now).await?;
        pet.background_color = color;
        tx.update_pet(&pet).await?;
        tx.commit().await?;
        Ok(pet)
    }

    pub async fn rename(&self, user_id: i64, name: &str) -> GameResult<Pet> {
        let name = bounded_text("Pet name", name, 1, rules::NAME_MAX_CHARS)?;
        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;
        let mut pet = current_pet(tx.as_mut(), user_id, now).await?;
        pet.name = name.to_string();
        tx.update_pet(&pet).await?;
        tx.commit().await?;
        Ok(pet)
    }

    pub async fn view_pet(&self, admin_id: i64, user_id: i64) -> GameResult<Pet> {
        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), admin_id, Permission::PetRightsManagement).await?;
        let pet = current_pet(tx.as_mut(), user_id, now).await?;
        tx.update_pet(&pet).await?;
        tx.commit().await?;
        Ok(pet)
    }

    /// Restore starting attributes; level, exp and colours are kept
    pub async fn reset_pet(&self, admin_id: i64, user_id: i64) -> GameResult<Pet> {
        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;
        rbac::require_permission(tx.as_mut(), admin_id, Permission::PetRightsManagement).await?;
        let mut pet = current_pet(tx.as_mut(), user_id, now).await?;
        fresh_attributes(&mut pet, now);
        tx.update_pet(&pet).await?;
        tx.commit().await?;
        info!(admin_id, user_id, "Pet attributes reset");
        Ok(pet)
    }
}
