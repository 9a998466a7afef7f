// Domain services
//
// Each public operation opens exactly one store transaction, performs its
// reads and writes through it and commits at the end. Errors before the
// commit drop the transaction and leave the store untouched.

use std::sync::Arc;

use crate::core::clock::Clock;
use crate::core::errors::{GameError, GameResult};
use crate::metrics::Metrics;
use crate::store::Store;

pub mod accounts;
pub mod admin;
pub mod forum;
pub mod ledger;
pub mod minigame;
pub mod notifications;
pub mod pet;
pub mod rbac;
pub mod shop;
pub mod signin;
pub mod wallet;

pub use accounts::AccountService;
pub use admin::AdminService;
pub use forum::ForumService;
pub use minigame::MiniGameService;
pub use notifications::NotificationService;
pub use pet::PetService;
pub use rbac::RbacService;
pub use shop::ShopService;
pub use signin::SignInService;
pub use wallet::WalletService;

/// Dependencies every service shares
#[derive(Clone)]
pub struct ServiceContext {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<Metrics>,
}

impl ServiceContext {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, metrics: Arc<Metrics>) -> Self {
        Self { store, clock, metrics }
    }
}

/// Trimmed `value` if its length in characters is within `min..=max`
pub(crate) fn bounded_text<'a>(
    field: &str,
    value: &'a str,
    min: usize,
    max: usize,
) -> GameResult<&'a str> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min || len > max {
        return Err(GameError::validation(format!(
            "{} must be {} to {} characters",
            field, min, max
        )));
    }
    Ok(trimmed)
}

/// `#RRGGBB`
pub(crate) fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}
