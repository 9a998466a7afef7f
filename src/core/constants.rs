// Reward and game tuning values

/// Pet attributes live in `0..=ATTRIBUTE_MAX`.
pub const ATTRIBUTE_MAX: i32 = 100;
pub const ATTRIBUTE_MIN: i32 = 0;

pub mod pet {
    pub const INITIAL_LEVEL: i32 = 1;
    pub const INITIAL_ATTRIBUTE: i32 = 50;
    pub const INITIAL_HEALTH: i32 = 100;
    pub const DEFAULT_SKIN_COLOR: &str = "#79b7ff";
    pub const DEFAULT_BACKGROUND_COLOR: &str = "#91e27c";
    pub const NAME_MAX_CHARS: usize = 30;

    pub const SKIN_COLOR_COST: i64 = 2000;
    /// Exp needed to leave level `n` is `EXP_PER_LEVEL * n`.
    pub const EXP_PER_LEVEL: i64 = 50;
    pub const LEVEL_UP_BONUS_POINTS: i64 = 50;

    pub const FEED_HUNGER: i32 = -30;
    pub const FEED_MOOD: i32 = 10;
    pub const FEED_HEALTH: i32 = 5;

    pub const PLAY_MIN_STAMINA: i32 = 20;
    pub const PLAY_MOOD: i32 = 20;
    pub const PLAY_STAMINA: i32 = -15;
    pub const PLAY_EXP: i64 = 5;

    pub const BATHE_CLEANLINESS: i32 = 40;
    pub const BATHE_MOOD: i32 = 5;
    pub const BATHE_HEALTH: i32 = 10;

    pub const REST_STAMINA: i32 = 30;
    pub const REST_HEALTH: i32 = 5;
    pub const REST_MOOD: i32 = 5;

    /// Hunger gained per elapsed hour.
    pub const DECAY_HUNGER_PER_HOUR: i32 = 2;
    pub const DECAY_HUNGRY_THRESHOLD: i32 = 80;
    pub const DECAY_STARVING_THRESHOLD: i32 = 90;
    pub const DECAY_DIRTY_THRESHOLD: i32 = 20;
}

pub mod signin {
    pub const BASE_POINTS: i64 = 20;
    pub const BASE_EXP: i64 = 10;
    pub const WEEK_STREAK: i32 = 7;
    pub const WEEK_BONUS_POINTS: i64 = 100;
    pub const SHORT_STREAK: i32 = 3;
    pub const SHORT_BONUS_POINTS: i64 = 30;
    pub const SUNDAY_BONUS_POINTS: i64 = 50;
    pub const HISTORY_MAX_DAYS: u32 = 365;

    pub const COUPON_NAME: &str = "Sign-in Reward Coupon";
    pub const COUPON_PERCENT: i64 = 15;
    pub const COUPON_VALID_DAYS: i64 = 30;
}

pub mod minigame {
    pub const DAILY_LIMIT: i64 = 3;
    pub const MIN_LEVEL: i32 = 1;
    pub const MAX_LEVEL: i32 = 100;
    pub const BASE_MONSTERS: i32 = 3;
    pub const MAX_MONSTERS: i32 = 10;
    /// Speed is tracked in tenths: 1.0 + 0.1 per level, capped at 2.0
    pub const BASE_SPEED_TENTHS: i64 = 10;
    pub const MAX_SPEED_TENTHS: i64 = 20;

    pub const WIN_POINTS_FACTOR: i64 = 10;
    pub const WIN_EXP_PER_LEVEL: i64 = 5;
    pub const LOSE_POINTS: i64 = 5;
    pub const LOSE_EXP: i64 = 2;

    pub const COUPON_MIN_LEVEL: i32 = 5;
    pub const COUPON_NAME: &str = "Game Reward Coupon";
    pub const COUPON_AMOUNT: i64 = 50;
    pub const COUPON_MIN_SPEND: i64 = 100;
    pub const COUPON_VALID_DAYS: i64 = 7;
}

pub mod auth {
    pub const MAX_FAILED_LOGINS: i32 = 5;
    pub const LOCKOUT_MINUTES: i64 = 15;
    pub const PASSWORD_RESET_TTL_MINUTES: i64 = 60;
    pub const EMAIL_CONFIRMATION_TTL_HOURS: i64 = 48;
    pub const PASSWORD_MIN_CHARS: usize = 8;
    pub const ACCOUNT_MIN_CHARS: usize = 3;
    pub const ACCOUNT_MAX_CHARS: usize = 32;
}

pub mod wallet {
    pub const COUPON_CODE_LEN: usize = 10;
    pub const EVOUCHER_CODE_LEN: usize = 16;
    pub const EVOUCHER_TOKEN_TTL_MINUTES: i64 = 5;
    pub const LEADERBOARD_MAX: u32 = 100;
}

pub mod forum {
    pub const TITLE_MAX_CHARS: usize = 200;
    pub const CONTENT_MAX_CHARS: usize = 10_000;
    pub const DELETED_POST_TEXT: &str = "[deleted]";
}

pub mod shop {
    /// Largest quantity a single cart line may hold
    pub const MAX_LINE_QUANTITY: i64 = 999;
}
