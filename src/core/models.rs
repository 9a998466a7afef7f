// Domain models shared by services, stores and the HTTP layer

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use crate::core::errors::GameError;

/// Enums persisted as TEXT columns: string form, parsing and Display.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = GameError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(GameError::Validation(format!(
                        "Unknown {} '{}'", stringify!($name), other
                    ))),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = GameError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub account: String,
    pub email: String,
    pub nickname: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub email_confirmed: bool,
    pub shopping_permission: bool,
    pub message_permission: bool,
    pub access_failed_count: i32,
    pub lockout_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.lockout_end.map_or(false, |end| end > now)
    }
}

/// Public projection of a user, safe to show to other members.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: i64,
    pub account: String,
    pub nickname: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            account: user.account.clone(),
            nickname: user.nickname.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenPurpose {
    Refresh,
    PasswordReset,
    EmailConfirmation,
}

text_enum!(TokenPurpose {
    Refresh => "Refresh",
    PasswordReset => "PasswordReset",
    EmailConfirmation => "EmailConfirmation",
});

/// Stored opaque token. Only the SHA-256 digest of the token is persisted.
#[derive(Debug, Clone, FromRow)]
pub struct UserToken {
    pub id: i64,
    pub user_id: i64,
    #[sqlx(try_from = "String")]
    pub purpose: TokenPurpose,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QueuedEmail {
    pub id: i64,
    pub to_email: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// RBAC
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    AdministratorPrivilegesManagement,
    UserStatusManagement,
    ShoppingPermissionManagement,
    MessagePermissionManagement,
    PetRightsManagement,
    CustomerService,
}

text_enum!(Permission {
    AdministratorPrivilegesManagement => "AdministratorPrivilegesManagement",
    UserStatusManagement => "UserStatusManagement",
    ShoppingPermissionManagement => "ShoppingPermissionManagement",
    MessagePermissionManagement => "MessagePermissionManagement",
    PetRightsManagement => "PetRightsManagement",
    CustomerService => "CustomerService",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub permissions: Vec<Permission>,
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Wallet {
    pub user_id: i64,
    pub points: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    Point,
    Transfer,
    Coupon,
    EVoucher,
    SignIn,
    MiniGame,
    PetLevelUp,
}

text_enum!(ChangeType {
    Point => "Point",
    Transfer => "Transfer",
    Coupon => "Coupon",
    EVoucher => "EVoucher",
    SignIn => "SignIn",
    MiniGame => "MiniGame",
    PetLevelUp => "PetLevelUp",
});

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WalletHistory {
    pub id: i64,
    pub user_id: i64,
    #[sqlx(try_from = "String")]
    pub change_type: ChangeType,
    pub points_changed: i64,
    pub item_code: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct LeaderboardEntry {
    pub user_id: i64,
    pub nickname: String,
    pub points: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscountType {
    Amount,
    Percent,
}

text_enum!(DiscountType {
    Amount => "Amount",
    Percent => "Percent",
});

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CouponType {
    pub id: i64,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub min_spend: i64,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub points_cost: i64,
    pub is_active: bool,
    pub description: Option<String>,
}

impl CouponType {
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.valid_from <= now && now <= self.valid_to
    }

    /// Discount granted on `subtotal`, never more than the subtotal itself.
    pub fn discount_for(&self, subtotal: i64) -> i64 {
        let raw = match self.discount_type {
            DiscountType::Amount => self.discount_value,
            DiscountType::Percent => subtotal * self.discount_value / 100,
        };
        raw.clamp(0, subtotal.max(0))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Coupon {
    pub id: i64,
    pub code: String,
    pub coupon_type_id: i64,
    pub user_id: i64,
    pub is_used: bool,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub used_in_order_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EVoucherType {
    pub id: i64,
    pub name: String,
    pub value_amount: i64,
    pub points_cost: i64,
    pub total_available: i64,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub is_active: bool,
    pub description: Option<String>,
}

impl EVoucherType {
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.valid_from <= now && now <= self.valid_to
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EVoucher {
    pub id: i64,
    pub code: String,
    pub evoucher_type_id: i64,
    pub user_id: i64,
    pub is_used: bool,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

/// Short-lived presentation token for redeeming an e-voucher at a counter.
#[derive(Debug, Clone, FromRow)]
pub struct EVoucherToken {
    pub id: i64,
    pub evoucher_id: i64,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedeemStatus {
    Approved,
    Expired,
    AlreadyUsed,
    Revoked,
    NotFound,
}

text_enum!(RedeemStatus {
    Approved => "Approved",
    Expired => "Expired",
    AlreadyUsed => "AlreadyUsed",
    Revoked => "Revoked",
    NotFound => "NotFound",
});

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EVoucherRedeemLog {
    pub id: i64,
    pub evoucher_id: Option<i64>,
    pub user_id: Option<i64>,
    pub scanned_by: i64,
    #[sqlx(try_from = "String")]
    pub status: RedeemStatus,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Sign-in
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SignInRecord {
    pub id: i64,
    pub user_id: i64,
    pub sign_date: NaiveDate,
    pub signed_at: DateTime<Utc>,
    pub streak: i32,
    pub points_gained: i64,
    pub exp_gained: i64,
    pub coupon_code: Option<String>,
}

// ---------------------------------------------------------------------------
// Pet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Pet {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub level: i32,
    pub experience: i64,
    pub hunger: i32,
    pub mood: i32,
    pub stamina: i32,
    pub cleanliness: i32,
    pub health: i32,
    pub skin_color: String,
    pub background_color: String,
    pub attributes_updated_at: DateTime<Utc>,
    pub level_up_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Mini-game
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameOutcome {
    Playing,
    Win,
    Lose,
    Abort,
}

text_enum!(GameOutcome {
    Playing => "Playing",
    Win => "Win",
    Lose => "Lose",
    Abort => "Abort",
});

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GamePlay {
    pub id: i64,
    pub user_id: i64,
    pub pet_id: i64,
    pub level: i32,
    pub monster_count: i32,
    pub speed_multiplier: f64,
    #[sqlx(try_from = "String")]
    pub result: GameOutcome,
    pub points_gained: i64,
    pub exp_gained: i64,
    pub coupon_code: Option<String>,
    pub hunger_delta: i32,
    pub mood_delta: i32,
    pub stamina_delta: i32,
    pub cleanliness_delta: i32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Forum
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Forum {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Thread {
    pub id: i64,
    pub forum_id: i64,
    pub author_id: i64,
    pub title: String,
    pub is_pinned: bool,
    pub is_locked: bool,
    pub view_count: i64,
    pub reply_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: i64,
    pub thread_id: i64,
    pub author_id: i64,
    pub parent_post_id: Option<i64>,
    pub content: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reaction {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub product_type: String,
    pub description: Option<String>,
    pub price: i64,
    /// `None` means unlimited stock.
    pub stock: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CartItem {
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Completed,
    Cancelled,
}

text_enum!(OrderStatus {
    Pending => "Pending",
    Paid => "Paid",
    Shipped => "Shipped",
    Completed => "Completed",
    Cancelled => "Cancelled",
});

impl OrderStatus {
    /// Allowed forward transitions of the order lifecycle.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Paid)
                | (Paid, Shipped)
                | (Shipped, Completed)
                | (Pending, Cancelled)
                | (Paid, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    #[sqlx(try_from = "String")]
    pub status: OrderStatus,
    pub subtotal: i64,
    pub discount: i64,
    pub total: i64,
    pub coupon_id: Option<i64>,
    pub coupon_code: Option<String>,
    pub shipping_address: String,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub unit_price: i64,
    pub quantity: i64,
    pub line_total: i64,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Paging
// ---------------------------------------------------------------------------

/// Offset window over an ordered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub const MAX_PAGE_SIZE: u32 = 100;

    /// Normalises page numbers to start at 1 and caps the page size.
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, Self::MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page,
            page_size: request.page_size,
        }
    }
}
