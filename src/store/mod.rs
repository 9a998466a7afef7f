// Transactional persistence seam
//
// Every service operation runs inside exactly one `StoreTx`. Dropping a
// transaction without calling `commit` discards its writes.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::core::errors::GameResult;
use crate::core::models::*;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Offset window used by listing queries
pub type Window = PageRequest;

/// Storage backend
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a transaction
    async fn begin(&self) -> GameResult<Box<dyn StoreTx>>;

    /// Cheap liveness probe for `/health`
    async fn ping(&self) -> GameResult<()>;
}

/// A unit of work against the store.
///
/// `insert_*` methods ignore the `id` of the row passed in and return the
/// stored row with its assigned id. `*_for_update` reads lock the row until
/// the transaction ends.
#[async_trait]
pub trait StoreTx: Send {
    async fn commit(self: Box<Self>) -> GameResult<()>;

    // -- users ------------------------------------------------------------
    async fn insert_user(&mut self, user: &User) -> GameResult<User>;
    async fn user_by_id(&mut self, id: i64) -> GameResult<Option<User>>;
    /// Case-insensitive
    async fn user_by_account(&mut self, account: &str) -> GameResult<Option<User>>;
    /// Case-insensitive
    async fn user_by_email(&mut self, email: &str) -> GameResult<Option<User>>;
    async fn update_user(&mut self, user: &User) -> GameResult<()>;
    async fn list_users(&mut self, window: Window) -> GameResult<(Vec<User>, i64)>;

    // -- tokens & email -----------------------------------------------------
    async fn insert_user_token(&mut self, token: &UserToken) -> GameResult<UserToken>;
    async fn user_token_by_hash(
        &mut self,
        purpose: TokenPurpose,
        token_hash: &str,
    ) -> GameResult<Option<UserToken>>;
    async fn delete_user_token(&mut self, id: i64) -> GameResult<()>;
    async fn delete_user_tokens(&mut self, user_id: i64, purpose: TokenPurpose) -> GameResult<()>;
    async fn insert_email(&mut self, email: &QueuedEmail) -> GameResult<QueuedEmail>;
    async fn emails_to(&mut self, to_email: &str) -> GameResult<Vec<QueuedEmail>>;

    // -- roles ------------------------------------------------------------
    async fn insert_role(&mut self, role: &Role) -> GameResult<Role>;
    async fn update_role(&mut self, role: &Role) -> GameResult<()>;
    async fn role_by_id(&mut self, id: i64) -> GameResult<Option<Role>>;
    async fn role_by_name(&mut self, name: &str) -> GameResult<Option<Role>>;
    async fn list_roles(&mut self) -> GameResult<Vec<Role>>;
    async fn roles_of_user(&mut self, user_id: i64) -> GameResult<Vec<Role>>;
    /// Returns false when the user already had the role
    async fn assign_role(&mut self, user_id: i64, role_id: i64) -> GameResult<bool>;
    /// Returns false when the user did not have the role
    async fn revoke_role(&mut self, user_id: i64, role_id: i64) -> GameResult<bool>;

    // -- wallet -----------------------------------------------------------
    async fn insert_wallet(&mut self, wallet: &Wallet) -> GameResult<()>;
    async fn wallet_for_update(&mut self, user_id: i64) -> GameResult<Option<Wallet>>;
    async fn set_wallet_points(
        &mut self,
        user_id: i64,
        points: i64,
        at: DateTime<Utc>,
    ) -> GameResult<()>;
    async fn insert_wallet_history(&mut self, entry: &WalletHistory) -> GameResult<WalletHistory>;
    /// Newest first
    async fn wallet_history(
        &mut self,
        user_id: i64,
        window: Window,
    ) -> GameResult<(Vec<WalletHistory>, i64)>;
    async fn top_wallets(&mut self, limit: i64) -> GameResult<Vec<LeaderboardEntry>>;
    async fn total_points(&mut self) -> GameResult<i64>;

    // -- coupons ----------------------------------------------------------
    async fn insert_coupon_type(&mut self, coupon_type: &CouponType) -> GameResult<CouponType>;
    async fn update_coupon_type(&mut self, coupon_type: &CouponType) -> GameResult<()>;
    async fn coupon_type_by_id(&mut self, id: i64) -> GameResult<Option<CouponType>>;
    async fn coupon_type_by_name(&mut self, name: &str) -> GameResult<Option<CouponType>>;
    async fn list_coupon_types(&mut self) -> GameResult<Vec<CouponType>>;
    async fn insert_coupon(&mut self, coupon: &Coupon) -> GameResult<Coupon>;
    async fn coupon_by_code_for_update(&mut self, code: &str) -> GameResult<Option<Coupon>>;
    async fn coupon_by_id(&mut self, id: i64) -> GameResult<Option<Coupon>>;
    /// Newest first
    async fn coupons_of_user(&mut self, user_id: i64, include_used: bool) -> GameResult<Vec<Coupon>>;
    async fn update_coupon(&mut self, coupon: &Coupon) -> GameResult<()>;

    // -- e-vouchers -------------------------------------------------------
    async fn insert_evoucher_type(&mut self, evoucher_type: &EVoucherType) -> GameResult<EVoucherType>;
    async fn update_evoucher_type(&mut self, evoucher_type: &EVoucherType) -> GameResult<()>;
    async fn evoucher_type_by_id(&mut self, id: i64) -> GameResult<Option<EVoucherType>>;
    async fn evoucher_type_by_name(&mut self, name: &str) -> GameResult<Option<EVoucherType>>;
    async fn list_evoucher_types(&mut self) -> GameResult<Vec<EVoucherType>>;
    async fn count_evouchers_of_type(&mut self, evoucher_type_id: i64) -> GameResult<i64>;
    async fn insert_evoucher(&mut self, evoucher: &EVoucher) -> GameResult<EVoucher>;
    async fn evoucher_by_code_for_update(&mut self, code: &str) -> GameResult<Option<EVoucher>>;
    async fn evoucher_by_id_for_update(&mut self, id: i64) -> GameResult<Option<EVoucher>>;
    /// Newest first
    async fn evouchers_of_user(&mut self, user_id: i64, include_used: bool) -> GameResult<Vec<EVoucher>>;
    async fn update_evoucher(&mut self, evoucher: &EVoucher) -> GameResult<()>;
    async fn insert_evoucher_token(&mut self, token: &EVoucherToken) -> GameResult<EVoucherToken>;
    async fn evoucher_token_by_hash(&mut self, token_hash: &str) -> GameResult<Option<EVoucherToken>>;
    async fn revoke_evoucher_tokens(&mut self, evoucher_id: i64) -> GameResult<()>;
    async fn insert_redeem_log(&mut self, log: &EVoucherRedeemLog) -> GameResult<EVoucherRedeemLog>;
    /// Newest first
    async fn redeem_logs(&mut self, window: Window) -> GameResult<(Vec<EVoucherRedeemLog>, i64)>;

    // -- sign-in ----------------------------------------------------------
    /// Fails with `Conflict` when the user already has a record for that day
    async fn insert_sign_in(&mut self, record: &SignInRecord) -> GameResult<SignInRecord>;
    async fn sign_in_on(&mut self, user_id: i64, day: NaiveDate) -> GameResult<Option<SignInRecord>>;
    /// Records with `sign_date >= since`, newest first
    async fn sign_ins_since(&mut self, user_id: i64, since: NaiveDate) -> GameResult<Vec<SignInRecord>>;
    async fn count_sign_ins_on(&mut self, day: NaiveDate) -> GameResult<i64>;

    // -- pets -------------------------------------------------------------
    async fn insert_pet(&mut self, pet: &Pet) -> GameResult<Pet>;
    async fn pet_of_user_for_update(&mut self, user_id: i64) -> GameResult<Option<Pet>>;
    async fn update_pet(&mut self, pet: &Pet) -> GameResult<()>;

    // -- mini-game --------------------------------------------------------
    async fn insert_game(&mut self, game: &GamePlay) -> GameResult<GamePlay>;
    async fn game_by_id_for_update(&mut self, id: i64) -> GameResult<Option<GamePlay>>;
    async fn update_game(&mut self, game: &GamePlay) -> GameResult<()>;
    /// Games of one user started in `[from, to)`, newest first
    async fn games_started_between(
        &mut self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> GameResult<Vec<GamePlay>>;
    /// Newest first
    async fn games_of_user(&mut self, user_id: i64, window: Window) -> GameResult<(Vec<GamePlay>, i64)>;
    async fn count_games_between(&mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> GameResult<i64>;

    // -- forum ------------------------------------------------------------
    async fn insert_forum(&mut self, forum: &Forum) -> GameResult<Forum>;
    async fn update_forum(&mut self, forum: &Forum) -> GameResult<()>;
    /// Also removes the forum's threads, posts and reactions
    async fn delete_forum(&mut self, id: i64) -> GameResult<()>;
    async fn forum_by_id(&mut self, id: i64) -> GameResult<Option<Forum>>;
    async fn forum_by_name(&mut self, name: &str) -> GameResult<Option<Forum>>;
    /// Ordered by name
    async fn list_forums(&mut self) -> GameResult<Vec<Forum>>;
    async fn insert_thread(&mut self, thread: &Thread) -> GameResult<Thread>;
    async fn thread_by_id_for_update(&mut self, id: i64) -> GameResult<Option<Thread>>;
    async fn update_thread(&mut self, thread: &Thread) -> GameResult<()>;
    /// Pinned first, then most recently updated
    async fn threads_in_forum(&mut self, forum_id: i64, window: Window) -> GameResult<(Vec<Thread>, i64)>;
    /// Case-insensitive title match, most recently updated first
    async fn search_threads(&mut self, keyword: &str, window: Window) -> GameResult<(Vec<Thread>, i64)>;
    async fn insert_post(&mut self, post: &Post) -> GameResult<Post>;
    async fn post_by_id_for_update(&mut self, id: i64) -> GameResult<Option<Post>>;
    async fn update_post(&mut self, post: &Post) -> GameResult<()>;
    /// Oldest first
    async fn posts_in_thread(&mut self, thread_id: i64, window: Window) -> GameResult<(Vec<Post>, i64)>;
    /// Case-insensitive content match over live posts, newest first
    async fn search_posts(&mut self, keyword: &str, window: Window) -> GameResult<(Vec<Post>, i64)>;
    async fn reaction_of_user(&mut self, post_id: i64, user_id: i64) -> GameResult<Option<Reaction>>;
    async fn insert_reaction(&mut self, reaction: &Reaction) -> GameResult<Reaction>;
    async fn delete_reaction(&mut self, id: i64) -> GameResult<()>;
    async fn reactions_for_post(&mut self, post_id: i64) -> GameResult<Vec<Reaction>>;

    // -- products & cart --------------------------------------------------
    async fn insert_product(&mut self, product: &Product) -> GameResult<Product>;
    async fn product_by_id_for_update(&mut self, id: i64) -> GameResult<Option<Product>>;
    async fn product_by_name(&mut self, name: &str) -> GameResult<Option<Product>>;
    async fn update_product(&mut self, product: &Product) -> GameResult<()>;
    /// Active products ordered by id
    async fn list_products(
        &mut self,
        product_type: Option<&str>,
        window: Window,
    ) -> GameResult<(Vec<Product>, i64)>;
    /// Active products whose name or description contains `keyword`
    async fn search_products(&mut self, keyword: &str, window: Window) -> GameResult<(Vec<Product>, i64)>;
    /// Active products with `min <= price <= max`, cheapest first
    async fn products_by_price(&mut self, min: i64, max: i64, window: Window) -> GameResult<(Vec<Product>, i64)>;
    async fn cart_items(&mut self, user_id: i64) -> GameResult<Vec<CartItem>>;
    async fn upsert_cart_item(&mut self, item: &CartItem) -> GameResult<()>;
    async fn delete_cart_item(&mut self, user_id: i64, product_id: i64) -> GameResult<bool>;
    async fn clear_cart(&mut self, user_id: i64) -> GameResult<()>;

    // -- orders -----------------------------------------------------------
    async fn insert_order(&mut self, order: &Order) -> GameResult<Order>;
    async fn order_by_id_for_update(&mut self, id: i64) -> GameResult<Option<Order>>;
    async fn update_order(&mut self, order: &Order) -> GameResult<()>;
    /// Newest first
    async fn orders_of_user(&mut self, user_id: i64, window: Window) -> GameResult<(Vec<Order>, i64)>;
    async fn insert_order_item(&mut self, item: &OrderItem) -> GameResult<OrderItem>;
    async fn order_items(&mut self, order_id: i64) -> GameResult<Vec<OrderItem>>;
    async fn count_orders_by_status(&mut self) -> GameResult<Vec<(OrderStatus, i64)>>;

    // -- notifications ----------------------------------------------------
    async fn insert_notification(&mut self, notification: &Notification) -> GameResult<Notification>;
    async fn notification_by_id(&mut self, id: i64) -> GameResult<Option<Notification>>;
    async fn update_notification(&mut self, notification: &Notification) -> GameResult<()>;
    /// Newest first
    async fn notifications_of_user(
        &mut self,
        user_id: i64,
        unread_only: bool,
        window: Window,
    ) -> GameResult<(Vec<Notification>, i64)>;
    async fn count_unread_notifications(&mut self, user_id: i64) -> GameResult<i64>;
    /// Returns the number of notifications changed
    async fn mark_all_notifications_read(&mut self, user_id: i64, at: DateTime<Utc>) -> GameResult<i64>;
}
