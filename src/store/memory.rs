// In-memory store used for development and tests
//
// A transaction holds the table lock for its whole lifetime and works on a
// private copy of the tables, so transactions are serialised and an
// uncommitted transaction leaves no trace.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Store, StoreTx, Window};
use crate::core::errors::{GameError, GameResult};
use crate::core::models::*;

/// Rows keyed by id with a per-table sequence
#[derive(Debug, Clone)]
struct Table<T> {
    rows: BTreeMap<i64, T>,
    next_id: i64,
}

impl<T: Clone> Table<T> {
    fn insert_with(&mut self, build: impl FnOnce(i64) -> T) -> T {
        self.next_id += 1;
        let row = build(self.next_id);
        self.rows.insert(self.next_id, row.clone());
        row
    }

    fn get(&self, id: i64) -> Option<T> {
        self.rows.get(&id).cloned()
    }

    fn replace(&mut self, id: i64, row: T, what: &str) -> GameResult<()> {
        match self.rows.get_mut(&id) {
            Some(slot) => {
                *slot = row;
                Ok(())
            }
            None => Err(GameError::not_found(what)),
        }
    }

    fn values(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: Table<User>,
    user_tokens: Table<UserToken>,
    emails: Table<QueuedEmail>,
    roles: Table<Role>,
    user_roles: BTreeSet<(i64, i64)>,
    wallets: BTreeMap<i64, Wallet>,
    wallet_history: Table<WalletHistory>,
    coupon_types: Table<CouponType>,
    coupons: Table<Coupon>,
    evoucher_types: Table<EVoucherType>,
    evouchers: Table<EVoucher>,
    evoucher_tokens: Table<EVoucherToken>,
    redeem_logs: Table<EVoucherRedeemLog>,
    sign_ins: Table<SignInRecord>,
    pets: Table<Pet>,
    games: Table<GamePlay>,
    forums: Table<Forum>,
    threads: Table<Thread>,
    posts: Table<Post>,
    reactions: Table<Reaction>,
    products: Table<Product>,
    cart: BTreeMap<(i64, i64), CartItem>,
    orders: Table<Order>,
    order_items: Table<OrderItem>,
    notifications: Table<Notification>,
}

/// Process-local store
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> GameResult<Box<dyn StoreTx>> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn ping(&self) -> GameResult<()> {
        Ok(())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

fn window_of<T>(mut items: Vec<T>, window: Window) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let start = (window.offset() as usize).min(items.len());
    let end = (start + window.limit() as usize).min(items.len());
    let page = items.drain(start..end).collect();
    (page, total)
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(self: Box<Self>) -> GameResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    // -- users ------------------------------------------------------------

    async fn insert_user(&mut self, user: &User) -> GameResult<User> {
        let t = &mut self.working;
        let account = user.account.to_lowercase();
        let email = user.email.to_lowercase();
        if t.users.values().any(|u| u.account.to_lowercase() == account) {
            return Err(GameError::conflict("Account already exists"));
        }
        if t.users.values().any(|u| u.email.to_lowercase() == email) {
            return Err(GameError::conflict("Email already registered"));
        }
        Ok(t.users.insert_with(|id| User { id, ..user.clone() }))
    }

    async fn user_by_id(&mut self, id: i64) -> GameResult<Option<User>> {
        Ok(self.working.users.get(id))
    }

    async fn user_by_account(&mut self, account: &str) -> GameResult<Option<User>> {
        let account = account.to_lowercase();
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.account.to_lowercase() == account)
            .cloned())
    }

    async fn user_by_email(&mut self, email: &str) -> GameResult<Option<User>> {
        let email = email.to_lowercase();
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.email.to_lowercase() == email)
            .cloned())
    }

    async fn update_user(&mut self, user: &User) -> GameResult<()> {
        self.working.users.replace(user.id, user.clone(), "User")
    }

    async fn list_users(&mut self, window: Window) -> GameResult<(Vec<User>, i64)> {
        Ok(window_of(self.working.users.values().cloned().collect(), window))
    }

    // -- tokens & email -----------------------------------------------------

    async fn insert_user_token(&mut self, token: &UserToken) -> GameResult<UserToken> {
        Ok(self
            .working
            .user_tokens
            .insert_with(|id| UserToken { id, ..token.clone() }))
    }

    async fn user_token_by_hash(
        &mut self,
        purpose: TokenPurpose,
        token_hash: &str,
    ) -> GameResult<Option<UserToken>> {
        Ok(self
            .working
            .user_tokens
            .values()
            .find(|t| t.purpose == purpose && t.token_hash == token_hash)
            .cloned())
    }

    async fn delete_user_token(&mut self, id: i64) -> GameResult<()> {
        self.working.user_tokens.rows.remove(&id);
        Ok(())
    }

    async fn delete_user_tokens(&mut self, user_id: i64, purpose: TokenPurpose) -> GameResult<()> {
        self.working
            .user_tokens
            .rows
            .retain(|_, t| !(t.user_id == user_id && t.purpose == purpose));
        Ok(())
    }

    async fn insert_email(&mut self, email: &QueuedEmail) -> GameResult<QueuedEmail> {
        Ok(self
            .working
            .emails
            .insert_with(|id| QueuedEmail { id, ..email.clone() }))
    }

    async fn emails_to(&mut self, to_email: &str) -> GameResult<Vec<QueuedEmail>> {
        let to_email = to_email.to_lowercase();
        Ok(self
            .working
            .emails
            .values()
            .filter(|e| e.to_email.to_lowercase() == to_email)
            .cloned()
            .collect())
    }

    // -- roles ------------------------------------------------------------

    async fn insert_role(&mut self, role: &Role) -> GameResult<Role> {
        if self.working.roles.values().any(|r| r.name == role.name) {
            return Err(GameError::conflict("Role already exists"));
        }
        Ok(self.working.roles.insert_with(|id| Role { id, ..role.clone() }))
    }

    async fn update_role(&mut self, role: &Role) -> GameResult<()> {
        self.working.roles.replace(role.id, role.clone(), "Role")
    }

    async fn role_by_id(&mut self, id: i64) -> GameResult<Option<Role>> {
        Ok(self.working.roles.get(id))
    }

    async fn role_by_name(&mut self, name: &str) -> GameResult<Option<Role>> {
        Ok(self.working.roles.values().find(|r| r.name == name).cloned())
    }

    async fn list_roles(&mut self) -> GameResult<Vec<Role>> {
        Ok(self.working.roles.values().cloned().collect())
    }

    async fn roles_of_user(&mut self, user_id: i64) -> GameResult<Vec<Role>> {
        let t = &self.working;
        Ok(t.user_roles
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .filter_map(|(_, rid)| t.roles.get(*rid))
            .collect())
    }

    async fn assign_role(&mut self, user_id: i64, role_id: i64) -> GameResult<bool> {
        Ok(self.working.user_roles.insert((user_id, role_id)))
    }

    async fn revoke_role(&mut self, user_id: i64, role_id: i64) -> GameResult<bool> {
        Ok(self.working.user_roles.remove(&(user_id, role_id)))
    }

    // -- wallet -----------------------------------------------------------

    async fn insert_wallet(&mut self, wallet: &Wallet) -> GameResult<()> {
        if self.working.wallets.contains_key(&wallet.user_id) {
            return Err(GameError::conflict("Wallet already exists"));
        }
        self.working.wallets.insert(wallet.user_id, wallet.clone());
        Ok(())
    }

    async fn wallet_for_update(&mut self, user_id: i64) -> GameResult<Option<Wallet>> {
        Ok(self.working.wallets.get(&user_id).cloned())
    }

    async fn set_wallet_points(
        &mut self,
        user_id: i64,
        points: i64,
        at: DateTime<Utc>,
    ) -> GameResult<()> {
        let wallet = self
            .working
            .wallets
            .get_mut(&user_id)
            .ok_or_else(|| GameError::not_found("Wallet"))?;
        wallet.points = points;
        wallet.updated_at = at;
        Ok(())
    }

    async fn insert_wallet_history(&mut self, entry: &WalletHistory) -> GameResult<WalletHistory> {
        Ok(self
            .working
            .wallet_history
            .insert_with(|id| WalletHistory { id, ..entry.clone() }))
    }

    async fn wallet_history(
        &mut self,
        user_id: i64,
        window: Window,
    ) -> GameResult<(Vec<WalletHistory>, i64)> {
        let mut rows: Vec<_> = self
            .working
            .wallet_history
            .values()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(window_of(rows, window))
    }

    async fn top_wallets(&mut self, limit: i64) -> GameResult<Vec<LeaderboardEntry>> {
        let t = &self.working;
        let mut rows: Vec<_> = t
            .wallets
            .values()
            .filter_map(|w| {
                t.users.get(w.user_id).map(|u| LeaderboardEntry {
                    user_id: u.id,
                    nickname: u.nickname,
                    points: w.points,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.points.cmp(&a.points).then(a.user_id.cmp(&b.user_id)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn total_points(&mut self) -> GameResult<i64> {
        Ok(self.working.wallets.values().map(|w| w.points).sum())
    }

    // -- coupons ----------------------------------------------------------

    async fn insert_coupon_type(&mut self, coupon_type: &CouponType) -> GameResult<CouponType> {
        Ok(self
            .working
            .coupon_types
            .insert_with(|id| CouponType { id, ..coupon_type.clone() }))
    }

    async fn update_coupon_type(&mut self, coupon_type: &CouponType) -> GameResult<()> {
        self.working
            .coupon_types
            .replace(coupon_type.id, coupon_type.clone(), "Coupon type")
    }

    async fn coupon_type_by_id(&mut self, id: i64) -> GameResult<Option<CouponType>> {
        Ok(self.working.coupon_types.get(id))
    }

    async fn coupon_type_by_name(&mut self, name: &str) -> GameResult<Option<CouponType>> {
        Ok(self
            .working
            .coupon_types
            .values()
            .find(|c| c.name == name)
            .cloned())
    }

    async fn list_coupon_types(&mut self) -> GameResult<Vec<CouponType>> {
        Ok(self.working.coupon_types.values().cloned().collect())
    }

    async fn insert_coupon(&mut self, coupon: &Coupon) -> GameResult<Coupon> {
        if self.working.coupons.values().any(|c| c.code == coupon.code) {
            return Err(GameError::conflict("Coupon code already exists"));
        }
        Ok(self
            .working
            .coupons
            .insert_with(|id| Coupon { id, ..coupon.clone() }))
    }

    async fn coupon_by_code_for_update(&mut self, code: &str) -> GameResult<Option<Coupon>> {
        Ok(self
            .working
            .coupons
            .values()
            .find(|c| c.code == code)
            .cloned())
    }

    async fn coupon_by_id(&mut self, id: i64) -> GameResult<Option<Coupon>> {
        Ok(self.working.coupons.get(id))
    }

    async fn coupons_of_user(&mut self, user_id: i64, include_used: bool) -> GameResult<Vec<Coupon>> {
        let mut rows: Vec<_> = self
            .working
            .coupons
            .values()
            .filter(|c| c.user_id == user_id && (include_used || !c.is_used))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.acquired_at.cmp(&a.acquired_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn update_coupon(&mut self, coupon: &Coupon) -> GameResult<()> {
        self.working.coupons.replace(coupon.id, coupon.clone(), "Coupon")
    }

    // -- e-vouchers -------------------------------------------------------

    async fn insert_evoucher_type(&mut self, evoucher_type: &EVoucherType) -> GameResult<EVoucherType> {
        Ok(self
            .working
            .evoucher_types
            .insert_with(|id| EVoucherType { id, ..evoucher_type.clone() }))
    }

    async fn update_evoucher_type(&mut self, evoucher_type: &EVoucherType) -> GameResult<()> {
        self.working
            .evoucher_types
            .replace(evoucher_type.id, evoucher_type.clone(), "E-voucher type")
    }

    async fn evoucher_type_by_id(&mut self, id: i64) -> GameResult<Option<EVoucherType>> {
        Ok(self.working.evoucher_types.get(id))
    }

    async fn evoucher_type_by_name(&mut self, name: &str) -> GameResult<Option<EVoucherType>> {
        Ok(self
            .working
            .evoucher_types
            .values()
            .find(|e| e.name == name)
            .cloned())
    }

    async fn list_evoucher_types(&mut self) -> GameResult<Vec<EVoucherType>> {
        Ok(self.working.evoucher_types.values().cloned().collect())
    }

    async fn count_evouchers_of_type(&mut self, evoucher_type_id: i64) -> GameResult<i64> {
        Ok(self
            .working
            .evouchers
            .values()
            .filter(|e| e.evoucher_type_id == evoucher_type_id)
            .count() as i64)
    }

    async fn insert_evoucher(&mut self, evoucher: &EVoucher) -> GameResult<EVoucher> {
        if self.working.evouchers.values().any(|e| e.code == evoucher.code) {
            return Err(GameError::conflict("E-voucher code already exists"));
        }
        Ok(self
            .working
            .evouchers
            .insert_with(|id| EVoucher { id, ..evoucher.clone() }))
    }

    async fn evoucher_by_code_for_update(&mut self, code: &str) -> GameResult<Option<EVoucher>> {
        Ok(self
            .working
            .evouchers
            .values()
            .find(|e| e.code == code)
            .cloned())
    }

    async fn evoucher_by_id_for_update(&mut self, id: i64) -> GameResult<Option<EVoucher>> {
        Ok(self.working.evouchers.get(id))
    }

    async fn evouchers_of_user(&mut self, user_id: i64, include_used: bool) -> GameResult<Vec<EVoucher>> {
        let mut rows: Vec<_> = self
            .working
            .evouchers
            .values()
            .filter(|e| e.user_id == user_id && (include_used || !e.is_used))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.acquired_at.cmp(&a.acquired_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn update_evoucher(&mut self, evoucher: &EVoucher) -> GameResult<()> {
        self.working
            .evouchers
            .replace(evoucher.id, evoucher.clone(), "E-voucher")
    }

    async fn insert_evoucher_token(&mut self, token: &EVoucherToken) -> GameResult<EVoucherToken> {
        Ok(self
            .working
            .evoucher_tokens
            .insert_with(|id| EVoucherToken { id, ..token.clone() }))
    }

    async fn evoucher_token_by_hash(&mut self, token_hash: &str) -> GameResult<Option<EVoucherToken>> {
        Ok(self
            .working
            .evoucher_tokens
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn revoke_evoucher_tokens(&mut self, evoucher_id: i64) -> GameResult<()> {
        for token in self.working.evoucher_tokens.rows.values_mut() {
            if token.evoucher_id == evoucher_id {
                token.revoked = true;
            }
        }
        Ok(())
    }

    async fn insert_redeem_log(&mut self, log: &EVoucherRedeemLog) -> GameResult<EVoucherRedeemLog> {
        Ok(self
            .working
            .redeem_logs
            .insert_with(|id| EVoucherRedeemLog { id, ..log.clone() }))
    }

    async fn redeem_logs(&mut self, window: Window) -> GameResult<(Vec<EVoucherRedeemLog>, i64)> {
        let mut rows: Vec<_> = self.working.redeem_logs.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(window_of(rows, window))
    }

    // -- sign-in ----------------------------------------------------------

    async fn insert_sign_in(&mut self, record: &SignInRecord) -> GameResult<SignInRecord> {
        let duplicate = self
            .working
            .sign_ins
            .values()
            .any(|r| r.user_id == record.user_id && r.sign_date == record.sign_date);
        if duplicate {
            return Err(GameError::conflict("Already signed in today"));
        }
        Ok(self
            .working
            .sign_ins
            .insert_with(|id| SignInRecord { id, ..record.clone() }))
    }

    async fn sign_in_on(&mut self, user_id: i64, day: NaiveDate) -> GameResult<Option<SignInRecord>> {
        Ok(self
            .working
            .sign_ins
            .values()
            .find(|r| r.user_id == user_id && r.sign_date == day)
            .cloned())
    }

    async fn sign_ins_since(&mut self, user_id: i64, since: NaiveDate) -> GameResult<Vec<SignInRecord>> {
        let mut rows: Vec<_> = self
            .working
            .sign_ins
            .values()
            .filter(|r| r.user_id == user_id && r.sign_date >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.sign_date.cmp(&a.sign_date));
        Ok(rows)
    }

    async fn count_sign_ins_on(&mut self, day: NaiveDate) -> GameResult<i64> {
        Ok(self
            .working
            .sign_ins
            .values()
            .filter(|r| r.sign_date == day)
            .count() as i64)
    }

    // -- pets -------------------------------------------------------------

    async fn insert_pet(&mut self, pet: &Pet) -> GameResult<Pet> {
        if self.working.pets.values().any(|p| p.user_id == pet.user_id) {
            return Err(GameError::conflict("User already has a pet"));
        }
        Ok(self.working.pets.insert_with(|id| Pet { id, ..pet.clone() }))
    }

    async fn pet_of_user_for_update(&mut self, user_id: i64) -> GameResult<Option<Pet>> {
        Ok(self
            .working
            .pets
            .values()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn update_pet(&mut self, pet: &Pet) -> GameResult<()> {
        self.working.pets.replace(pet.id, pet.clone(), "Pet")
    }

    // -- mini-game --------------------------------------------------------

    async fn insert_game(&mut self, game: &GamePlay) -> GameResult<GamePlay> {
        Ok(self.working.games.insert_with(|id| GamePlay { id, ..game.clone() }))
    }

    async fn game_by_id_for_update(&mut self, id: i64) -> GameResult<Option<GamePlay>> {
        Ok(self.working.games.get(id))
    }

    async fn update_game(&mut self, game: &GamePlay) -> GameResult<()> {
        self.working.games.replace(game.id, game.clone(), "Game")
    }

    async fn games_started_between(
        &mut self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> GameResult<Vec<GamePlay>> {
        let mut rows: Vec<_> = self
            .working
            .games
            .values()
            .filter(|g| g.user_id == user_id && g.started_at >= from && g.started_at < to)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn games_of_user(&mut self, user_id: i64, window: Window) -> GameResult<(Vec<GamePlay>, i64)> {
        let mut rows: Vec<_> = self
            .working
            .games
            .values()
            .filter(|g| g.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        Ok(window_of(rows, window))
    }

    async fn count_games_between(&mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> GameResult<i64> {
        Ok(self
            .working
            .games
            .values()
            .filter(|g| g.started_at >= from && g.started_at < to)
            .count() as i64)
    }

    // -- forum ------------------------------------------------------------

    async fn insert_forum(&mut self, forum: &Forum) -> GameResult<Forum> {
        if self.working.forums.values().any(|f| f.name == forum.name) {
            return Err(GameError::conflict("Forum name already taken"));
        }
        Ok(self.working.forums.insert_with(|id| Forum { id, ..forum.clone() }))
    }

    async fn update_forum(&mut self, forum: &Forum) -> GameResult<()> {
        self.working.forums.replace(forum.id, forum.clone(), "Forum")
    }

    async fn delete_forum(&mut self, id: i64) -> GameResult<()> {
        let t = &mut self.working;
        let thread_ids: BTreeSet<i64> = t
            .threads
            .values()
            .filter(|th| th.forum_id == id)
            .map(|th| th.id)
            .collect();
        let post_ids: BTreeSet<i64> = t
            .posts
            .values()
            .filter(|p| thread_ids.contains(&p.thread_id))
            .map(|p| p.id)
            .collect();
        t.reactions.rows.retain(|_, r| !post_ids.contains(&r.post_id));
        t.posts.rows.retain(|pid, _| !post_ids.contains(pid));
        t.threads.rows.retain(|tid, _| !thread_ids.contains(tid));
        t.forums.rows.remove(&id);
        Ok(())
    }

    async fn forum_by_id(&mut self, id: i64) -> GameResult<Option<Forum>> {
        Ok(self.working.forums.get(id))
    }

    async fn forum_by_name(&mut self, name: &str) -> GameResult<Option<Forum>> {
        Ok(self.working.forums.values().find(|f| f.name == name).cloned())
    }

    async fn list_forums(&mut self) -> GameResult<Vec<Forum>> {
        let mut rows: Vec<_> = self.working.forums.values().cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn insert_thread(&mut self, thread: &Thread) -> GameResult<Thread> {
        Ok(self.working.threads.insert_with(|id| Thread { id, ..thread.clone() }))
    }

    async fn thread_by_id_for_update(&mut self, id: i64) -> GameResult<Option<Thread>> {
        Ok(self.working.threads.get(id))
    }

    async fn update_thread(&mut self, thread: &Thread) -> GameResult<()> {
        self.working.threads.replace(thread.id, thread.clone(), "Thread")
    }

    async fn threads_in_forum(&mut self, forum_id: i64, window: Window) -> GameResult<(Vec<Thread>, i64)> {
        let mut rows: Vec<_> = self
            .working
            .threads
            .values()
            .filter(|t| t.forum_id == forum_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.is_pinned
                .cmp(&a.is_pinned)
                .then(b.updated_at.cmp(&a.updated_at))
                .then(b.id.cmp(&a.id))
        });
        Ok(window_of(rows, window))
    }

    async fn search_threads(&mut self, keyword: &str, window: Window) -> GameResult<(Vec<Thread>, i64)> {
        let needle = keyword.to_lowercase();
        let mut rows: Vec<_> = self
            .working
            .threads
            .values()
            .filter(|t| contains_ci(&t.title, &needle))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(window_of(rows, window))
    }

    async fn insert_post(&mut self, post: &Post) -> GameResult<Post> {
        Ok(self.working.posts.insert_with(|id| Post { id, ..post.clone() }))
    }

    async fn post_by_id_for_update(&mut self, id: i64) -> GameResult<Option<Post>> {
        Ok(self.working.posts.get(id))
    }

    async fn update_post(&mut self, post: &Post) -> GameResult<()> {
        self.working.posts.replace(post.id, post.clone(), "Post")
    }

    async fn posts_in_thread(&mut self, thread_id: i64, window: Window) -> GameResult<(Vec<Post>, i64)> {
        let mut rows: Vec<_> = self
            .working
            .posts
            .values()
            .filter(|p| p.thread_id == thread_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(window_of(rows, window))
    }

    async fn search_posts(&mut self, keyword: &str, window: Window) -> GameResult<(Vec<Post>, i64)> {
        let needle = keyword.to_lowercase();
        let mut rows: Vec<_> = self
            .working
            .posts
            .values()
            .filter(|p| !p.is_deleted && contains_ci(&p.content, &needle))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(window_of(rows, window))
    }

    async fn reaction_of_user(&mut self, post_id: i64, user_id: i64) -> GameResult<Option<Reaction>> {
        Ok(self
            .working
            .reactions
            .values()
            .find(|r| r.post_id == post_id && r.user_id == user_id)
            .cloned())
    }

    async fn insert_reaction(&mut self, reaction: &Reaction) -> GameResult<Reaction> {
        let duplicate = self
            .working
            .reactions
            .values()
            .any(|r| r.post_id == reaction.post_id && r.user_id == reaction.user_id);
        if duplicate {
            return Err(GameError::conflict("Already reacted to this post"));
        }
        Ok(self
            .working
            .reactions
            .insert_with(|id| Reaction { id, ..reaction.clone() }))
    }

    async fn delete_reaction(&mut self, id: i64) -> GameResult<()> {
        self.working.reactions.rows.remove(&id);
        Ok(())
    }

    async fn reactions_for_post(&mut self, post_id: i64) -> GameResult<Vec<Reaction>> {
        Ok(self
            .working
            .reactions
            .values()
            .filter(|r| r.post_id == post_id)
            .cloned()
            .collect())
    }

    // -- products & cart --------------------------------------------------

    async fn insert_product(&mut self, product: &Product) -> GameResult<Product> {
        Ok(self
            .working
            .products
            .insert_with(|id| Product { id, ..product.clone() }))
    }

    async fn product_by_id_for_update(&mut self, id: i64) -> GameResult<Option<Product>> {
        Ok(self.working.products.get(id))
    }

    async fn product_by_name(&mut self, name: &str) -> GameResult<Option<Product>> {
        Ok(self
            .working
            .products
            .values()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn update_product(&mut self, product: &Product) -> GameResult<()> {
        self.working
            .products
            .replace(product.id, product.clone(), "Product")
    }

    async fn list_products(
        &mut self,
        product_type: Option<&str>,
        window: Window,
    ) -> GameResult<(Vec<Product>, i64)> {
        let rows: Vec<_> = self
            .working
            .products
            .values()
            .filter(|p| p.is_active && product_type.map_or(true, |t| p.product_type == t))
            .cloned()
            .collect();
        Ok(window_of(rows, window))
    }

    async fn search_products(&mut self, keyword: &str, window: Window) -> GameResult<(Vec<Product>, i64)> {
        let needle = keyword.to_lowercase();
        let rows: Vec<_> = self
            .working
            .products
            .values()
            .filter(|p| {
                p.is_active
                    && (contains_ci(&p.name, &needle)
                        || p.description.as_deref().map_or(false, |d| contains_ci(d, &needle)))
            })
            .cloned()
            .collect();
        Ok(window_of(rows, window))
    }

    async fn products_by_price(&mut self, min: i64, max: i64, window: Window) -> GameResult<(Vec<Product>, i64)> {
        let mut rows: Vec<_> = self
            .working
            .products
            .values()
            .filter(|p| p.is_active && p.price >= min && p.price <= max)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.price.cmp(&b.price).then(a.id.cmp(&b.id)));
        Ok(window_of(rows, window))
    }

    async fn cart_items(&mut self, user_id: i64) -> GameResult<Vec<CartItem>> {
        Ok(self
            .working
            .cart
            .range((user_id, i64::MIN)..=(user_id, i64::MAX))
            .map(|(_, item)| item.clone())
            .collect())
    }

    async fn upsert_cart_item(&mut self, item: &CartItem) -> GameResult<()> {
        self.working
            .cart
            .insert((item.user_id, item.product_id), item.clone());
        Ok(())
    }

    async fn delete_cart_item(&mut self, user_id: i64, product_id: i64) -> GameResult<bool> {
        Ok(self.working.cart.remove(&(user_id, product_id)).is_some())
    }

    async fn clear_cart(&mut self, user_id: i64) -> GameResult<()> {
        self.working.cart.retain(|(uid, _), _| *uid != user_id);
        Ok(())
    }

    // -- orders -----------------------------------------------------------

    async fn insert_order(&mut self, order: &Order) -> GameResult<Order> {
        Ok(self.working.orders.insert_with(|id| Order { id, ..order.clone() }))
    }

    async fn order_by_id_for_update(&mut self, id: i64) -> GameResult<Option<Order>> {
        Ok(self.working.orders.get(id))
    }

    async fn update_order(&mut self, order: &Order) -> GameResult<()> {
        self.working.orders.replace(order.id, order.clone(), "Order")
    }

    async fn orders_of_user(&mut self, user_id: i64, window: Window) -> GameResult<(Vec<Order>, i64)> {
        let mut rows: Vec<_> = self
            .working
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(window_of(rows, window))
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> GameResult<OrderItem> {
        Ok(self
            .working
            .order_items
            .insert_with(|id| OrderItem { id, ..item.clone() }))
    }

    async fn order_items(&mut self, order_id: i64) -> GameResult<Vec<OrderItem>> {
        Ok(self
            .working
            .order_items
            .values()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn count_orders_by_status(&mut self) -> GameResult<Vec<(OrderStatus, i64)>> {
        let mut counts: BTreeMap<&'static str, (OrderStatus, i64)> = BTreeMap::new();
        for order in self.working.orders.values() {
            counts.entry(order.status.as_str()).or_insert((order.status, 0)).1 += 1;
        }
        Ok(counts.into_values().collect())
    }

    // -- notifications ----------------------------------------------------

    async fn insert_notification(&mut self, notification: &Notification) -> GameResult<Notification> {
        Ok(self
            .working
            .notifications
            .insert_with(|id| Notification { id, ..notification.clone() }))
    }

    async fn notification_by_id(&mut self, id: i64) -> GameResult<Option<Notification>> {
        Ok(self.working.notifications.get(id))
    }

    async fn update_notification(&mut self, notification: &Notification) -> GameResult<()> {
        self.working
            .notifications
            .replace(notification.id, notification.clone(), "Notification")
    }

    async fn notifications_of_user(
        &mut self,
        user_id: i64,
        unread_only: bool,
        window: Window,
    ) -> GameResult<(Vec<Notification>, i64)> {
        let mut rows: Vec<_> = self
            .working
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(window_of(rows, window))
    }

    async fn count_unread_notifications(&mut self, user_id: i64) -> GameResult<i64> {
        Ok(self
            .working
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count() as i64)
    }

    async fn mark_all_notifications_read(&mut self, user_id: i64, at: DateTime<Utc>) -> GameResult<i64> {
        let mut changed = 0;
        for n in self.working.notifications.rows.values_mut() {
            if n.user_id == user_id && !n.is_read {
                n.is_read = true;
                n.read_at = Some(at);
                changed += 1;
            }
        }
        Ok(changed)
    }
}
