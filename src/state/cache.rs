// Moka read cache for hot public listings

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

use crate::core::models::{LeaderboardEntry, Product};

const LEADERBOARD_CAPACITY: u64 = 128;
const PRODUCT_CAPACITY: u64 = 10_000;

/// In-memory cache for the points leaderboard and product lookups.
///
/// Leaderboard entries expire by TTL only. Product entries are also
/// invalidated by every product write.
#[derive(Clone)]
pub struct ReadCache {
    leaderboard: Cache<u32, Arc<Vec<LeaderboardEntry>>>,
    products: Cache<i64, Arc<Product>>,
}

impl ReadCache {
    /// * `ttl_secs` - Time-to-live for every entry
    pub fn new(ttl_secs: u64) -> Self {
        let ttl = Duration::from_secs(ttl_secs);
        Self {
            leaderboard: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(LEADERBOARD_CAPACITY)
                .build(),
            products: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(PRODUCT_CAPACITY)
                .build(),
        }
    }

    pub async fn leaderboard(&self, limit: u32) -> Option<Arc<Vec<LeaderboardEntry>>> {
        self.leaderboard.get(&limit).await
    }

    pub async fn put_leaderboard(&self, limit: u32, entries: Arc<Vec<LeaderboardEntry>>) {
        self.leaderboard.insert(limit, entries).await;
    }

    pub async fn product(&self, id: i64) -> Option<Arc<Product>> {
        self.products.get(&id).await
    }

    pub async fn put_product(&self, product: Arc<Product>) {
        self.products.insert(product.id, product).await;
    }

    pub async fn invalidate_product(&self, id: i64) {
        self.products.invalidate(&id).await;
    }
}
