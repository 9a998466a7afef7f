// Common test utilities and helpers for all test modules

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use gamespace::api::{create_router, AppState};
use gamespace::auth::audit_logger::AuditLogger;
use gamespace::config::Config;
use gamespace::core::clock::ManualClock;
use gamespace::core::models::*;
use gamespace::services::accounts::{AuthTokens, Registration};
use gamespace::services::ledger::Entry;
use gamespace::store::{MemoryStore, Store, StoreTx};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const PASSWORD: &str = "correct-horse-battery";

/// Monday 2024-03-04 09:00 UTC
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
}

/// Application over the in-memory store with a hand-driven clock
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let state = AppState::new(
            config,
            store.clone(),
            clock.clone(),
            Arc::new(AuditLogger::new(None)),
        )
        .unwrap();
        Self { state, store, clock }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    pub async fn register(&self, account: &str) -> AuthTokens {
        self.state
            .accounts
            .register(Registration {
                account,
                email: &format!("{}@example.com", account),
                nickname: account,
                password: PASSWORD,
            })
            .await
            .unwrap()
    }

    pub async fn register_id(&self, account: &str) -> i64 {
        self.register(account).await.user.id
    }

    /// Give `user_id` a fresh role holding `permissions`
    pub async fn grant(&self, user_id: i64, permissions: &[Permission]) {
        let mut tx = self.store.begin().await.unwrap();
        let role = tx
            .insert_role(&Role {
                id: 0,
                name: format!("role-for-{}", user_id),
                permissions: permissions.to_vec(),
            })
            .await
            .unwrap();
        tx.assign_role(user_id, role.id).await.unwrap();
        tx.commit().await.unwrap();
    }

    pub async fn fund(&self, user_id: i64, points: i64) {
        self.state
            .wallet
            .credit(user_id, points, Entry::new(ChangeType::Point, "Test funding"))
            .await
            .unwrap();
    }

    pub async fn balance(&self, user_id: i64) -> i64 {
        self.state.wallet.get_wallet(user_id).await.unwrap().points
    }

    pub async fn product(&self, name: &str, price: i64, stock: Option<i64>) -> Product {
        let mut tx = self.store.begin().await.unwrap();
        let product = tx
            .insert_product(&Product {
                id: 0,
                name: name.to_string(),
                product_type: "toy".to_string(),
                description: None,
                price,
                stock,
                is_active: true,
                created_at: start_time(),
                updated_at: start_time(),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        product
    }

    pub async fn forum(&self, name: &str) -> Forum {
        let mut tx = self.store.begin().await.unwrap();
        let forum = tx
            .insert_forum(&Forum {
                id: 0,
                name: name.to_string(),
                description: None,
                created_at: start_time(),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        forum
    }

    pub async fn emails_to(&self, email: &str) -> Vec<QueuedEmail> {
        let mut tx = self.store.begin().await.unwrap();
        tx.emails_to(email).await.unwrap()
    }
}

/// Send one request through the router and decode the JSON body
pub async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, value)
}
