// Axum web server layer

use axum::{
    error_handling::HandleErrorLayer,
    http::{header, HeaderName, HeaderValue, StatusCode},
    routing::{get, post, put},
    BoxError, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

pub mod handlers;
pub mod middleware;
pub mod responses;

use crate::auth::audit_logger::AuditLogger;
use crate::core::clock::Clock;
use crate::core::errors::GameResult;
use crate::metrics::Metrics;
use crate::services::{
    AccountService, AdminService, ForumService, MiniGameService, NotificationService, PetService,
    RbacService, ServiceContext, ShopService, SignInService, WalletService,
};
use crate::state::cache::ReadCache;
use crate::store::Store;

pub use crate::config::Config;

/// Application state containing all shared dependencies
///
/// Services are wrapped in Arc so cloning the state per request is cheap.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub metrics: Arc<Metrics>,
    pub accounts: Arc<AccountService>,
    pub rbac: Arc<RbacService>,
    pub wallet: Arc<WalletService>,
    pub signin: Arc<SignInService>,
    pub pets: Arc<PetService>,
    pub games: Arc<MiniGameService>,
    pub forum: Arc<ForumService>,
    pub shop: Arc<ShopService>,
    pub notifications: Arc<NotificationService>,
    pub admin: Arc<AdminService>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        audit: Arc<AuditLogger>,
    ) -> GameResult<Self> {
        let metrics = Arc::new(Metrics::new()?);
        let cache = Arc::new(ReadCache::new(config.cache_ttl_secs));
        let ctx = ServiceContext::new(Arc::clone(&store), clock, Arc::clone(&metrics));

        Ok(Self {
            accounts: Arc::new(AccountService::new(ctx.clone(), &config, audit)?),
            rbac: Arc::new(RbacService::new(ctx.clone())),
            wallet: Arc::new(WalletService::new(ctx.clone(), Arc::clone(&cache))),
            signin: Arc::new(SignInService::new(ctx.clone())),
            pets: Arc::new(PetService::new(ctx.clone())),
            games: Arc::new(MiniGameService::new(ctx.clone())),
            forum: Arc::new(ForumService::new(ctx.clone())),
            shop: Arc::new(ShopService::new(ctx.clone(), cache)),
            notifications: Arc::new(NotificationService::new(ctx.clone())),
            admin: Arc::new(AdminService::new(ctx)),
            config: Arc::new(config),
            store,
            metrics,
        })
    }
}

fn public_routes() -> Router<AppState> {
    use handlers::*;

    Router::new()
        .route("/health", get(system::health))
        .route("/metrics", get(system::metrics))
        .route("/v1/auth/register", post(auth::register))
        .route("/v1/auth/login", post(auth::login))
        .route("/v1/auth/refresh", post(auth::refresh))
        .route("/v1/auth/logout", post(auth::logout))
        .route("/v1/auth/password/forgot", post(auth::forgot_password))
        .route("/v1/auth/password/reset", post(auth::reset_password))
        .route("/v1/leaderboard", get(wallet::leaderboard))
        .route("/v1/catalogue/coupon-types", get(wallet::coupon_catalogue))
        .route("/v1/catalogue/evoucher-types", get(wallet::evoucher_catalogue))
        .route("/v1/products", get(shop::list_products))
        .route("/v1/products/search", get(shop::search_products))
        .route("/v1/products/:id", get(shop::get_product))
}

fn member_routes() -> Router<AppState> {
    use handlers::*;

    Router::new()
        // account
        .route("/v1/me", get(auth::me).put(auth::update_me))
        .route("/v1/me/roles", get(auth::my_roles))
        .route("/v1/me/password", post(auth::change_password))
        .route("/v1/me/confirm-email", post(auth::confirm_email))
        // wallet
        .route("/v1/wallet", get(wallet::get_wallet))
        .route("/v1/wallet/history", get(wallet::history))
        .route("/v1/wallet/transfer", post(wallet::transfer))
        .route("/v1/wallet/coupons", get(wallet::coupons))
        .route("/v1/wallet/coupons/redeem", post(wallet::redeem_coupon))
        .route("/v1/wallet/evouchers", get(wallet::evouchers))
        .route("/v1/wallet/evouchers/redeem", post(wallet::redeem_evoucher))
        .route("/v1/wallet/evouchers/:code/use", post(wallet::use_evoucher))
        .route("/v1/wallet/evouchers/:code/token", post(wallet::evoucher_token))
        // sign-in
        .route("/v1/signin", post(signin::sign_in))
        .route("/v1/signin/status", get(signin::status))
        .route("/v1/signin/history", get(signin::history))
        .route("/v1/signin/calendar", get(signin::calendar))
        // pet
        .route("/v1/pet", get(pet::get_pet).post(pet::create_pet))
        .route("/v1/pet/feed", post(pet::feed))
        .route("/v1/pet/play", post(pet::play))
        .route("/v1/pet/bathe", post(pet::bathe))
        .route("/v1/pet/rest", post(pet::rest))
        .route("/v1/pet/skin", put(pet::skin))
        .route("/v1/pet/background", put(pet::background))
        .route("/v1/pet/rename", put(pet::rename))
        // mini-game
        .route("/v1/games", get(games::history))
        .route("/v1/games/start", post(games::start))
        .route("/v1/games/remaining", get(games::remaining))
        .route("/v1/games/stats", get(games::stats))
        .route("/v1/games/:id/finish", post(games::finish))
        .route("/v1/games/:id/abort", post(games::abort))
        // forum
        .route("/v1/forums", get(forum::list_forums))
        .route("/v1/forums/:id", get(forum::get_forum))
        .route(
            "/v1/forums/:id/threads",
            get(forum::list_threads).post(forum::create_thread),
        )
        .route("/v1/threads/:id", get(forum::get_thread))
        .route(
            "/v1/threads/:id/posts",
            get(forum::list_posts).post(forum::reply),
        )
        .route(
            "/v1/posts/:id",
            put(forum::edit_post).delete(forum::delete_post),
        )
        .route(
            "/v1/posts/:id/reactions",
            get(forum::list_reactions)
                .post(forum::add_reaction)
                .delete(forum::remove_reaction),
        )
        .route("/v1/search/posts", get(forum::search_posts))
        .route("/v1/search/threads", get(forum::search_threads))
        // store
        .route("/v1/cart", get(shop::view_cart).delete(shop::clear_cart))
        .route("/v1/cart/items", post(shop::add_to_cart))
        .route(
            "/v1/cart/items/:product_id",
            put(shop::update_cart_item).delete(shop::remove_from_cart),
        )
        .route("/v1/checkout", post(shop::checkout))
        .route("/v1/orders", get(shop::list_orders))
        .route("/v1/orders/:id", get(shop::get_order))
        .route("/v1/orders/:id/cancel", post(shop::cancel_order))
        // notifications
        .route("/v1/notifications", get(notifications::list))
        .route("/v1/notifications/unread-count", get(notifications::unread_count))
        .route("/v1/notifications/read-all", post(notifications::mark_all_read))
        .route("/v1/notifications/:id/read", post(notifications::mark_read))
}

fn admin_routes() -> Router<AppState> {
    use handlers::admin::*;

    Router::new()
        .route("/v1/admin/dashboard", get(dashboard))
        .route("/v1/admin/users", get(list_users))
        .route("/v1/admin/users/:id/lock", post(lock_user))
        .route("/v1/admin/users/:id/unlock", post(unlock_user))
        .route("/v1/admin/users/:id/rights", put(set_rights))
        .route("/v1/admin/users/:id/points", post(adjust_points))
        .route("/v1/admin/users/:id/roles/:role_id", post(assign_role).delete(revoke_role))
        .route("/v1/admin/roles", get(list_roles).post(create_role))
        .route("/v1/admin/roles/:id", put(update_role))
        .route("/v1/admin/coupon-types", get(list_coupon_types).post(create_coupon_type))
        .route("/v1/admin/coupon-types/:id", put(update_coupon_type))
        .route("/v1/admin/evoucher-types", get(list_evoucher_types).post(create_evoucher_type))
        .route("/v1/admin/evoucher-types/:id", put(update_evoucher_type))
        .route("/v1/admin/evouchers/scan", post(scan_evoucher))
        .route("/v1/admin/evouchers/redeem-logs", get(redeem_logs))
        .route("/v1/admin/products", post(create_product))
        .route("/v1/admin/products/:id", put(update_product).delete(delete_product))
        .route("/v1/admin/products/:id/stock", put(set_stock))
        .route("/v1/admin/orders/:id/status", put(set_order_status))
        .route("/v1/admin/pets/:user_id", get(view_pet))
        .route("/v1/admin/pets/:user_id/reset", post(reset_pet))
        .route("/v1/admin/notifications", post(send_notification))
        .route("/v1/admin/forums", post(create_forum))
        .route("/v1/admin/forums/:id", put(update_forum).delete(delete_forum))
        .route("/v1/admin/threads/:id/pin", put(pin_thread))
        .route("/v1/admin/threads/:id/lock", put(lock_thread))
}

/// Create the Axum router with all routes and middleware
///
/// Middleware stack (outermost to innermost):
/// - Request id (tower-http) - `x-request-id` set on the request and echoed back
/// - Tracing (tower-http::trace)
/// - Security headers
/// - Request context - request id in error bodies, status metrics
/// - Rate limiting (tower_governor) - per client IP, when configured
/// - Body size limit (tower-http::limit)
/// - Request timeout (tower::timeout)
/// - Auth middleware - bearer token validation (member and admin routes only)
pub fn create_router(app_state: AppState) -> Router {
    let config = Arc::clone(&app_state.config);

    let protected = member_routes()
        .merge(admin_routes())
        .route_layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            crate::auth::auth_middleware::auth_middleware,
        ));

    let mut router = public_routes().merge(protected);

    router = router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(|e: BoxError| async move {
                let status = if e.is::<tower::timeout::error::Elapsed>() {
                    StatusCode::REQUEST_TIMEOUT
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                responses::ApiError::new(status, status.canonical_reason().unwrap_or("Error"))
            }))
            .timeout(Duration::from_secs(config.request_timeout_secs)),
    );
    router = router.layer(RequestBodyLimitLayer::new(config.body_size_limit_bytes));

    if config.rate_limiting_enabled() {
        let governor = GovernorConfigBuilder::default()
            .per_second(config.rate_limit_per_second)
            .burst_size(config.rate_limit_burst)
            .key_extractor(SmartIpKeyExtractor)
            .finish();
        match governor {
            Some(governor) => {
                router = router.layer(GovernorLayer {
                    config: Arc::new(governor),
                });
            }
            None => tracing::warn!("Invalid rate-limit config; rate limiting disabled"),
        }
    }

    let x_request_id = HeaderName::from_static("x-request-id");
    router
        .layer(axum::middleware::from_fn_with_state(
            app_state.clone(),
            middleware::request_context,
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .with_state(app_state)
}
