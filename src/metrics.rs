// Prometheus counters exposed at /metrics

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::core::errors::{GameError, GameResult};

fn metric_err(e: prometheus::Error) -> GameError {
    GameError::Configuration(format!("metrics: {}", e))
}

/// Process-wide counters. Each instance owns its registry, so several
/// application states can coexist in one process.
pub struct Metrics {
    registry: Registry,
    pub http_requests: IntCounterVec,
    pub points_credited: IntCounter,
    pub points_debited: IntCounter,
    pub sign_ins: IntCounter,
    pub games_finished: IntCounterVec,
    pub orders_placed: IntCounter,
    pub coupons_issued: IntCounter,
}

impl Metrics {
    pub fn new() -> GameResult<Self> {
        let registry = Registry::new();

        let http_requests = IntCounterVec::new(
            Opts::new("gamespace_http_requests_total", "HTTP responses by status class"),
            &["status"],
        )
        .map_err(metric_err)?;
        let points_credited = IntCounter::new(
            "gamespace_points_credited_total",
            "Points added to wallets",
        )
        .map_err(metric_err)?;
        let points_debited = IntCounter::new(
            "gamespace_points_debited_total",
            "Points removed from wallets",
        )
        .map_err(metric_err)?;
        let sign_ins = IntCounter::new("gamespace_sign_ins_total", "Daily sign-ins")
            .map_err(metric_err)?;
        let games_finished = IntCounterVec::new(
            Opts::new("gamespace_games_finished_total", "Mini-games finished by outcome"),
            &["outcome"],
        )
        .map_err(metric_err)?;
        let orders_placed = IntCounter::new("gamespace_orders_placed_total", "Orders checked out")
            .map_err(metric_err)?;
        let coupons_issued = IntCounter::new("gamespace_coupons_issued_total", "Coupons issued")
            .map_err(metric_err)?;

        registry.register(Box::new(http_requests.clone())).map_err(metric_err)?;
        registry.register(Box::new(points_credited.clone())).map_err(metric_err)?;
        registry.register(Box::new(points_debited.clone())).map_err(metric_err)?;
        registry.register(Box::new(sign_ins.clone())).map_err(metric_err)?;
        registry.register(Box::new(games_finished.clone())).map_err(metric_err)?;
        registry.register(Box::new(orders_placed.clone())).map_err(metric_err)?;
        registry.register(Box::new(coupons_issued.clone())).map_err(metric_err)?;

        Ok(Self {
            registry,
            http_requests,
            points_credited,
            points_debited,
            sign_ins,
            games_finished,
            orders_placed,
            coupons_issued,
        })
    }

    /// Record one HTTP response, labelled by status class ("2xx", "4xx", ...)
    pub fn observe_status(&self, status: u16) {
        let class = match status {
            100..=199 => "1xx",
            200..=299 => "2xx",
            300..=399 => "3xx",
            400..=499 => "4xx",
            _ => "5xx",
        };
        self.http_requests.with_label_values(&[class]).inc();
    }

    /// Prometheus text exposition format
    pub fn render(&self) -> GameResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metric_err)?;
        String::from_utf8(buffer).map_err(|e| GameError::Configuration(e.to_string()))
    }
}
