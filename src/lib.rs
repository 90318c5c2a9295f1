use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    middleware::{from_fn, Next},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod market;
pub mod points;
pub mod routes;

use db::DbPool;
use points::PointsLedger;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub points: PointsLedger,
    pub http: reqwest::Client,
    pub geocoder_url: String,
}

impl AppState {
    pub fn new(db: DbPool, geocoder_url: impl Into<String>) -> Self {
        Self {
            db,
            points: PointsLedger::new(),
            http: reqwest::Client::new(),
            geocoder_url: geocoder_url.into(),
        }
    }
}

/// API and auth routes. Transport concerns (CORS, rate limiting, security
/// headers, static files) are layered on in `main`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/donations",
            get(routes::donations::list_donations).post(routes::donations::create_donation),
        )
        .route("/api/donations/available", get(routes::donations::list_available))
        .route("/api/donations/claimed", get(routes::donations::list_claimed))
        .route("/api/donations/recent", get(routes::donations::list_recent))
        .route("/api/donations/mine", get(routes::donations::list_mine))
        .route("/api/donations/{id}", get(routes::donations::get_donation))
        .route("/api/donations/{id}/claim", post(routes::donations::claim_donation))
        .route("/api/donations/{id}/deliver", post(routes::donations::deliver_donation))
        .route("/api/activities", get(routes::activities::list_activities))
        .route("/api/points", get(routes::rewards::get_points))
        .route("/api/rewards", get(routes::rewards::list_rewards))
        .route("/api/rewards/{id}/redeem", post(routes::rewards::redeem_reward))
        .route("/api/dashboard/donor", get(routes::dashboard::donor_dashboard))
        .route("/api/dashboard/partner", get(routes::dashboard::partner_dashboard))
        .route("/api/geocode/search", get(routes::geocode::search))
        .route("/api/geocode/reverse", get(routes::geocode::reverse))
        .route("/api/me", get(auth::me))
        .route("/api/me/role", put(auth::update_role))
        .route("/auth/login/{provider}", get(auth::login))
        .route("/auth/callback/{provider}", get(auth::callback))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/dev/login", post(auth::dev_login))
        .layer(from_fn(require_auth))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn require_auth(req: Request<Body>, next: Next) -> impl IntoResponse {
    // Only API endpoints are guarded; auth and static routes stay open.
    let path = req.uri().path();
    if req.method() == Method::OPTIONS || !path.starts_with("/api/") {
        return next.run(req).await;
    }

    if let Some(token) = auth::extract_token_from_headers(req.headers()) {
        if auth::validate_token_str(&token).is_ok() {
            return next.run(req).await;
        }
    }

    (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
}

/// Per-peer-IP rate limiting: one request replenished every `per_second`
/// seconds, up to `burst` in flight. Needs `ConnectInfo<SocketAddr>` at
/// serve time.
pub fn with_rate_limit(app: Router, per_second: u64, burst: u32) -> anyhow::Result<Router> {
    let config = GovernorConfigBuilder::default()
        .per_second(per_second)
        .burst_size(burst)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration"))?;
    Ok(app.layer(GovernorLayer { config: Arc::new(config) }))
}

/// Periodically moves overdue `available` listings to `expired`.
pub fn spawn_expiry_sweep(pool: DbPool, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let now = chrono::Local::now().naive_local();
            match db::expire_overdue(&pool, now).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Expired {} overdue donations", n),
                Err(e) => tracing::error!("Expiry sweep failed: {}", e),
            }
        }
    })
}
