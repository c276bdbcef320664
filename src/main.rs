use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod auth;
mod config;
mod db;
mod dto;
mod error;
mod extract;
mod handlers;
mod models;
mod services;

use auth::rate_limit::{RateLimitPolicy, RateLimitState};
use config::{Config, StorageBackend};
use db::{MemoryStore, PgStore, Store};
use services::{EventBus, PointsLedger, ProfileService};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<Config>,
    pub ledger: PointsLedger,
    pub profiles: ProfileService,
    pub events: EventBus,
    pub rate_limiter: RateLimitState,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: Arc<Config>) -> Self {
        let events = EventBus::default();
        Self {
            ledger: PointsLedger::new(store.clone(), events.clone(), config.awards()),
            profiles: ProfileService::new(store.clone()),
            rate_limiter: RateLimitState::new(RateLimitPolicy::default()),
            events,
            store,
            config,
        }
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let mut origins: Vec<HeaderValue> = Vec::new();
    match config.frontend_url.parse::<HeaderValue>() {
        Ok(origin) => origins.push(origin),
        Err(_) => tracing::warn!(frontend_url = %config.frontend_url, "FRONTEND_URL is not a valid origin"),
    }
    // Extra origins for LAN testing from other devices.
    if let Ok(extra) = std::env::var("CORS_EXTRA_ORIGINS") {
        origins.extend(
            extra
                .split(',')
                .filter_map(|o| o.trim().parse::<HeaderValue>().ok()),
        );
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

pub fn app(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::rate_limit::rate_limit_auth,
        ));

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .route("/api/auth/session", get(handlers::auth::session))
        .route("/ws", get(handlers::ws::ws_handler))
        .merge(auth_routes);

    let protected_routes = Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        // Profile & preferences
        .route(
            "/api/me",
            get(handlers::profile::get_me).put(handlers::profile::update_me),
        )
        .route("/api/me/provision", post(handlers::profile::provision))
        .route(
            "/api/me/preferences",
            get(handlers::profile::get_preferences).put(handlers::profile::update_preferences),
        )
        // Brain Bucks
        .route("/api/brain-bucks", get(handlers::brain_bucks::get_balance))
        .route("/api/brain-bucks/ledger", get(handlers::brain_bucks::list_ledger))
        .route("/api/brain-bucks/audit", get(handlers::brain_bucks::audit))
        // Critical Compass
        .route(
            "/api/tasks",
            get(handlers::tasks::list_tasks).post(handlers::tasks::create_task),
        )
        .route("/api/tasks/:id", get(handlers::tasks::get_task))
        .route("/api/tasks/:id/complete", post(handlers::tasks::complete_task))
        // Memory Map
        .route(
            "/api/memories",
            get(handlers::memories::list_memories).post(handlers::memories::create_memory),
        )
        // Rewards Vault
        .route(
            "/api/rewards",
            get(handlers::rewards::list_rewards).post(handlers::rewards::create_reward),
        )
        .route(
            "/api/rewards/suggestions",
            get(handlers::rewards::list_suggestions),
        )
        .route(
            "/api/rewards/suggestions/:slug",
            post(handlers::rewards::create_from_suggestion),
        )
        .route("/api/rewards/:id/redeem", post(handlers::rewards::redeem_reward))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors_layer(&state.config))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    match config.storage_backend {
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set when STORAGE_BACKEND=postgres")?;
            let pool = db::create_pool(url)
                .await
                .context("Failed to connect to database")?;
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Database migrations applied");
            Ok(Arc::new(PgStore::new(pool)))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rememory_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Arc::new(Config::from_env());
    let store = open_store(&config).await?;

    let state = AppState::new(store, config.clone());
    state.rate_limiter.spawn_cleanup_worker();

    let addr = config.listen_addr();
    tracing::info!(
        addr = %addr,
        backend = ?config.storage_backend,
        "Starting server"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    // Connect info feeds the per-IP rate limiter.
    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::connect_info::MockConnectInfo,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_app() -> Router {
        let config = Arc::new(Config::for_tests());
        let state = AppState::new(Arc::new(MemoryStore::new()), config);
        app(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))))
    }

    async fn send(
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
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Registers a fresh account and returns `(access_token, refresh_token)`.
    async fn register(app: &Router, email: &str) -> (String, String) {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "email": email,
                "password": "correct-horse-battery",
                "name": "Sam",
                "neurotype_tags": ["ADHD"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "register failed: {body}");
        (
            body["access_token"].as_str().unwrap().to_string(),
            body["refresh_token"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "rememory-api");

        let (status, _) = send(&app, Method::GET, "/readyz", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let app = test_app();
        let (status, body) = send(&app, Method::GET, "/api/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["kind"], "authentication_error");
    }

    #[tokio::test]
    async fn test_register_provisions_profile_and_preferences() {
        let app = test_app();
        let (token, _) = register(&app, "sam@example.com").await;

        let (status, me) = send(&app, Method::GET, "/api/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["name"], "Sam");
        assert_eq!(me["brain_bucks_balance"], 0);
        assert_eq!(me["neurotype_tags"], json!(["ADHD"]));

        let (status, prefs) = send(&app, Method::GET, "/api/me/preferences", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(prefs["animations_enabled"], true);
        assert_eq!(prefs["theme_mode"], "light");

        let (status, again) = send(&app, Method::POST, "/api/me/provision", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again["created"], false);
        assert_eq!(again["profile"]["id"], me["id"]);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let app = test_app();
        register(&app, "dup@example.com").await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "email": "DUP@example.com", "password": "another-password" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["kind"], "conflict");
    }

    #[tokio::test]
    async fn test_login_with_wrong_password() {
        let app = test_app();
        register(&app, "lee@example.com").await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "lee@example.com", "password": "nope-nope-nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "Invalid email or password");
    }

    #[tokio::test]
    async fn test_task_completion_flow() {
        let app = test_app();
        let (token, _) = register(&app, "tasks@example.com").await;

        let (status, task) = send(
            &app,
            Method::POST,
            "/api/tasks",
            Some(&token),
            Some(json!({ "title": "  Pay bill ", "priority_level": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(task["title"], "Pay bill");
        let uri = format!("/api/tasks/{}/complete", task["id"].as_str().unwrap());

        let (status, done) = send(&app, Method::POST, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(done["task"]["is_completed"], true);
        assert_eq!(done["awarded"], 5);
        assert_eq!(done["balance"], 5);

        let (_, again) = send(&app, Method::POST, &uri, Some(&token), None).await;
        assert_eq!(again["awarded"], 0);
        assert_eq!(again["balance"], 5);

        let (_, ledger) = send(&app, Method::GET, "/api/brain-bucks/ledger", Some(&token), None).await;
        let entries = ledger["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["action_type"], "task_completed");
        assert_eq!(entries[0]["amount"], 5);

        let (_, audit) = send(&app, Method::GET, "/api/brain-bucks/audit", Some(&token), None).await;
        assert_eq!(audit["consistent"], true);
    }

    #[tokio::test]
    async fn test_task_validation() {
        let app = test_app();
        let (token, _) = register(&app, "invalid@example.com").await;

        for body in [
            json!({ "title": "Walk", "priority_level": 9 }),
            json!({ "title": "   " }),
        ] {
            let (status, resp) = send(&app, Method::POST, "/api/tasks", Some(&token), Some(body)).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(resp["error"]["kind"], "validation_error");
        }
    }

    #[tokio::test]
    async fn test_malformed_requests_use_error_envelope() {
        let app = test_app();
        let (token, _) = register(&app, "malformed@example.com").await;

        let cases = [
            (
                Method::POST,
                "/api/rewards",
                Some(json!({ "title": "Nap", "cost": 10, "category": "bogus" })),
            ),
            (Method::GET, "/api/tasks/not-a-uuid", None),
            (Method::POST, "/api/rewards/not-a-uuid/redeem", None),
            (Method::GET, "/api/tasks?scope=someday", None),
            (
                Method::POST,
                "/api/me/provision",
                Some(json!({ "neurotype_tags": "ADHD" })),
            ),
        ];
        for (method, uri, body) in cases {
            let (status, resp) = send(&app, method, uri, Some(&token), body).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{uri}: {resp}");
            assert_eq!(resp["error"]["kind"], "validation_error", "{uri}");
            assert!(resp["error"]["message"].as_str().is_some());
        }
    }

    #[tokio::test]
    async fn test_today_scope_caps_list() {
        let app = test_app();
        let (token, _) = register(&app, "compass@example.com").await;
        for priority in 1..=5 {
            send(
                &app,
                Method::POST,
                "/api/tasks",
                Some(&token),
                Some(json!({ "title": format!("Task {priority}"), "priority_level": priority })),
            )
            .await;
        }

        let (_, today) = send(&app, Method::GET, "/api/tasks", Some(&token), None).await;
        let today = today.as_array().unwrap();
        assert_eq!(today.len(), 3);
        assert_eq!(today[0]["priority_level"], 5);

        let (_, all) = send(&app, Method::GET, "/api/tasks?scope=all", Some(&token), None).await;
        assert_eq!(all.as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_redemption_requires_funds() {
        let app = test_app();
        let (token, _) = register(&app, "vault@example.com").await;

        let (status, reward) = send(
            &app,
            Method::POST,
            "/api/rewards/suggestions/swap-a-chore",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(reward["cost"], 30);
        let uri = format!("/api/rewards/{}/redeem", reward["id"].as_str().unwrap());

        let (status, body) = send(&app, Method::POST, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["kind"], "insufficient_funds");
        assert_eq!(body["error"]["balance"], 0);
        assert_eq!(body["error"]["required"], 30);

        let (_, rewards) = send(&app, Method::GET, "/api/rewards", Some(&token), None).await;
        assert_eq!(rewards[0]["is_redeemed"], false);
    }

    #[tokio::test]
    async fn test_memory_logging_earns_points() {
        let app = test_app();
        let (token, _) = register(&app, "memories@example.com").await;

        let (status, logged) = send(
            &app,
            Method::POST,
            "/api/memories",
            Some(&token),
            Some(json!({
                "title": "Pancakes",
                "memory_type": "meal",
                "tags": ["breakfast", " breakfast", ""]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(logged["awarded"], 5);
        assert_eq!(logged["memory"]["tags"], json!(["breakfast"]));

        let (_, meals) = send(&app, Method::GET, "/api/memories?memory_type=meal", Some(&token), None).await;
        assert_eq!(meals.as_array().unwrap().len(), 1);
        let (_, anchors) = send(&app, Method::GET, "/api/memories?memory_type=anchor", Some(&token), None).await;
        assert!(anchors.as_array().unwrap().is_empty());

        let (_, balance) = send(&app, Method::GET, "/api/brain-bucks", Some(&token), None).await;
        assert_eq!(balance["balance"], 5);
    }

    #[tokio::test]
    async fn test_session_states() {
        let app = test_app();
        let (_, anon) = send(&app, Method::GET, "/api/auth/session", None, None).await;
        assert_eq!(anon["state"], "unauthenticated");
        assert!(anon["identity"].is_null());

        let (token, _) = register(&app, "session@example.com").await;
        let (_, ready) = send(&app, Method::GET, "/api/auth/session", Some(&token), None).await;
        assert_eq!(ready["state"], "ready");
        assert_eq!(ready["identity"]["email"], "session@example.com");
        assert_eq!(ready["profile"]["name"], "Sam");
    }

    #[tokio::test]
    async fn test_refresh_rotation_detects_reuse() {
        let app = test_app();
        let (_, refresh_token) = register(&app, "rotate@example.com").await;

        let (status, rotated) = send(
            &app,
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh_token })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let next_refresh = rotated["refresh_token"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh_token })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Reuse revoked the whole family, including the newest token.
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({ "refresh_token": next_refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_is_rate_limited() {
        let app = test_app();
        let body = json!({ "email": "nobody@example.com", "password": "whatever" });
        for _ in 0..RateLimitPolicy::default().max_requests {
            let (status, _) = send(&app, Method::POST, "/api/auth/login", None, Some(body.clone())).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        let (status, body) = send(&app, Method::POST, "/api/auth/login", None, Some(body)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["kind"], "rate_limited");
    }
}
