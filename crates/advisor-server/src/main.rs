//! Bond advisor HTTP Server
//!
//! Axum-based server providing the dashboard's REST API and the WebSocket
//! endpoint that streams advisor replies.

mod handlers;
mod state;

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use advisor_core::{AgentError, GenerationOptions, LlmProvider};
use advisor_runtime::ChatCompletionsProvider;
use bond_advisor::{market::DEFAULT_SEED, BondAdvisor, SimulatedMarket};

use crate::handlers::{
    chat_handler, chat_stream_handler, clear_messages, create_session, delete_session, get_session,
    health_check, instruments, list_models, market, set_risk_profile,
};
use crate::state::{spawn_session_sweeper, AppState};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Settings read at startup
#[derive(Debug)]
struct Settings {
    bind_addr: String,
    static_dir: String,
    market_seed: u64,
    session_idle: TimeDelta,
}

impl Settings {
    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            static_dir: lookup("STATIC_DIR").unwrap_or_else(|| "static".into()),
            market_seed: parse_or("MARKET_SEED", lookup("MARKET_SEED"), DEFAULT_SEED),
            session_idle: TimeDelta::seconds(i64::from(parse_or(
                "SESSION_IDLE_SECS",
                lookup("SESSION_IDLE_SECS"),
                DEFAULT_SESSION_IDLE_SECS,
            ))),
        }
    }
}

const DEFAULT_SESSION_IDLE_SECS: u32 = 3600;

/// `raw` parsed, falling back to `default` on absence or garbage
fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    match raw {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("⚠ {}={} is not a number, using {}", name, raw, default);
            default
        }),
        None => default,
    }
}

/// Everything fallible that has to succeed before the server may bind.
///
/// A missing API key fails here, so nothing ever listens without one.
fn prepare<F>(lookup: F) -> anyhow::Result<(AppState, Settings)>
where
    F: Fn(&str) -> Option<String>,
{
    let provider = ChatCompletionsProvider::from_lookup(&lookup)?;
    let settings = Settings::from_lookup(&lookup);

    let options = GenerationOptions {
        model: provider.default_model().to_string(),
        ..Default::default()
    };

    let market = SimulatedMarket::new(settings.market_seed);
    tracing::info!("✓ Simulated market (seed {})", market.seed());

    let advisor = BondAdvisor::new(Arc::new(provider), Arc::new(market), options);
    Ok((AppState::new(advisor), settings))
}

async fn log_provider_status(provider: &dyn LlmProvider) {
    match provider.health_check().await {
        Ok(true) => {
            tracing::info!("✓ Connected to {}", provider.name());
            if let Ok(models) = provider.list_models().await {
                for model in models {
                    tracing::info!("  Model: {}", model.id);
                }
            }
        }
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ {} not reachable - replies will fail", provider.name());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (state, settings) = match prepare(|name| std::env::var(name).ok()) {
        Ok(prepared) => prepared,
        Err(e) => {
            match e.downcast_ref::<AgentError>() {
                Some(agent) => tracing::error!("✗ {}", agent.user_message()),
                None => tracing::error!("✗ {}", e),
            }
            tracing::error!("  Set DEEPSEEK_API_KEY in the environment or in .env");
            return Err(e);
        }
    };

    log_provider_status(state.advisor.provider()).await;

    spawn_session_sweeper(
        state.sessions.clone(),
        settings.session_idle,
        SWEEP_INTERVAL,
    );

    let app = app(state, &settings.static_dir);

    // Start server
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 bond advisor running on http://{}", settings.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET    /health                          - Health check");
    tracing::info!("  GET    /api/models                      - List available models");
    tracing::info!("  GET    /api/market                      - Yields, status, chart");
    tracing::info!("  GET    /api/instruments                 - Bond ETF pool");
    tracing::info!("  POST   /api/sessions                    - Start a session");
    tracing::info!("  GET    /api/sessions/{{id}}               - Transcript");
    tracing::info!("  DELETE /api/sessions/{{id}}               - End a session");
    tracing::info!("  PUT    /api/sessions/{{id}}/risk-profile  - Select risk profile");
    tracing::info!("  DELETE /api/sessions/{{id}}/messages      - Clear history");
    tracing::info!("  POST   /api/sessions/{{id}}/chat          - Send message");
    tracing::info!("  GET    /api/sessions/{{id}}/chat/stream   - WebSocket streaming");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Routes, middleware and the static dashboard
pub fn app(state: AppState, static_dir: &str) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/api/models", get(list_models))

        // Dashboard data
        .route("/api/market", get(market))
        .route("/api/instruments", get(instruments))

        // Sessions
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(get_session).delete(delete_session))
        .route("/api/sessions/{id}/risk-profile", put(set_risk_profile))
        .route("/api/sessions/{id}/messages", delete(clear_messages))
        .route("/api/sessions/{id}/chat", post(chat_handler))
        .route("/api/sessions/{id}/chat/stream", get(chat_stream_handler))

        // Static files (dashboard page)
        .fallback_service(ServeDir::new(static_dir))

        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_bind() {
        let err = prepare(lookup(&[("BIND_ADDR", "127.0.0.1:0")])).err().unwrap();
        assert!(matches!(err.downcast_ref::<AgentError>(), Some(AgentError::Config(_))));

        let err = prepare(lookup(&[("DEEPSEEK_API_KEY", "  ")])).err().unwrap();
        assert!(matches!(err.downcast_ref::<AgentError>(), Some(AgentError::Config(_))));
    }

    #[tokio::test]
    async fn test_prepare_reads_settings() {
        let (state, settings) = prepare(lookup(&[
            ("DEEPSEEK_API_KEY", "sk-test"),
            ("DEEPSEEK_MODEL", "deepseek-reasoner"),
            ("MARKET_SEED", "7"),
            ("SESSION_IDLE_SECS", "soon"),
        ]))
        .unwrap();

        assert_eq!(settings.bind_addr, "0.0.0.0:3000");
        assert_eq!(settings.static_dir, "static");
        assert_eq!(settings.market_seed, 7);
        assert_eq!(settings.session_idle, TimeDelta::seconds(i64::from(DEFAULT_SESSION_IDLE_SECS)));
        assert_eq!(state.advisor.options().model, "deepseek-reasoner");
        assert!(state.sessions.is_empty());
    }
}
