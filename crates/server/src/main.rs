//! Yay Reviews server - review-request webhook intake and daily sweep.
//!
//! # Architecture
//!
//! - Axum web framework serving the Shopify fulfillment webhook
//! - `PostgreSQL` `email_queue` as the durable send queue
//! - Daily sweep task (01:00 UTC by default) sending review requests over SMTP
//! - Shopify Admin API read per shop with its stored offline token
//!
//! Migrations are not run on start-up; use `yr-cli migrate`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use axum::Router;
use sentry::integrations::tracing as sentry_tracing;
use tokio::sync::watch;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yay_reviews_core::{Clock, SystemClock};
use yay_reviews_server::config::ServerConfig;
use yay_reviews_server::db::{self, EmailQueueRepository, ShopSessionRepository};
use yay_reviews_server::routes;
use yay_reviews_server::services::{
    DailySchedule, SmtpMailer, Sweeper, WebhookIntake, spawn_daily_sweep,
};
use yay_reviews_server::shopify::ShopifyClientFactory;
use yay_reviews_server::shopify::webhooks::WebhookVerifier;
use yay_reviews_server::state::AppState;

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ServerConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            // Customer names and emails pass through this service
            send_default_pii: false,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load configuration from environment (needed for Sentry init)
    let config = ServerConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "yay_reviews_server=info,tower_http=debug".into());

    // Use JSON format on Fly.io for structured log parsing, text format locally
    let is_fly = std::env::var("FLY_APP_NAME").is_ok();
    let json_layer = is_fly.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!is_fly).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");
    tracing::info!("Database pool created");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let queue = EmailQueueRepository::new(pool.clone());
    let credentials = ShopSessionRepository::new(pool.clone());
    let shopify = ShopifyClientFactory::new(&config.shopify.api_version);

    let intake = WebhookIntake::new(
        queue.clone(),
        credentials.clone(),
        shopify.clone(),
        WebhookVerifier::new(config.shopify.api_secret.clone()),
        Arc::clone(&clock),
    );

    // Daily sweep
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = if config.sweep.enabled {
        let mailer = SmtpMailer::new(&config.email).expect("Failed to create SMTP mailer");
        let schedule =
            DailySchedule::from_config(&config.sweep).expect("Sweep time validated by config");
        let sweeper = Arc::new(Sweeper::new(
            queue,
            credentials,
            shopify,
            mailer,
            Arc::clone(&clock),
            &config.sweep,
        ));
        Some(spawn_daily_sweep(sweeper, schedule, clock, shutdown_rx))
    } else {
        tracing::info!("Review request sweep disabled (SWEEP_ENABLED=false)");
        None
    };

    let app = Router::new()
        .merge(routes::health_routes(pool))
        .merge(routes::webhook_routes(AppState::new(intake)))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    tracing::info!("yay-reviews listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // Stop the scheduler; an in-flight sweep finishes its current await point
    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler
        && let Err(e) = handle.await
    {
        tracing::error!(error = %e, "Scheduler task failed");
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
