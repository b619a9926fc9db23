//! TutorHub marketplace HTTP server.

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tutorhub_core::environment::{Clock, SystemClock};
use tutorhub_marketplace::{
    AppState, BookingService, Config, Gateways,
    aggregates::BookingEnvironment,
    build_router,
    gateways::{FlutterwaveGateway, PaymentGateway, PaystackGateway, StripeGateway},
    metrics::register_business_metrics,
    notifications::PostgresNotifier,
    store::{PostgresBookingStore, PostgresSessionStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before reading configuration; a missing file is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tutorhub_marketplace=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting TutorHub marketplace server");

    let config = Config::from_env();
    info!(
        host = %config.server.host,
        port = config.server.port,
        stripe = ?config.stripe,
        flutterwave = ?config.flutterwave,
        paystack = ?config.paystack,
        "Configuration loaded"
    );

    // Metrics exporter on its own listener
    let metrics_addr: SocketAddr = format!("{}:{}", config.server.metrics_host, config.server.metrics_port)
        .parse()
        .context("Invalid metrics listen address")?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    register_business_metrics();
    info!(%metrics_addr, "Prometheus exporter listening");

    // One pool for the whole process
    info!("Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .min_connections(config.postgres.min_connections)
        .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
        .idle_timeout(Duration::from_secs(config.postgres.idle_timeout))
        .connect(&config.postgres.url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    info!("Database ready");
    let pool = Arc::new(pool);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let env = BookingEnvironment::new(clock.clone(), Arc::new(PostgresNotifier::new(pool.clone())));
    let bookings = BookingService::new(
        Arc::new(PostgresBookingStore::new(pool.clone())),
        env,
        config.booking,
    );

    let http = reqwest::Client::new();
    let gateways = Gateways {
        stripe: StripeGateway::from_config(&config.stripe, http.clone(), clock)
            .map(|g| Arc::new(g) as Arc<dyn PaymentGateway>),
        flutterwave: FlutterwaveGateway::from_config(&config.flutterwave, http.clone())
            .map(|g| Arc::new(g) as Arc<dyn PaymentGateway>),
        paystack: PaystackGateway::from_config(&config.paystack, http)
            .map(|g| Arc::new(g) as Arc<dyn PaymentGateway>),
    };
    let enabled = gateways.enabled();
    if enabled.is_empty() {
        warn!("No payment gateway is configured; every webhook will answer 503");
    } else {
        info!(gateways = ?enabled, "Payment gateways enabled");
    }

    let state = AppState::new(
        bookings,
        Arc::new(PostgresSessionStore::new(pool.clone())),
        gateways,
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .context("Failed to bind HTTP listener")?;
    info!(addr = %listener.local_addr()?, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    if tokio::time::timeout(shutdown_timeout, pool.close()).await.is_err() {
        warn!(?shutdown_timeout, "Timed out closing database pool");
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
