// Main entry point for the pomodoro bot server

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use pomodoro_core::domains::pomodoro::{PomodoroService, StepScript};
use pomodoro_core::kernel::{PostgresTimerQueue, TimerRunner, TimerRunnerConfig};
use pomodoro_core::server::{build_app, build_deps, AppState};
use pomodoro_core::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pomodoro_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting pomodoro bot");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        script = ?config.script,
        sink = ?config.sink,
        admins = config.admin_chat_ids.len(),
        "Configuration loaded"
    );

    let script = Arc::new(StepScript::from_preset(config.script));
    script.validate().context("Invalid step script")?;

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    let deps = Arc::new(build_deps(&config, pool.clone(), script.clone())?);
    let service = Arc::new(PomodoroService::new(deps, script));

    // Deliver due timers in the background
    let runner = TimerRunner::new(
        Arc::new(PostgresTimerQueue::new(pool.clone())),
        service.clone(),
        TimerRunnerConfig::with_poll_interval(config.timer_poll_interval),
    );
    let runner_shutdown = runner.shutdown_handle();
    let runner_task = tokio::spawn(runner.run());

    let app = build_app(AppState {
        db_pool: pool,
        service,
    });

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Telegram webhook: http://localhost:{}/telegram/webhook", config.port);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    runner_shutdown.store(true, Ordering::SeqCst);
    match runner_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Timer runner failed"),
        Err(e) => tracing::error!(error = %e, "Timer runner task panicked"),
    }

    Ok(())
}
