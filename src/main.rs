//! Relay entrypoint: wires settings, the seen store, the source stack and
//! the scheduler, then serves the ops API until a shutdown signal lands.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cybernews_relay::api::{self, AppState};
use cybernews_relay::config::{LogFormat, Settings};
use cybernews_relay::deliver::MessageSender;
use cybernews_relay::fetch;
use cybernews_relay::metrics::Metrics;
use cybernews_relay::scheduler::{self, Scheduler};
use cybernews_relay::store::{PgSeenStore, SeenStore};
use cybernews_relay::telegram::TelegramSender;
use cybernews_relay::translate::Translator;
use cybernews_relay::Pipeline;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Console => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    let settings = Settings::from_env().context("loading configuration")?;
    init_tracing(settings.log_format);
    info!(
        environment = settings.environment.as_str(),
        interval_s = settings.parse_interval.as_secs(),
        "starting cybernews relay"
    );

    let metrics = Metrics::init();
    let client = settings.http_client()?;

    let store: Arc<dyn SeenStore> = Arc::new(
        PgSeenStore::connect(&settings.database_url)
            .await
            .context("connecting seen store")?,
    );
    let sender: Arc<dyn MessageSender> = Arc::new(TelegramSender::new(
        client.clone(),
        settings.telegram_bot_token.clone(),
    ));
    let sources = fetch::default_sources(&settings, &client);
    let translator = Translator::from_settings(&settings, &client);

    let pipeline = Arc::new(Pipeline::new(
        &settings,
        sources,
        Arc::clone(&store),
        translator,
        sender,
    ));
    let scheduler = Scheduler::new(pipeline, settings.parse_interval);
    let _ticker = Arc::clone(&scheduler).spawn();
    let _cleanup = scheduler::spawn_cleanup(Arc::clone(&store), settings.seen_retention_days);

    let state = AppState {
        scheduler: Arc::clone(&scheduler),
        metrics: metrics.handle.clone(),
        parse_api_key: settings.parse_api_key.clone(),
        environment: settings.environment.as_str(),
        started_at: chrono::Utc::now(),
    };
    let router = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr)
        .await
        .with_context(|| format!("binding {}", settings.bind_addr))?;
    info!(addr = %settings.bind_addr, "ops server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("ops server")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("installing ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("installing sigterm handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
