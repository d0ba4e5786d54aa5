mod api;
mod runner;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use realagg_core::FilterPolicy;
use realagg_db::{ListingGateway, PoolConfig, SourceCache};
use realagg_scraper::{FetchClient, RetryPolicy, ScrapeContext};

use crate::api::{build_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(realagg_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let settings = Arc::new(realagg_core::load_settings(&config.settings_path)?);

    let pool_config = PoolConfig::from_settings(&settings, config.db_acquire_timeout_secs);
    let pool = realagg_db::connect_pool(&settings.database.url(), pool_config).await?;
    realagg_db::run_migrations(&pool).await?;

    let sources = Arc::new(SourceCache::new(std::time::Duration::from_secs(
        config.source_cache_ttl_secs,
    )));
    let policy = Arc::new(FilterPolicy::from_settings(&settings));
    let gateway = ListingGateway::new(pool.clone(), sources, policy);

    let fetch_client = FetchClient::new(
        config.scraper_request_timeout_secs,
        &config.scraper_user_agent,
        RetryPolicy {
            max_attempts: config.scraper_max_retries.max(1),
            base_delay_secs: config.scraper_retry_backoff_base_secs,
            cap_delay_secs: config.scraper_retry_backoff_cap_secs,
        },
    )?;
    let ctx = ScrapeContext::new(fetch_client, gateway, Arc::clone(&settings));

    let geocode =
        realagg_enrich::GeocodeClient::new(&config.enrich_user_agent, config.enrich_rate_limit_ms)?;
    let ruian =
        realagg_enrich::RuianClient::new(&config.enrich_user_agent, config.enrich_rate_limit_ms)?;

    let scheduler = if settings.scheduler.enabled {
        let live = scheduler::LiveScheduler::start(
            ctx.clone(),
            pool.clone(),
            settings.scheduler.clone(),
        )
        .await?;
        Some(Arc::new(live))
    } else {
        tracing::info!("scheduler disabled by settings");
        None
    };

    let app = build_app(AppState {
        pool,
        ctx,
        geocode,
        ruian,
        scheduler,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "control surface listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    #[cfg(feature = "browser")]
    realagg_scraper::browser::shared_pool().close().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
