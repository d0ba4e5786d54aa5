use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use realagg_core::FilterPolicy;
use realagg_db::{ListingGateway, PoolConfig, SourceCache};
use realagg_scraper::{FetchClient, RetryPolicy, ScrapeContext, Source};

#[derive(Debug, Parser)]
#[command(name = "realagg-cli")]
#[command(about = "Listing aggregator command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the scraping pipeline for selected (or all active) sources
    Scrape {
        /// Restrict the run to specific source codes (repeatable)
        #[arg(long = "source")]
        sources: Vec<String>,

        /// Walk full pagination and deactivate unseen listings afterwards
        #[arg(long)]
        full_rescan: bool,
    },
    /// Backfill coordinates for listings without GPS
    Geocode {
        #[arg(long, default_value_t = 50)]
        batch_size: i64,
    },
    /// Backfill cadastral data for listings without a resolved record
    Ruian {
        #[arg(long, default_value_t = 50)]
        batch_size: i64,

        /// Also reprocess rows previously marked not_found
        #[arg(long)]
        overwrite_not_found: bool,
    },
    /// Database management commands
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Test the database connection
    Ping,
    /// Run pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| {
        let level = std::env::var("REALAGG_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::try_new(level)
    })?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Scrape {
            sources,
            full_rescan,
        }) => run_scrape(sources, full_rescan).await?,
        Some(Commands::Geocode { batch_size }) => run_geocode(batch_size).await?,
        Some(Commands::Ruian {
            batch_size,
            overwrite_not_found,
        }) => run_ruian(batch_size, overwrite_not_found).await?,
        Some(Commands::Db { command }) => match command {
            DbCommands::Ping => run_db_ping().await?,
            DbCommands::Migrate => run_db_migrate().await?,
        },
        None => println!("realagg-cli: use --help for available commands"),
    }

    Ok(())
}

struct Bootstrap {
    pool: sqlx::PgPool,
    config: realagg_core::AppConfig,
    ctx: ScrapeContext,
}

async fn bootstrap() -> anyhow::Result<Bootstrap> {
    let config = realagg_core::load_app_config()?;
    let settings = Arc::new(realagg_core::load_settings(&config.settings_path)?);

    let pool_config = PoolConfig::from_settings(&settings, config.db_acquire_timeout_secs);
    let pool = realagg_db::connect_pool(&settings.database.url(), pool_config).await?;

    let sources = Arc::new(SourceCache::new(std::time::Duration::from_secs(
        config.source_cache_ttl_secs,
    )));
    let policy = Arc::new(FilterPolicy::from_settings(&settings));
    let gateway = ListingGateway::new(pool.clone(), sources, policy);

    let client = FetchClient::new(
        config.scraper_request_timeout_secs,
        &config.scraper_user_agent,
        RetryPolicy {
            max_attempts: config.scraper_max_retries.max(1),
            base_delay_secs: config.scraper_retry_backoff_base_secs,
            cap_delay_secs: config.scraper_retry_backoff_cap_secs,
        },
    )?;
    let ctx = ScrapeContext::new(client, gateway, settings);

    Ok(Bootstrap { pool, config, ctx })
}

async fn run_scrape(requested: Vec<String>, full_rescan: bool) -> anyhow::Result<()> {
    let boot = bootstrap().await?;

    let sources: Vec<Source> = if requested.is_empty() {
        realagg_db::list_active_sources(&boot.pool)
            .await?
            .into_iter()
            .filter_map(|row| Source::from_code(&row.code))
            .collect()
    } else {
        let mut resolved = Vec::new();
        for code in &requested {
            let source = Source::from_code(code)
                .ok_or_else(|| anyhow::anyhow!("unknown source code: {code}"))?;
            resolved.push(source);
        }
        resolved
    };
    anyhow::ensure!(!sources.is_empty(), "no runnable sources selected");

    let scan_started = chrono::Utc::now();
    let mut total_saved: u64 = 0;

    for source in sources {
        match realagg_scraper::run_source(&boot.ctx, source, full_rescan).await {
            Ok(summary) => {
                total_saved += summary.saved();
                if full_rescan {
                    let deactivated = boot
                        .ctx
                        .gateway
                        .deactivate_unseen(source.code(), scan_started)
                        .await?;
                    if deactivated > 0 {
                        println!("{source}: deactivated {deactivated} unseen listings");
                    }
                }
                println!(
                    "{source}: found {}, saved {} ({} new, {} updated), skipped {}, failed {}",
                    summary.found,
                    summary.saved(),
                    summary.saved_new,
                    summary.saved_updated,
                    summary.skipped,
                    summary.failed,
                );
            }
            Err(e) => eprintln!("{source}: adapter failed: {e:#}"),
        }
    }

    println!("total saved: {total_saved}");
    Ok(())
}

async fn run_geocode(batch_size: i64) -> anyhow::Result<()> {
    let boot = bootstrap().await?;
    let client = realagg_enrich::GeocodeClient::new(
        &boot.config.enrich_user_agent,
        boot.config.enrich_rate_limit_ms,
    )?;
    let resolved = realagg_enrich::bulk_geocode(&boot.pool, &client, batch_size).await?;
    println!("geocoded {resolved} listings");
    Ok(())
}

async fn run_ruian(batch_size: i64, overwrite_not_found: bool) -> anyhow::Result<()> {
    let boot = bootstrap().await?;
    let client = realagg_enrich::RuianClient::new(
        &boot.config.enrich_user_agent,
        boot.config.enrich_rate_limit_ms,
    )?;
    let stats =
        realagg_enrich::bulk_ruian(&boot.pool, &client, batch_size, overwrite_not_found).await?;
    println!(
        "cadastre sweep: {} processed, {} found, {} not found, {} errors",
        stats.total, stats.found, stats.not_found, stats.error
    );
    Ok(())
}

async fn run_db_ping() -> anyhow::Result<()> {
    let boot = bootstrap().await?;
    realagg_db::health_check(&boot.pool).await?;
    println!("database is healthy");
    Ok(())
}

async fn run_db_migrate() -> anyhow::Result<()> {
    let boot = bootstrap().await?;
    let applied = realagg_db::run_migrations(&boot.pool).await?;
    if applied == 0 {
        println!("0 pending migrations, database is up to date");
    } else {
        println!("applied {applied} migration(s) successfully");
    }
    Ok(())
}
