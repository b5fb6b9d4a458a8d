use std::sync::Arc;

use analyst_core::{AnalystConfig, ChatBackend};
use analyst_server::router::AppContext;
use analyst_server::subsystems::backend::create_backend_from_config;
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "analyst.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is a dev convenience; deployments set real env vars
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match AnalystConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG wins over service.log_level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let report = config.validate();
    for warning in &report.warnings {
        tracing::warn!("Config: {}", warning);
    }
    for error in &report.errors {
        tracing::warn!("Config error: {}", error);
    }

    let pool = match analyst_core::db::create_pool(&config.database) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Invalid database url {}: {}", config.database.url, e);
            std::process::exit(1);
        }
    };

    let backend: Arc<dyn ChatBackend> = match create_backend_from_config(&config) {
        Ok(b) => Arc::from(b),
        Err(e) => {
            eprintln!("Failed to create model backend: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        let mut healthy = true;
        match analyst_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ SQLite connected: {}", v),
            Err(e) => {
                println!("❌ SQLite connection failed: {}", e);
                healthy = false;
            }
        }

        let schema = analyst_core::db::read_schema(&pool).await;
        match &schema.error {
            None => println!("✅ Schema readable: {} tables", schema.table_count()),
            Some(e) => {
                println!("❌ Schema unreadable: {}", e);
                healthy = false;
            }
        }

        if backend.health_check().await {
            println!("✅ Model backend reachable: {} ({})", backend.name(), backend.model());
        } else {
            println!("❌ Model backend unreachable: {} ({})", backend.name(), backend.model());
            healthy = false;
        }

        if !healthy {
            std::process::exit(1);
        }
        println!("✅ Analyst health check passed");
        return Ok(());
    }

    // Startup problems below are logged, not fatal
    match analyst_core::db::health_check(&pool).await {
        Ok(v) => tracing::info!(sqlite = %v, url = %config.database.url, "Database ready"),
        Err(e) => tracing::warn!(error = %e, "Database not reachable yet"),
    }
    if !backend.health_check().await {
        tracing::warn!(
            backend = backend.name(),
            model = backend.model(),
            "Model backend not reachable; questions will fail until it is"
        );
    }

    let ctx = Arc::new(AppContext::new(pool.clone(), config, backend));
    if let Err(e) = ctx.workflow.store().ensure_dir().await {
        tracing::warn!(
            dir = %ctx.workflow.store().dir().display(),
            error = %e,
            "Chart directory not creatable"
        );
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let result = analyst_server::http::start_http_server(ctx, tx.subscribe()).await;
    pool.close().await;
    result
}
