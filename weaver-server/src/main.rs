use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};
use weaver_core::WeaverConfig;
use weaver_ingest::StorySource;

use weaver_server::{server, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "weaver.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience, production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = match WeaverConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    if args.health {
        let pool = match weaver_core::db::create_pool(&config.database).await {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Failed to connect to database: {}", e);
                std::process::exit(1);
            }
        };

        match weaver_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ PostgreSQL connected: {}", v),
            Err(e) => {
                println!("❌ PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        }

        match weaver_core::db::check_pgvector(&pool).await {
            Ok(v) => println!("✅ pgvector version: {}", v),
            Err(e) => {
                println!("❌ pgvector check failed: {}", e);
                std::process::exit(1);
            }
        }

        println!("✅ Weaver DB health check passed");
        return Ok(());
    }

    let source = StorySource::parse(&config.story.source);
    let story = match weaver_ingest::load_story(&source).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to load story from {}: {}", config.story.source, e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        source = %config.story.source,
        paragraphs = story.paragraphs().len(),
        "Story loaded"
    );

    let state = Arc::new(AppState::from_config(&config, story).await?);

    // Populate fragments up front so the first player does not pay for it.
    if let Err(e) = state.engine.prepare().await {
        tracing::warn!("Fragment store not ready, will retry on first selection: {}", e);
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

    if config.http.enabled {
        let http_state = state.clone();
        let http_config = config.http.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) =
                weaver_server::http::start_http_server(http_state, http_config, http_shutdown)
                    .await
            {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let socket_path = config.service.socket_path.clone();
    server::run_unix_server(&socket_path, state, tx.subscribe()).await?;

    Ok(())
}
