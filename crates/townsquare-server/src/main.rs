use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("townsquare=info,tower_http=debug")),
        )
        .init();

    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;

    ensure_db_dir(&config.database.url);
    let db = townsquare_db::create_pool(&config.database.url, config.database.max_connections)
        .await
        .with_context(|| format!("opening database {}", config.database.url))?;
    townsquare_db::run_migrations(&db).await?;

    match args.command.unwrap_or(cli::Command::Serve) {
        cli::Command::Serve => serve(config, db).await,
        cli::Command::CreateUser {
            username,
            name,
            avatar,
            neighborhood,
        } => {
            let user = townsquare_core::user::provision_user(
                &db,
                townsquare_core::next_id(),
                &username,
                Some(name.as_str()),
                avatar.as_deref(),
                neighborhood.as_deref(),
            )
            .await?;
            let token = townsquare_core::auth::create_token(
                user.id.parse()?,
                &config.auth.jwt_secret,
                config.auth.jwt_expiry_seconds,
            )?;
            tracing::info!(user_id = %user.id, username = %user.username, "user created");
            println!("{token}");
            Ok(())
        }
    }
}

async fn serve(config: config::Config, db: townsquare_db::DbPool) -> Result<()> {
    let state = townsquare_core::AppState {
        db,
        config: townsquare_core::AppConfig {
            jwt_secret: config.auth.jwt_secret.clone(),
            jwt_expiry_seconds: config.auth.jwt_expiry_seconds,
        },
    };

    let app = townsquare_api::build_router()
        .layer(cors_layer(&config.server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;

    print_startup_banner(&config.server.bind_address, &config.database.url);

    let shutdown_signal = async {
        let _ = tokio::signal::ctrl_c().await;
        println!();
        tracing::info!("Shutting down...");
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

/// Allow any origin when none are configured; otherwise only the listed ones.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Create the parent directory of a file-backed SQLite database.
fn ensure_db_dir(db_url: &str) {
    if let Some(db_path) = db_url
        .strip_prefix("sqlite://")
        .and_then(|s| s.split('?').next())
    {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::warn!("Could not create directory '{}': {}", parent.display(), e);
                }
            }
        }
    }
}

fn print_startup_banner(bind_address: &str, db_url: &str) {
    println!();
    println!("  townsquare {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("  Listening:   http://{}", bind_address);
    println!("  Database:    {}", db_url);
    println!();
}
