use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method, header};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use licensedesk::config::Config;
use licensedesk::db::{self, AppState, DbPool, queries};
use licensedesk::handlers::build_router;
use licensedesk::models::{CreateUser, UserRole};
use licensedesk::rate_limit;

#[derive(Parser)]
#[command(name = "licensedesk", version, about = "License request and validation server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Create a user and print their API key
    CreateUser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        admin: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "licensedesk=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();

    match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            serve(config).await
        }
        Command::CreateUser { email, name, admin } => {
            let pool = open_database(&config.database_path, db::init_db)?;
            let conn = pool.get()?;
            let role = if admin { UserRole::Admin } else { UserRole::User };
            let input = CreateUser {
                email,
                name,
                role: Some(role),
            };
            input.validate()?;
            let api_key = queries::generate_api_key();
            let user = queries::create_user(&conn, &input, &api_key)?;
            println!("Created {} {} ({})", user.role.as_ref(), user.email, user.id);
            println!("API key (shown once): {}", api_key);
            Ok(())
        }
    }
}

fn open_database(
    path: &str,
    init: fn(&rusqlite::Connection) -> licensedesk::error::Result<()>,
) -> Result<DbPool> {
    let pool = db::create_pool(path).with_context(|| format!("failed to open {}", path))?;
    let conn = pool.get()?;
    init(&conn).with_context(|| format!("failed to initialize schema in {}", path))?;
    Ok(pool)
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!(?config, "Loaded configuration");

    let db = open_database(&config.database_path, db::init_db)?;
    let audit = open_database(&config.audit_database_path, db::init_audit_db)?;

    bootstrap_admin(&db, &config)?;

    if config.audit_log_enabled && config.audit_log_retention_days > 0 {
        let audit_conn = audit.get()?;
        let purged = queries::purge_old_audit_logs(&audit_conn, config.audit_log_retention_days)?;
        if purged > 0 {
            tracing::info!(purged, "Purged old audit logs");
        }
    }

    let validate_limiter = rate_limit::account_limiter(config.validate_rate_limit_per_minute);
    if let Some(limiter) = &validate_limiter {
        rate_limit::spawn_cleanup(limiter.clone(), rate_limit::CLEANUP_INTERVAL);
    }

    let state = AppState {
        db,
        audit,
        audit_log_enabled: config.audit_log_enabled,
        validate_limiter,
    };

    let app = build_router(state).layer(cors_layer(&config)?);

    let addr = config.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    tracing::info!(address = %addr, dev_mode = config.dev_mode, "licensedesk listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

/// Create the first admin from BOOTSTRAP_ADMIN_EMAIL when no admin exists yet.
fn bootstrap_admin(pool: &DbPool, config: &Config) -> Result<()> {
    let Some(email) = &config.bootstrap_admin_email else {
        return Ok(());
    };
    let conn = pool.get()?;
    if queries::count_admins(&conn)? > 0 {
        return Ok(());
    }
    if queries::get_user_by_email(&conn, email)?.is_some() {
        tracing::warn!(email = %email, "Bootstrap email belongs to an existing non-admin user, skipping");
        return Ok(());
    }

    let input = CreateUser {
        email: email.clone(),
        name: "Administrator".into(),
        role: Some(UserRole::Admin),
    };
    input.validate()?;
    let api_key = queries::generate_api_key();
    let user = queries::create_user(&conn, &input, &api_key)?;
    tracing::info!(user_id = %user.id, email = %user.email, "Bootstrap admin created");
    tracing::info!("Bootstrap admin API key (shown once): {}", api_key);
    Ok(())
}

fn cors_layer(config: &Config) -> Result<CorsLayer> {
    if config.dev_mode {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }
    let origins = config
        .cors_origins
        .iter()
        .map(|o| HeaderValue::from_str(o).with_context(|| format!("invalid CORS origin {}", o)))
        .collect::<Result<Vec<_>>>()?;
    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping server");
}
