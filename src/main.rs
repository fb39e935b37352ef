use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yamdb_portal::{
    AppState, Env, LogMailer, MailerState, PostgresRepository, RepositoryState, SmtpMailer,
    config::AppConfig, create_router,
};

/// main
///
/// The asynchronous entry point for the application, responsible for
/// initializing all core components: Configuration, Logging, Database, Mail,
/// and the HTTP Server.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    // Loads .env file settings before configuration can be read.
    dotenv::dotenv().ok();
    // AppConfig::load() panics early on missing Production secrets.
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // Prioritizes RUST_LOG, falling back to sensible local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "yamdb_portal=debug,tower_http=info,axum=trace".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            // LOCAL: pretty output for human readability.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // PROD: JSON output for ingestion by centralized log aggregators.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Database Initialization (Postgres)
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    // Instantiate the Repository, wrapping it in an Arc for thread-safe sharing.
    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 5. Mail Initialization
    // With an SMTP host configured, confirmation codes go through the relay;
    // otherwise they are written to the log so the register → token flow stays
    // usable in local development.
    let mailer: MailerState = match &config.smtp_host {
        Some(host) => {
            let smtp = SmtpMailer::new(
                host,
                &config.smtp_username,
                &config.smtp_password,
                &config.smtp_from,
            )
            .expect("FATAL: Failed to build SMTP transport. Check SMTP_* settings.");
            Arc::new(smtp)
        }
        None => {
            tracing::warn!("SMTP_HOST not set; confirmation codes will be logged, not mailed");
            Arc::new(LogMailer)
        }
    };

    // 6. Unified State Assembly
    let app_state = AppState {
        repo,
        mailer,
        config,
    };

    // 7. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind("0.0.0.0:3000")
        .await
        .expect("FATAL: Failed to bind 0.0.0.0:3000");

    tracing::info!("HTTP server bound successfully.");
    tracing::info!("Listening on 0.0.0.0:3000");
    tracing::info!("API Documentation (Swagger UI) available at: http://localhost:3000/swagger-ui");

    // The long-running Axum server process.
    axum::serve(listener, app)
        .await
        .expect("FATAL: server error");
}
