use alumni_portal::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    documents::{AchievementState, MongoAchievementStore},
    permissions::PermissionCache,
    references::{PostgresReferenceStore, ReferenceState},
    repository::{PostgresRepository, RepositoryState},
    storage::{S3StorageClient, StorageService, StorageState},
};
use sqlx::postgres::PgPoolOptions;
use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, initializes logging, connects the relational store, the
/// document store and object storage, loads the permission cache and serves HTTP.
#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    // Logging is not up yet, so a configuration error goes straight to stderr.
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "alumni_portal=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "startup failed");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing::info!("Application starting in {:?} mode", config.env);

    // 1. Relational store (Postgres) and schema migrations.
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.db_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let postgres = Arc::new(PostgresRepository::new(pool.clone()));
    let references = Arc::new(PostgresReferenceStore::new(pool)) as ReferenceState;

    // 2. Permission cache, read once and shared read-only afterwards.
    let permissions = Arc::new(PermissionCache::load(postgres.as_ref()).await?);
    let repo = postgres as RepositoryState;

    // 3. Document store (MongoDB).
    let mongo = mongodb::Client::with_uri_str(&config.mongo_uri).await?;
    let achievement_store = MongoAchievementStore::new(&mongo.database(&config.mongo_database));
    achievement_store.ensure_indexes().await?;
    let achievements = Arc::new(achievement_store) as AchievementState;

    // 4. Attachment storage (S3/MinIO).
    let s3_client = S3StorageClient::new(
        &config.s3_endpoint,
        &config.s3_region,
        &config.s3_key,
        &config.s3_secret,
        &config.s3_bucket,
    )
    .await;
    if config.env == Env::Local {
        s3_client.ensure_bucket_exists().await;
    }
    let storage = Arc::new(s3_client) as StorageState;

    let port = config.port;
    let app_state = AppState::new(repo, achievements, references, storage, permissions, config);
    let app = create_router(app_state);

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("Listening on 0.0.0.0:{port}");
    tracing::info!("API Documentation (Swagger UI) available at: http://localhost:{port}/swagger-ui");

    axum::serve(listener, app).await?;
    Ok(())
}
