use food_express::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    repository::{MongoRepository, RepositoryState},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, sets up logging, opens the single MongoDB client and
/// serves the API.
#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // RUST_LOG wins; otherwise sensible local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "food_express=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for log aggregation.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // One client for the whole process lifetime, shared through AppState.
    let mongo = MongoRepository::connect(&config.mongo_uri, &config.db_name)
        .await
        .expect("FATAL: Failed to connect to MongoDB. Check MONGO_URI.");
    let repo = Arc::new(mongo) as RepositoryState;

    let port = config.port;
    let app = create_router(AppState::new(repo, config));

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .expect("FATAL: Failed to bind the HTTP port. Check PORT.");

    tracing::info!("Listening on 0.0.0.0:{}", port);
    tracing::info!("API Documentation (Swagger UI) available at: http://localhost:{}/swagger-ui", port);

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
