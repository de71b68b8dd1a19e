use anyhow::Result;
use axum::http::{header, HeaderValue, Method};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use pingnotes::{
    commands,
    config::Config,
    db::{DocumentStore, Database},
    oauth::{CredentialRefresher, OAuthRegistry, UnconfiguredRefresher},
    routes,
    services::{
        classifier::{ContentClassifier, LlmClassifier},
        file_lifecycle::FileLifecycleManager,
    },
    storage::factory::create_cloud_store,
    ApiDoc, AppState,
};

#[derive(Parser)]
#[command(name = "pingnotes")]
#[command(about = "Study notes backend: files in Google Drive, organised by subject and topic")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,pingnotes=debug")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Migrate => commands::migrate::run_migrations(&config).await,
        Command::Serve => serve(config).await,
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origin = match HeaderValue::from_str(&config.frontend_url) {
        Ok(origin) => AllowOrigin::exact(origin),
        Err(_) => {
            warn!("FRONTEND_URL '{}' is not a valid origin; allowing any origin", config.frontend_url);
            AllowOrigin::any()
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting Pingnotes on {}", config.server_address);

    let db = Database::new(&config.database_url).await?;
    db.with_retry(|| db.migrate()).await?;
    let store: Arc<dyn DocumentStore> = Arc::new(db);

    let oauth = OAuthRegistry::from_config(&config)?.map(Arc::new);
    let refresher: Arc<dyn CredentialRefresher> = match &oauth {
        Some(registry) => registry.refresher(),
        None => Arc::new(UnconfiguredRefresher),
    };

    let cloud = create_cloud_store(&config).await?;
    let classifier: Arc<dyn ContentClassifier> = Arc::new(LlmClassifier::from_config(&config)?);
    if config.llm_api_key.is_none() {
        warn!("LLM_API_KEY not set; subject suggestions and summaries are disabled");
    }

    let temp_dir = std::path::Path::new(&config.upload_path).join("temp");
    tokio::fs::create_dir_all(&temp_dir).await?;
    let files = Arc::new(FileLifecycleManager::new(
        store.clone(),
        cloud,
        refresher,
        classifier,
        temp_dir,
    ));

    let cors = cors_layer(&config);
    let server_address = config.server_address.clone();
    let state = Arc::new(AppState {
        config,
        store,
        files,
        oauth,
    });

    let app = routes::api_router(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
