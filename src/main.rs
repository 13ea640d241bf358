use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use reqtrack_core::config::{
    DriveEnv, bootstrap_admin_from_env_value, max_upload_bytes_from_env_value,
    storage_backend_from_env_value,
};
use reqtrack_core::constants::DEFAULT_DATA_DIR;
use reqtrack_core::{CoreConfig, Services, StorageConfig};

const BOOTSTRAP_ADMIN_NAME: &str = "Administrator";

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Main entry point for the requisition tracker
///
/// Resolves configuration from the environment once, opens the document store and the
/// attachment backends, makes sure an administrator exists, then serves the REST API with its
/// OpenAPI/Swagger documentation.
///
/// # Environment Variables
/// - `REQTRACK_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `REQTRACK_DATA_DIR`: Document store root (default: "reqtrack_data")
/// - `API_KEY`: Shared API key every client must send (required)
/// - `REQTRACK_BOOTSTRAP_ADMIN`: Email of the administrator to create when none exists
/// - `STORAGE_BACKEND`: `local` (default) or `drive`
/// - `LOCAL_UPLOAD_DIR`: Local attachment root (default: `<data dir>/uploads`)
/// - `DRIVE_APP_KEY`, `DRIVE_APP_SECRET`, `DRIVE_REFRESH_TOKEN`, `DRIVE_ROOT_FOLDER`,
///   `DRIVE_API_URL`, `DRIVE_CONTENT_URL`, `DRIVE_AUTH_URL`: Cloud drive settings
/// - `MAX_UPLOAD_BYTES`: Request body limit (default: 10 MiB)
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - any configuration value is missing or malformed,
/// - the data directory or attachment storage cannot be opened, or
/// - the server address cannot be bound or the server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("reqtrack=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = env("REQTRACK_REST_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into());
    let api_key = env("API_KEY")
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| anyhow::anyhow!("API_KEY must be set"))?;

    let data_dir = PathBuf::from(env("REQTRACK_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into()));
    let cfg = CoreConfig::new(
        data_dir,
        bootstrap_admin_from_env_value(env("REQTRACK_BOOTSTRAP_ADMIN"))?,
        max_upload_bytes_from_env_value(env("MAX_UPLOAD_BYTES"))?,
    )?;

    let drive = DriveEnv {
        app_key: env("DRIVE_APP_KEY"),
        app_secret: env("DRIVE_APP_SECRET"),
        refresh_token: env("DRIVE_REFRESH_TOKEN"),
        root_folder: env("DRIVE_ROOT_FOLDER"),
        api_url: env("DRIVE_API_URL"),
        content_url: env("DRIVE_CONTENT_URL"),
        auth_url: env("DRIVE_AUTH_URL"),
    }
    .into_config()?;
    let local_root = env("LOCAL_UPLOAD_DIR")
        .filter(|d| !d.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| cfg.uploads_dir());
    let storage = StorageConfig::new(
        storage_backend_from_env_value(env("STORAGE_BACKEND"))?,
        local_root,
        drive,
    )?;

    let store = cfg.open_store()?;
    tracing::info!("++ Document store at {}", cfg.data_dir().display());
    let services = Services::new(store);

    if let Some(email) = cfg.bootstrap_admin() {
        match services.users.ensure_admin(BOOTSTRAP_ADMIN_NAME, email.as_str())? {
            Some(profile) => {
                tracing::info!(user_id = %profile.id, "bootstrap administrator ready: {}", email)
            }
            None => tracing::debug!("an administrator already exists"),
        }
    }

    let attachments = storage.open()?;
    let app = router(
        AppState::new(services, attachments, &api_key),
        cfg.max_upload_bytes(),
    );

    tracing::info!("++ Starting requisition tracker REST on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("-- Shutting down");
        })
        .await?;

    Ok(())
}
