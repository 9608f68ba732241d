use refdata_server::app_state::AppState;
use refdata_server::config::Settings;
use refdata_server::create_router;
use refdata_server::database::init_database;
use refdata_server::email::{EmailHelper, SmtpMailer};
use refdata_server::handlers::load_caches;
use refdata_server::permissions::{PermissionProvider, StaticPermissions};
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Le `.env` est optionnel.
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;

    info!("Initializing database...");
    let pool = init_database(&settings.database_file).await?;

    let permissions: Arc<dyn PermissionProvider> = match &settings.permissions_file {
        Some(path) => {
            info!("Loading permissions from {}", path.display());
            Arc::new(StaticPermissions::from_json_file(path)?)
        }
        None => {
            warn!("No PERMISSIONS_FILE set, change history will not be redacted");
            Arc::new(StaticPermissions::new())
        }
    };

    let mailer = Arc::new(SmtpMailer::new(&settings.smtp_host, settings.smtp_port));
    let email = Arc::new(EmailHelper::new(mailer, settings.email.clone()));

    let state = AppState::new(pool, permissions, email);

    info!("Loading caches...");
    load_caches(&state).await?;
    info!(
        "Caches loaded: {} lists, main data '{}'",
        state.lists.loaded_count(),
        state.main_data.current().id
    );

    let app = create_router(state);

    let addr: SocketAddr = settings.bind_addr;
    info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
