use std::net::TcpListener;
use token_auth::auth::KeyStore;
use token_auth::configuration::get_configuration;
use token_auth::db::{get_connection_pool, migrate};
use token_auth::error::StartupError;
use token_auth::startup::{run, AppState};
use token_auth::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    init_telemetry();

    if let Err(e) = serve().await {
        tracing::error!(error = %e, "Fatal startup error");
        return Err(e);
    }

    Ok(())
}

async fn serve() -> Result<(), StartupError> {
    tracing::info!("Starting application");

    let configuration = get_configuration()?;
    tracing::info!("Configuration loaded successfully");

    let key_store = KeyStore::from_settings(&configuration.auth);
    let keypair = key_store.ensure_keypair()?;
    tracing::info!(path = %key_store.private_key_path().display(), "Signing key ready");

    let pool = get_connection_pool(&configuration.database).await?;
    migrate(&pool).await?;
    tracing::info!(path = %configuration.database.path.display(), "Database ready");

    let address = configuration.application.address();
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let state = AppState::build(pool, keypair, &configuration)?;

    // actix stops gracefully on SIGINT/SIGTERM
    run(listener, state)?.await?;

    tracing::info!("Server stopped");
    Ok(())
}
