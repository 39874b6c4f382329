#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use passkey_gate::{
    configure_services,
    passkey::spawn_challenge_sweeper,
    settings::PasskeyGateSettings,
    store::Stores,
    utils::logging::LoggingHelper,
    webauthn::WebAuthnVerifier,
    PasskeyConfig, PasskeyService,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from Settings.toml, .env and environment variables
    let settings = PasskeyGateSettings::load().context("Failed to load settings")?;
    LoggingHelper::init(&settings.logging).context("Failed to initialize logging")?;

    // Production refuses the in-memory backend here
    let stores = Stores::open(&settings.storage, &settings.application)
        .await
        .context("Failed to open storage")?;

    let verifier = Arc::new(
        WebAuthnVerifier::new(&settings.webauthn_settings())
            .context("Failed to initialize WebAuthn")?,
    );
    let service = PasskeyService::new(stores, verifier, PasskeyConfig::from_settings(&settings));

    let sweeper = spawn_challenge_sweeper(
        service.clone(),
        Duration::from_secs(settings.challenges.cleanup_interval_seconds.max(1)),
    );

    let result = start_server(service, &settings).await;
    sweeper.abort();
    result
}

/// Start the HTTP server
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(service: PasskeyService, settings: &PasskeyGateSettings) -> anyhow::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, settings);

    let service = web::Data::new(service);
    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .wrap(Logger::default())
            .configure(configure_services)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {bind_address}"))?
    .run()
    .await
    .context("Server error")
}

fn print_startup_info(bind_address: &str, settings: &PasskeyGateSettings) {
    println!("Starting passkey-gate v{} on http://{bind_address}", passkey_gate::VERSION);
    println!(
        "Relying party: {} ({}), origin {}",
        settings.relying_party.rp_name, settings.relying_party.rp_id, settings.relying_party.rp_origin
    );
    println!(
        "Storage: {:?} (environment: {})",
        settings.storage.backend, settings.application.environment
    );
    println!();
    println!("Passkey endpoints:");
    println!("  POST /register/options      - Start passkey registration");
    println!("  POST /register/verify       - Complete passkey registration");
    println!("  POST /authenticate/options  - Start passkey authentication");
    println!("  POST /authenticate/verify   - Complete passkey authentication");
    println!();
    println!("System endpoints:");
    println!("  GET  /ping                  - Health check");
}
