//! Camera Recorder - record a clip, get an MP4 and a thumbnail.
//!
//! This is the main library crate for the camera recorder. It provides the
//! session controller, its capture/transcode/delivery collaborators and a
//! console front-end.

pub mod capture;
pub mod commands;
pub mod config;
pub mod delivery;
pub mod recorder;
pub mod transcode;
pub mod utils;

use config::RecorderConfig;
use recorder::{Collaborators, SessionController, SessionSettings};

/// Initialize the application and drive it from stdin
pub async fn run() -> anyhow::Result<()> {
    utils::logging::init();

    tracing::info!("Starting Camera Recorder v{}", env!("CARGO_PKG_VERSION"));

    let config = RecorderConfig::load()?;
    tracing::debug!("Configuration: {:?}", config);

    let collaborators = Collaborators::from_config(&config)?;
    let session = SessionController::spawn(collaborators, SessionSettings::from_config(&config));

    tokio::spawn(commands::print_events(session.subscribe()));

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    commands::run_console(&session, stdin, tokio::io::stdout()).await?;

    tracing::info!("Camera Recorder stopped");
    Ok(())
}
