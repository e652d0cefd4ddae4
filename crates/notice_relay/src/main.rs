mod logging;
mod report;

use std::process::ExitCode;

use anyhow::Context;
use notice_engine::{
    CookieFileSessionProvider, Pipeline, PortalSession, RecordingProgressSink, RelayConfig,
};
use relay_logging::{relay_error, relay_info, relay_warn};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    // The only `.env` load; it must precede the logger for RELAY_LOG_LEVEL.
    let env_file = notice_engine::load_dotenv();
    logging::initialize(logging::level_from(
        std::env::var(logging::LEVEL_VAR).ok().as_deref(),
    ));
    if let Some(path) = env_file {
        relay_info!("Loaded environment from {}", path.display());
    }

    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            relay_error!("{:#}", err);
            ExitCode::from(report::EXIT_FAILURE)
        }
    }
}

async fn run() -> anyhow::Result<u8> {
    let config = RelayConfig::from_env().context("invalid configuration")?;
    relay_info!(
        "Relaying notices from {} to {} sink(s)",
        config.notice_page_url,
        config.sinks.len()
    );

    let session = PortalSession::new(config.notice_page_url.clone(), &config.fetch_settings())
        .context("could not create portal session")?;
    let provider =
        CookieFileSessionProvider::new(config.session_file.clone(), config.alive_url.clone());
    let pipeline = Pipeline::from_config(&config, Box::new(provider))
        .context("could not create push sinks")?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            relay_warn!("Interrupt received, stopping after the current step");
            trigger.cancel();
        }
    });

    let progress = RecordingProgressSink::new();
    let run_report = pipeline
        .run(&session, &progress, &cancel)
        .await
        .context("portal authentication failed")?;

    report::log_report(&run_report, &progress.stages());
    Ok(report::exit_code(&run_report))
}
