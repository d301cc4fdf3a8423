use anyhow::{bail, Context, Result};
use chrono::Utc;
use ingest_core::NotificationEvent;
use ingest_engine::{
    nyc_open_data_resources, Delivery, FetchSettings, JsonlDestination, NotificationDispatcher,
    PipelineRunner, ReqwestPageFetcher, RunSummary, TelegramTransport,
};
use ingest_logging::{ingest_error, ingest_info, ingest_warn};

use crate::config::{AppConfig, ConfigError};

/// Runs the ingestion once.
///
/// The chat channel is resolved first: without it nothing can be reported,
/// so its missing fields are only logged. Everything after that is reported
/// to the channel before the error is returned.
pub fn run(config: &AppConfig) -> Result<RunSummary> {
    let dispatcher = build_dispatcher(config)?;

    let token = match config.socrata_token() {
        Ok(token) => token,
        Err(err) => return Err(report_config_error(&dispatcher, config, err)),
    };
    let window = match config.date_window(Utc::now().date_naive()) {
        Ok(window) => window,
        Err(err) => return Err(report_config_error(&dispatcher, config, err)),
    };
    ingest_info!(
        "311 service requests window {} to {}",
        window.start,
        window.stop
    );

    let fetcher = ReqwestPageFetcher::new(&config.socrata.base_url, token, FetchSettings::default())
        .context("failed to build the open data client")?;
    let destination = JsonlDestination::new(&config.output_dir, config.dataset_name.clone());

    let mut runner = PipelineRunner::new(
        config.pipeline_settings(),
        nyc_open_data_resources(window),
        Box::new(fetcher),
        Box::new(destination),
        dispatcher,
    );
    let summary = runner.run().context("pipeline run failed")?;
    for (table, rows) in &summary.rows_per_table {
        ingest_info!("{table}: {rows} rows");
    }
    Ok(summary)
}

/// Resolves every section and prints what is missing. Sends nothing.
pub fn check(config: &AppConfig) -> Result<()> {
    let mut problems = Vec::new();
    if let Err(err) = config.telegram_target() {
        problems.push(err);
    }
    if let Err(err) = config.socrata_token() {
        problems.push(err);
    }
    if let Err(err) = config.date_window(Utc::now().date_naive()) {
        problems.push(err);
    }

    if problems.is_empty() {
        println!("configuration ok");
        return Ok(());
    }
    for problem in &problems {
        println!("{problem}");
    }
    bail!("{} configuration problem(s)", problems.len())
}

/// Sends one Generic message to confirm the chat channel works.
pub fn notify_test(config: &AppConfig, message: &str) -> Result<()> {
    let dispatcher = build_dispatcher(config)?;
    let event = NotificationEvent::Generic {
        message: message.to_string(),
        tip: Some(format!(
            "Sent with notify-test for pipeline {}.",
            config.pipeline_name
        )),
    };
    match dispatcher.notify(&event, &config.app_name) {
        Delivery::Sent => {
            println!("test message sent");
            Ok(())
        }
        Delivery::TransportFailed(err) => bail!("chat api rejected the test message: {err}"),
        Delivery::Failed(reason) => bail!("test message could not be sent: {reason}"),
    }
}

fn build_dispatcher(config: &AppConfig) -> Result<NotificationDispatcher> {
    let target = match config.telegram_target() {
        Ok(target) => target,
        Err(err) => {
            ingest_error!("cannot report to the chat channel: {err}");
            return Err(err.into());
        }
    };
    let transport = TelegramTransport::new(&config.telegram.api_base, &target.bot_token)
        .context("failed to build the chat client")?;
    Ok(NotificationDispatcher::new(
        Box::new(transport),
        target.chat_id,
        config.display_options(),
    ))
}

fn report_config_error(
    dispatcher: &NotificationDispatcher,
    config: &AppConfig,
    err: ConfigError,
) -> anyhow::Error {
    ingest_error!("{err}");
    match err.to_event() {
        Some(event) => {
            let _ = dispatcher.notify(&event, &config.app_name);
        }
        None => ingest_warn!("configuration error not reported to the chat channel"),
    }
    err.into()
}
