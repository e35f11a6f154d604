//! `identify`: hash, look up locally, ask the server about the rest

use super::LAST_IDENTIFY_KEY;
use crate::progress::{ProgressRenderer, render_events};
use anidb_identify_core::database::models::time_utils;
use anidb_identify_core::protocol::{SessionHandle, Transport};
use anidb_identify_core::{
    ApiClient, Database, EventBus, IdentifyCoordinator, IdentifyOptions, IdentifySummary,
    PipelineConfig, UdpTransport,
};
use anyhow::{Context, Result, bail};
use colored::Colorize;
use std::path::PathBuf;
use tokio::sync::oneshot;

fn require_credentials(config: &PipelineConfig) -> Result<()> {
    if !config.protocol.has_credentials() {
        bail!(
            "No AniDB credentials configured; set protocol.username and protocol.password \
             in the config file or ANIDB_PROTOCOL__USERNAME / ANIDB_PROTOCOL__PASSWORD"
        );
    }
    Ok(())
}

/// Run against the configured AniDB server
pub async fn identify(
    config: &PipelineConfig,
    paths: &[PathBuf],
    options: &IdentifyOptions,
    show_progress: bool,
) -> Result<IdentifySummary> {
    require_credentials(config)?;
    let protocol = &config.protocol;
    let transport = UdpTransport::connect(&protocol.host, protocol.port, protocol.local_port)
        .await
        .with_context(|| format!("Failed to reach {}:{}", protocol.host, protocol.port))?;
    identify_with(config, transport, paths, options, show_progress).await
}

/// Run over any transport
///
/// The client is shut down before returning, whether the run succeeded or
/// not. A ban is an error.
pub async fn identify_with<T: Transport + 'static>(
    config: &PipelineConfig,
    transport: T,
    paths: &[PathBuf],
    options: &IdentifyOptions,
    show_progress: bool,
) -> Result<IdentifySummary> {
    require_credentials(config)?;
    let database = Database::open(&config.storage.database_path)
        .await
        .with_context(|| {
            format!(
                "Failed to open database {}",
                config.storage.database_path.display()
            )
        })?;
    let events = EventBus::new();
    // Subscribe before anything can publish
    let progress = show_progress.then(|| {
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(render_events(
            events.channel(),
            stopped,
            ProgressRenderer::new(paths.len()),
        ));
        (stop, task)
    });

    let store = database.connect().await?;
    let client = ApiClient::new(
        config.protocol.clone(),
        transport,
        store,
        SessionHandle::new(),
        events.clone(),
    )
    .await
    .context("Failed to start the API client")?
    .spawn();

    let coordinator = IdentifyCoordinator::new(database.clone(), events, config.hasher.clone());
    let outcome = tokio::select! {
        outcome = coordinator.run(paths, &client, options) => outcome.context("Identify run failed"),
        _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!(
            "Interrupted; unanswered requests stay queued for the next run"
        )),
    };

    if let Some((stop, task)) = progress {
        let _ = stop.send(());
        let _ = task.await;
    }
    client
        .shutdown()
        .await
        .context("API client stopped with an error")?;

    let summary = outcome?;
    let mut store = database.connect().await?;
    store
        .settings()
        .set(LAST_IDENTIFY_KEY, &time_utils::now_millis().to_string())
        .await?;
    store.close().await?;
    Ok(summary)
}

pub fn print_summary(summary: &IdentifySummary) {
    let line = |label: &str, value: usize| {
        if value > 0 {
            eprintln!("  {label:<20} {value}");
        }
    };
    eprintln!("{}", "Identify summary".bold().green());
    line("files", summary.files);
    line("hash from storage", summary.cached);
    line("hash reused", summary.reused);
    line("hashed", summary.hashed);
    line("already known", summary.already_known);
    line("requested", summary.requested);
    line("confirmed", summary.confirmed);
    line("mylist added", summary.mylist_added);
    line("details requested", summary.details_requested);
    if summary.not_found > 0 {
        eprintln!("  {:<20} {}", "not found".yellow(), summary.not_found);
    }
    if summary.hash_failed + summary.failed_requests > 0 {
        eprintln!("  {:<20} {}", "hash failed".red(), summary.hash_failed);
        eprintln!("  {:<20} {}", "failed requests".red(), summary.failed_requests);
    }
}
