//! `hash`: ed2k links for local files, no network

use crate::discovery::DiscoveredFile;
use crate::progress::{ProgressRenderer, format_bytes, format_throughput};
use anidb_identify_core::{Ed2kHash, Event, EventBus, HashOutcome, HasherPool, PoolConfig};
use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One ed2k link per line
    Text,
    Json,
}

/// Every file's outcome, sorted by path
#[derive(Debug, Default)]
pub struct HashRun {
    pub hashed: Vec<(PathBuf, Ed2kHash)>,
    pub failed: Vec<(PathBuf, String)>,
    pub stopped: Vec<PathBuf>,
    pub elapsed: Duration,
}

impl HashRun {
    pub fn total_bytes(&self) -> u64 {
        self.hashed.iter().map(|(_, hash)| hash.size).sum()
    }
}

#[derive(Serialize)]
struct JsonEntry {
    path: String,
    size: u64,
    ed2k: String,
    link: String,
}

/// Hash `files` with a pool sized by `config`
///
/// Ctrl-C stops every worker; files not finished by then are reported as
/// stopped.
pub async fn hash_files(
    files: &[DiscoveredFile],
    config: &PoolConfig,
    show_progress: bool,
) -> Result<HashRun> {
    let started = Instant::now();
    let bus = EventBus::new();
    let mut events = bus.channel();
    let mut pool = HasherPool::new(config, bus.clone());
    let threads = pool.start(files.len()).context("Failed to start hasher pool")?;
    log::debug!("Hashing {} files on {threads} threads", files.len());
    for file in files {
        pool.add_file(file.path.clone());
    }
    pool.finish_input();

    let mut renderer = show_progress.then(|| ProgressRenderer::new(files.len()));
    let mut run = HashRun::default();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if let Some(renderer) = renderer.as_mut() {
                    renderer.handle(&event);
                }
                match event {
                    Event::FileHashed { path, outcome, .. } => match outcome {
                        HashOutcome::Hashed(hash) => run.hashed.push((path, hash)),
                        HashOutcome::Failed(reason) => run.failed.push((path, reason)),
                        HashOutcome::Stopped => run.stopped.push(path),
                    },
                    Event::PoolFinished => break,
                    _ => {}
                }
            }
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                log::warn!("Interrupted, stopping hashers");
                pool.broadcast_stop_hasher();
            }
        }
    }

    if let Some(renderer) = renderer {
        renderer.finish();
    }
    run.hashed.sort_by(|a, b| a.0.cmp(&b.0));
    run.failed.sort_by(|a, b| a.0.cmp(&b.0));
    run.stopped.sort();
    run.elapsed = started.elapsed();
    Ok(run)
}

/// Links go to stdout, everything else to stderr
pub fn print_hash_run(run: &HashRun, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for (_, hash) in &run.hashed {
                println!("{}", hash.link());
            }
        }
        OutputFormat::Json => {
            let entries: Vec<JsonEntry> = run
                .hashed
                .iter()
                .map(|(path, hash)| JsonEntry {
                    path: path.display().to_string(),
                    size: hash.size,
                    ed2k: hash.hex(),
                    link: hash.link(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }

    for (path, reason) in &run.failed {
        eprintln!("{} {}: {reason}", "failed".red(), path.display());
    }
    if !run.stopped.is_empty() {
        eprintln!("{} {} file(s) not finished", "stopped".yellow(), run.stopped.len());
    }
    let mut summary = format!(
        "{} file(s), {} in {:.2}s",
        run.hashed.len(),
        format_bytes(run.total_bytes()),
        run.elapsed.as_secs_f64()
    );
    if let Some(rate) = format_throughput(run.total_bytes(), run.elapsed) {
        summary.push_str(&format!(" ({rate})"));
    }
    eprintln!("{}", summary.dimmed());
    Ok(())
}
