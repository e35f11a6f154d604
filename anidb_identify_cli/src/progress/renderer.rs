//! Draws hashing and request progress from the event bus
//!
//! One bar per hasher worker shows the file it is on, an overall bar counts
//! finished files, and a spinner follows packet replies during identify.

use anidb_identify_core::{Event, HashOutcome};
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const FILES_TEMPLATE: &str = "{prefix:>8} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files";
const WORKER_TEMPLATE: &str = "{prefix:>8} [{bar:40.green/white}] {percent:>3}% {wide_msg}";
const NETWORK_TEMPLATE: &str = "{spinner:.cyan} {msg}";

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub struct ProgressRenderer {
    multi: MultiProgress,
    files: ProgressBar,
    workers: HashMap<usize, ProgressBar>,
    network: Option<ProgressBar>,
    replies: u64,
}

impl ProgressRenderer {
    /// Draw to stderr, expecting `file_count` files to be hashed
    pub fn new(file_count: usize) -> Self {
        Self::with_target(file_count, ProgressDrawTarget::stderr())
    }

    /// Track everything but draw nothing
    pub fn hidden(file_count: usize) -> Self {
        Self::with_target(file_count, ProgressDrawTarget::hidden())
    }

    fn with_target(file_count: usize, target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);
        let files = multi.add(ProgressBar::new(file_count as u64));
        files.set_style(style(FILES_TEMPLATE));
        files.set_prefix("hashed");
        Self {
            multi,
            files,
            workers: HashMap::new(),
            network: None,
            replies: 0,
        }
    }

    pub fn files_done(&self) -> u64 {
        self.files.position()
    }

    pub fn replies(&self) -> u64 {
        self.replies
    }

    fn worker_bar(&mut self, worker: usize) -> &ProgressBar {
        let multi = &self.multi;
        self.workers.entry(worker).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(1));
            bar.set_style(style(WORKER_TEMPLATE));
            bar.set_prefix(format!("hasher-{worker}"));
            bar
        })
    }

    fn println(&self, line: String) {
        // Only fails when the draw target is gone; nothing to do then
        let _ = self.multi.println(line);
    }

    pub fn handle(&mut self, event: &Event) {
        match event {
            Event::Progress {
                worker,
                path,
                parts_done,
                parts_total,
            } => {
                let bar = self.worker_bar(*worker);
                bar.set_length(*parts_total);
                bar.set_position(*parts_done);
                bar.set_message(file_name(path));
            }
            Event::FileHashed {
                worker,
                path,
                outcome,
            } => {
                self.files.inc(1);
                if let Some(bar) = self.workers.get(worker) {
                    bar.set_message("");
                }
                if let HashOutcome::Failed(reason) = outcome {
                    self.println(format!("{} {}: {reason}", "✗".red(), file_name(path)));
                }
            }
            Event::PoolFinished => {
                for (_, bar) in self.workers.drain() {
                    bar.finish_and_clear();
                }
                self.files.finish();
            }
            Event::PacketReply {
                tag,
                command,
                code,
                text,
            } => {
                self.replies += 1;
                let spinner = self.network.get_or_insert_with(|| {
                    let spinner = self.multi.add(ProgressBar::new_spinner());
                    spinner.set_style(style(NETWORK_TEMPLATE));
                    spinner.enable_steady_tick(Duration::from_millis(120));
                    spinner
                });
                let code = code.map_or_else(|| "-".to_string(), |code| code.to_string());
                spinner.set_message(format!(
                    "{} replies, last: {command} #{tag} {code} {text}",
                    self.replies
                ));
            }
            Event::Banned { reason } => {
                self.println(format!("{} banned: {reason}", "✗".red().bold()));
            }
            Event::Notification(notification) => {
                self.println(format!(
                    "{} {} ({})",
                    "✉".yellow(),
                    notification.title,
                    notification.from_user_name
                ));
            }
        }
    }

    pub fn finish(self) {
        for bar in self.workers.values() {
            bar.finish_and_clear();
        }
        if let Some(spinner) = &self.network {
            spinner.finish_and_clear();
        }
        if !self.files.is_finished() {
            self.files.abandon();
        }
    }
}

/// Render events until `stop` fires or the bus goes away
pub async fn render_events(
    mut events: mpsc::UnboundedReceiver<Event>,
    mut stop: oneshot::Receiver<()>,
    mut renderer: ProgressRenderer,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => renderer.handle(&event),
                None => break,
            },
            _ = &mut stop => break,
        }
    }
    // Drain what was published before the stop signal
    while let Ok(event) = events.try_recv() {
        renderer.handle(&event);
    }
    renderer.finish();
}
