//! Egress writer - appends session output to JSONL files
//!
//! One file per message kind, as configured in `[egress]`. Each record is
//! one JSON object per line. Write failures are logged and counted, never
//! fatal: sinks are downstream collaborators.

use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::egress_channel::EgressMessage;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Egress writer actor
pub struct Egress {
    events_file: String,
    tracks_file: String,
    snapshots_file: Option<String>,
    summary_file: String,
    metrics: Arc<Metrics>,
}

impl Egress {
    pub fn new(config: &Config, metrics: Arc<Metrics>) -> Self {
        info!(
            events = %config.events_file(),
            tracks = %config.tracks_file(),
            snapshots = %config.snapshots_file().unwrap_or("-"),
            summary = %config.summary_file(),
            "egress_initialized"
        );
        Self {
            events_file: config.events_file().to_string(),
            tracks_file: config.tracks_file().to_string(),
            snapshots_file: config.snapshots_file().map(str::to_string),
            summary_file: config.summary_file().to_string(),
            metrics,
        }
    }

    /// Run the writer loop
    ///
    /// Runs until every sender is dropped, or until shutdown is signalled,
    /// in which case queued messages are drained first.
    pub async fn run(self, mut rx: mpsc::Receiver<EgressMessage>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(msg) => { self.write(&msg); }
                        None => break,
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("egress_shutdown");
                        while let Ok(msg) = rx.try_recv() {
                            self.write(&msg);
                        }
                        break;
                    }
                }
            }
        }
        info!(written = %self.metrics.egress_written(), "egress_finished");
    }

    /// Write one message to its sink; returns true on success
    pub fn write(&self, msg: &EgressMessage) -> bool {
        let path = match msg {
            EgressMessage::Event(_) => self.events_file.as_str(),
            EgressMessage::Track(_) => self.tracks_file.as_str(),
            EgressMessage::Summary(_) => self.summary_file.as_str(),
            EgressMessage::Snapshots(_) => match self.snapshots_file.as_deref() {
                Some(path) => path,
                None => return true,
            },
        };

        let result = msg
            .to_json()
            .map_err(std::io::Error::from)
            .and_then(|json| append_line(path, &json));

        match result {
            Ok(()) => {
                self.metrics.record_egress_written();
                true
            }
            Err(e) => {
                self.metrics.record_egress_error();
                error!(file = %path, error = %e, "egress_write_failed");
                false
            }
        }
    }
}

/// Append a line to a file, creating parent directories as needed
fn append_line(file_path: &str, line: &str) -> std::io::Result<()> {
    let path = Path::new(file_path);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    writeln!(file, "{}", line)?;
    debug!(file = %file_path, bytes = %line.len(), "egress_written");

    Ok(())
}
