//! Run log
//!
//! Appends one JSON line per pipeline message to
//! `<state_dir>/cachepack/runs.log`, tagged with a per-run id so that
//! interleaved runs can be told apart. Enabled by `general.run_log`.
//!
//! Lines are handed to a background writer task, so [`Reporter::report`]
//! never blocks on disk IO. Write failures are logged and otherwise ignored.

use crate::config::{schema::Config, ConfigManager};
use crate::pipeline::{PipelineMessage, Reporter};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

/// JSON-lines sink for pipeline messages
pub struct RunLog {
    run_id: Uuid,
    sender: Mutex<Option<mpsc::UnboundedSender<String>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl RunLog {
    /// Create a run log from config. Must be called inside a tokio runtime.
    pub fn new(config: &Config) -> Self {
        Self::open(config.general.run_log, ConfigManager::run_log_path())
    }

    fn open(enabled: bool, path: PathBuf) -> Self {
        let run_id = Uuid::new_v4();
        if !enabled {
            return Self {
                run_id,
                sender: Mutex::new(None),
                writer: Mutex::new(None),
            };
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_lines(path, rx));
        Self {
            run_id,
            sender: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Record a lifecycle event that is not a pipeline message
    pub fn event(&self, event: &str, data: serde_json::Value) {
        self.push(serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "run_id": self.run_id,
            "event": event,
            "data": data,
        }));
    }

    /// Stop accepting lines and wait until everything queued is on disk
    pub async fn finish(&self) {
        let sender = self.sender.lock().ok().and_then(|mut s| s.take());
        drop(sender);

        let writer = self.writer.lock().ok().and_then(|mut w| w.take());
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                warn!("Run log writer stopped unexpectedly: {}", e);
            }
        }
    }

    fn push(&self, entry: serde_json::Value) {
        let Ok(guard) = self.sender.lock() else {
            return;
        };
        let Some(tx) = guard.as_ref() else {
            return;
        };

        match serde_json::to_string(&entry) {
            Ok(mut line) => {
                line.push('\n');
                // Receiver only goes away after finish()
                let _ = tx.send(line);
            }
            Err(e) => warn!("Failed to serialize run log entry: {}", e),
        }
    }
}

impl Reporter for RunLog {
    fn report(&self, message: PipelineMessage) {
        let mut entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "run_id": self.run_id,
            "event": "message",
            "level": message.level(),
            "source": message.source(),
            "text": message.text(),
        });
        if let Some(step) = message.install_step() {
            entry["install_step"] = serde_json::json!(step);
        }
        self.push(entry);
    }
}

async fn write_lines(path: PathBuf, mut rx: mpsc::UnboundedReceiver<String>) {
    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!("Failed to create run log directory: {}", e);
            return;
        }
    }

    let mut file = match OpenOptions::new().create(true).append(true).open(&path).await {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to open run log {}: {}", path.display(), e);
            return;
        }
    };

    while let Some(line) = rx.recv().await {
        if let Err(e) = file.write_all(line.as_bytes()).await {
            warn!("Failed to write run log: {}", e);
            return;
        }
    }

    if let Err(e) = file.flush().await {
        warn!("Failed to flush run log: {}", e);
    }
}
