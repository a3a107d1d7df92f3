// src/services/action_log.rs
use crate::errors::EditorError;
use crate::models::ImageAction;
use log::{info, warn};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Append-only audit log stored as JSON Lines.
///
/// Appends are sequential writes serialized through one mutex, so concurrent
/// requests never lose entries. Readers only ever see the newest `cap`
/// records. The file itself may run up to `cap + compaction_slack` lines before
/// it is rewritten (temp file + rename) down to `cap`.
pub struct ActionLog {
    path: PathBuf,
    cap: usize,
    compaction_slack: usize,
    state: Mutex<LogState>,
}

struct LogState {
    lines: usize,
}

impl ActionLog {
    pub async fn open(path: impl Into<PathBuf>, cap: usize) -> Result<Self, EditorError> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }

        let lines = match fs::read_to_string(&path).await {
            Ok(content) => content.lines().filter(|l| !l.trim().is_empty()).count(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fs::write(&path, b"").await?;
                0
            }
            Err(e) => return Err(e.into()),
        };

        info!("Action log at {} holds {} records", path.display(), lines.min(cap));

        Ok(Self {
            path,
            cap,
            compaction_slack: cap / 10,
            state: Mutex::new(LogState { lines }),
        })
    }

    pub fn with_compaction_slack(mut self, slack: usize) -> Self {
        self.compaction_slack = slack;
        self
    }

    pub async fn append(&self, action: &ImageAction) -> Result<(), EditorError> {
        let mut line = serde_json::to_string(action)?;
        line.push('\n');

        let mut state = self.state.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        state.lines += 1;

        if state.lines > self.cap + self.compaction_slack {
            self.compact(&mut state).await?;
        }
        Ok(())
    }

    /// The newest `limit` records, oldest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<ImageAction>, EditorError> {
        let _guard = self.state.lock().await;
        let mut actions = self.read_visible().await?;
        let skip = actions.len().saturating_sub(limit);
        Ok(actions.split_off(skip))
    }

    pub async fn query_by_image(&self, image_id: &str) -> Result<Vec<ImageAction>, EditorError> {
        let _guard = self.state.lock().await;
        Ok(self
            .read_visible()
            .await?
            .into_iter()
            .filter(|a| a.image_id == image_id)
            .collect())
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.lines.min(self.cap)
    }

    async fn compact(&self, state: &mut LogState) -> Result<(), EditorError> {
        let kept = self.read_visible().await?;

        let mut content = String::new();
        for action in &kept {
            content.push_str(&serde_json::to_string(action)?);
            content.push('\n');
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &self.path).await?;

        state.lines = kept.len();
        Ok(())
    }

    async fn read_visible(&self) -> Result<Vec<ImageAction>, EditorError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(EditorError::Io(format!(
                    "Failed to read action log {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let mut actions: Vec<ImageAction> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(n, line)| match serde_json::from_str(line) {
                Ok(action) => Some(action),
                Err(e) => {
                    warn!("Skipping corrupt action log line {}: {}", n + 1, e);
                    None
                }
            })
            .collect();

        let skip = actions.len().saturating_sub(self.cap);
        Ok(actions.split_off(skip))
    }
}
