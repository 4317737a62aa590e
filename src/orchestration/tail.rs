//! Log-tailing monitor
//!
//! Echoes the orchestrator's log file to the terminal while an external
//! command runs. Purely for operator visibility; it never participates in
//! control flow. The task is aborted when the guard drops, so it is torn
//! down on every exit path of the pipeline.

use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Scoped background task following a log file
pub struct LogTailer {
    handle: JoinHandle<()>,
}

impl LogTailer {
    /// Spawn a tailer that prints lines appended to `path`
    pub fn spawn(path: PathBuf) -> Self {
        let handle = tokio::spawn(async move {
            let mut offset = 0usize;
            loop {
                if let Ok(data) = tokio::fs::read(&path).await {
                    // Truncated log means the writer started over
                    if data.len() < offset {
                        offset = 0;
                    }
                    if data.len() > offset {
                        for line in String::from_utf8_lossy(&data[offset..]).lines() {
                            println!("{}", line);
                        }
                        offset = data.len();
                    }
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        });
        Self { handle }
    }
}

impl Drop for LogTailer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn survives_a_missing_log_file_and_aborts_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let tailer = LogTailer::spawn(tmp.path().join("vagrant.log"));
        // The file does not exist yet; the tailer must idle, not panic.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!tailer.handle.is_finished());
        drop(tailer);
    }

    #[tokio::test]
    async fn tailer_tracks_appended_content() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("vagrant.log");
        tokio::fs::write(&log, b"first line\n").await.unwrap();

        let tailer = LogTailer::spawn(log.clone());
        tokio::time::sleep(POLL_INTERVAL * 2).await;
        tokio::fs::write(&log, b"first line\nsecond line\n")
            .await
            .unwrap();
        tokio::time::sleep(POLL_INTERVAL * 2).await;
        assert!(!tailer.handle.is_finished());
    }
}
