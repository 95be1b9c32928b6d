use crate::error::{ChannelError, Result};
use crate::types::LogEntry;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Append-only per-channel log of message content hashes. One line of JSON per entry;
/// append-only so concurrent readers never observe a torn write larger than one line.
pub struct ChannelLog {
    path: PathBuf,
}

impl ChannelLog {
    pub fn new(store_root: &Path, channel_id: &str) -> Self {
        Self {
            path: store_root.join("channels").join(channel_id).join("log"),
        }
    }

    pub async fn append(&self, entry: &LogEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn read_all(&self) -> Result<Vec<LogEntry>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let text = String::from_utf8_lossy(&bytes);
        let mut entries = Vec::new();
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: LogEntry = serde_json::from_str(line).map_err(|e| {
                ChannelError::CorruptLog {
                    path: self.path.display().to_string(),
                    line: i,
                    reason: e.to_string(),
                }
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

/// Merges the logs of multiple channels into a single timestamp-ordered
/// stream, deduplicating by content hash and breaking ties by
/// lexicographic content-hash order.
pub async fn merge_channel_logs(store_root: &Path, channel_ids: &[String]) -> Result<Vec<LogEntry>> {
    let mut all = Vec::new();
    for id in channel_ids {
        all.extend(ChannelLog::new(store_root, id).read_all().await?);
    }
    all.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.content_hash.cmp(&b.content_hash))
    });
    all.dedup_by(|a, b| a.content_hash == b.content_hash);
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hash: &str, ts: i64) -> LogEntry {
        LogEntry {
            content_hash: hash.to_string(),
            timestamp: ts,
            author_id: "u1".to_string(),
        }
    }

    #[tokio::test]
    async fn append_then_read_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = ChannelLog::new(dir.path(), "t1");
        log.append(&entry("h1", 1)).await.unwrap();
        log.append(&entry("h2", 2)).await.unwrap();
        log.append(&entry("h3", 3)).await.unwrap();

        let entries = log.read_all().await.unwrap();
        let hashes: Vec<&str> = entries.iter().map(|e| e.content_hash.as_str()).collect();
        assert_eq!(hashes, vec!["h1", "h2", "h3"]);
    }

    #[tokio::test]
    async fn read_all_on_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = ChannelLog::new(dir.path(), "never-posted");
        assert!(log.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_log_line_surfaces_corrupt_log_error() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("channels").join("t1").join("log");
        tokio::fs::create_dir_all(log_path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&log_path, b"{not json}\n").await.unwrap();

        let log = ChannelLog::new(dir.path(), "t1");
        let err = log.read_all().await.unwrap_err();
        assert!(matches!(err, ChannelError::CorruptLog { line: 0, .. }));
    }

    #[tokio::test]
    async fn merge_orders_by_timestamp_across_channels_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        ChannelLog::new(dir.path(), "a").append(&entry("h1", 10)).await.unwrap();
        ChannelLog::new(dir.path(), "a").append(&entry("h3", 30)).await.unwrap();
        ChannelLog::new(dir.path(), "b").append(&entry("h2", 20)).await.unwrap();
        // duplicate content hash posted into a second channel must collapse to one entry
        ChannelLog::new(dir.path(), "b").append(&entry("h1", 10)).await.unwrap();

        let merged = merge_channel_logs(dir.path(), &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        let hashes: Vec<&str> = merged.iter().map(|e| e.content_hash.as_str()).collect();
        assert_eq!(hashes, vec!["h1", "h2", "h3"]);
    }

    #[tokio::test]
    async fn merge_breaks_timestamp_ties_by_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        ChannelLog::new(dir.path(), "a").append(&entry("zzz", 5)).await.unwrap();
        ChannelLog::new(dir.path(), "b").append(&entry("aaa", 5)).await.unwrap();

        let merged = merge_channel_logs(dir.path(), &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        let hashes: Vec<&str> = merged.iter().map(|e| e.content_hash.as_str()).collect();
        assert_eq!(hashes, vec!["aaa", "zzz"]);
    }
}
