use crate::delivery::backup::safe_subject;
use crate::delivery::{Channel, Notification};
use crate::time::tw_market::taipei_offset;
use anyhow::Context;
use chrono::Utc;
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Writes each notification to its own text file. Works without any network.
#[derive(Debug, Clone)]
pub struct FileChannel {
    dir: PathBuf,
}

impl FileChannel {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait::async_trait]
impl Channel for FileChannel {
    fn id(&self) -> &str {
        "file"
    }

    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let now = Utc::now().with_timezone(&taipei_offset()?);
        let urgency = if notification.urgent { "URGENT_" } else { "" };
        let stem = format!(
            "{urgency}{}_{}",
            now.format("%Y%m%d_%H%M%S"),
            safe_subject(&notification.subject)
        );

        let mut path = self.dir.join(format!("{stem}.txt"));
        let mut n = 1;
        while tokio::fs::try_exists(&path).await.unwrap_or(false) {
            n += 1;
            path = self.dir.join(format!("{stem}_{n}.txt"));
        }

        let rule = "-".repeat(50);
        let mut out = String::new();
        let _ = writeln!(out, "主題: {}", notification.subject);
        let _ = writeln!(out, "時間: {}", now.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "緊急: {}", if notification.urgent { "是" } else { "否" });
        let _ = writeln!(out, "{rule}\n");
        let _ = writeln!(out, "{}\n", notification.body_text);
        if let Some(html) = &notification.body_html {
            let _ = writeln!(out, "{rule}");
            let _ = writeln!(out, "HTML內容:");
            out.push_str(html);
        }

        tokio::fs::write(&path, out)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "notification saved to file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_urgent_file_with_html_section() {
        let dir = tempfile::tempdir().unwrap();
        let ch = FileChannel::new(dir.path().join("notifications"));
        let note = Notification::text("系統通知", "本文")
            .with_html("<p>本文</p>")
            .urgent(true);

        ch.send(&note).await.unwrap();
        ch.send(&note).await.unwrap();

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(ch.dir()).await.unwrap();
        while let Some(e) = entries.next_entry().await.unwrap() {
            names.push(e.path());
        }
        assert_eq!(names.len(), 2);

        let path = &names[0];
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("URGENT_"), "{name}");
        assert!(name.ends_with("_系統通知.txt") || name.ends_with("_系統通知_2.txt"), "{name}");

        let body = tokio::fs::read_to_string(path).await.unwrap();
        assert!(body.starts_with("主題: 系統通知\n"));
        assert!(body.contains("緊急: 是"));
        assert!(body.contains("HTML內容:\n<p>本文</p>"));
    }
}
