use anyhow::Context;
use chrono::NaiveDate;
use fs2::FileExt;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::time::TimeSlot;

/// Guard against overlapping runs of the same slot and date. Holds an OS-level exclusive lock
/// on `{dir}/{YYYYMMDD}_{slot}.lock`; the OS drops it when the process exits, so a crashed run
/// never blocks the next one. The file itself is left in place.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    file: File,
}

impl RunLock {
    pub fn path_for(dir: &Path, as_of_date: NaiveDate, time_slot: TimeSlot) -> PathBuf {
        dir.join(format!("{}_{}.lock", as_of_date.format("%Y%m%d"), time_slot.as_str()))
    }

    /// `Ok(None)` when another run holds the lock.
    pub async fn try_acquire(
        dir: &Path,
        as_of_date: NaiveDate,
        time_slot: TimeSlot,
    ) -> anyhow::Result<Option<Self>> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let path = Self::path_for(dir, as_of_date, time_slot);
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("failed to open lock {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { path, file })),
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to lock {}", path.display())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to release run lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    #[tokio::test]
    async fn second_acquire_fails_until_release() {
        let dir = tempfile::tempdir().unwrap();

        let first = RunLock::try_acquire(dir.path(), date(), TimeSlot::MidDayScan)
            .await
            .unwrap();
        assert!(first.is_some());
        assert!(RunLock::try_acquire(dir.path(), date(), TimeSlot::MidDayScan)
            .await
            .unwrap()
            .is_none());
        // Other slots are independent.
        assert!(RunLock::try_acquire(dir.path(), date(), TimeSlot::AfternoonScan)
            .await
            .unwrap()
            .is_some());

        drop(first);
        assert!(RunLock::try_acquire(dir.path(), date(), TimeSlot::MidDayScan)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn leftover_file_from_killed_run_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        // A run killed mid-flight leaves the file behind but its lock died with the process.
        let path = RunLock::path_for(dir.path(), date(), TimeSlot::MidDayScan);
        std::fs::write(&path, b"").unwrap();

        let lock = RunLock::try_acquire(dir.path(), date(), TimeSlot::MidDayScan)
            .await
            .unwrap()
            .expect("stale lock file must be reacquirable");
        assert_eq!(lock.path(), path.as_path());
    }

    #[tokio::test]
    async fn lock_dies_with_its_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = RunLock::path_for(dir.path(), date(), TimeSlot::MidDayScan);

        // Another process holding the lock, simulated by a separate open file description.
        let holder = File::create(&path).unwrap();
        holder.try_lock_exclusive().unwrap();
        assert!(RunLock::try_acquire(dir.path(), date(), TimeSlot::MidDayScan)
            .await
            .unwrap()
            .is_none());

        // Process death closes the descriptor without any unlock call.
        drop(holder);
        assert!(RunLock::try_acquire(dir.path(), date(), TimeSlot::MidDayScan)
            .await
            .unwrap()
            .is_some());
    }
}
