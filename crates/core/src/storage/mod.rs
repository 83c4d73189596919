//! File-backed persistence: advisory recommendation results, delivery health state and the
//! per-slot run lock.

pub mod lock;
pub mod recommendations;
pub mod status;

use anyhow::Context;
use std::path::Path;

/// Writes through a sibling temp file so readers never see a half-written file.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("failed to write {}", Path::new(&tmp).display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to move into place {}", path.display()))?;
    Ok(())
}
