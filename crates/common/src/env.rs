//! Environment/runtime helpers
//!
//! Sanity checks to ensure expected directories exist at startup.

use std::path::Path;
use tracing::warn;

/// Ensure the directory holding the key snapshot exists.
///
/// A snapshot path without a parent (a bare file name) resolves to the
/// working directory and needs nothing created.
pub async fn ensure_env(snapshot_path: &str) -> anyhow::Result<()> {
    let parent = match Path::new(snapshot_path).parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => return Ok(()),
    };
    if tokio::fs::metadata(parent).await.is_err() {
        warn!(dir = %parent.display(), "snapshot directory not found; creating it");
    }
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {e}", parent.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_missing_parent_dir() -> anyhow::Result<()> {
        let dir = std::env::temp_dir().join(format!("notifier_env_{}", uuid::Uuid::new_v4()));
        let snapshot = dir.join("nested").join("keys.json");
        ensure_env(snapshot.to_str().unwrap()).await?;
        assert!(tokio::fs::metadata(dir.join("nested")).await?.is_dir());
        let _ = tokio::fs::remove_dir_all(&dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn bare_file_name_needs_nothing() -> anyhow::Result<()> {
        ensure_env("keys.json").await?;
        Ok(())
    }
}
