//! State snapshot kept next to the cloud data between runs

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::Path;
use tracing::info;

pub const SNAPSHOT_FILE: &str = "state.json";

/// Read a snapshot; a missing file is an empty tree
pub async fn load_snapshot(path: &Path) -> Result<Map<String, Value>> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No state snapshot at {}", path.display());
            return Ok(Map::new());
        }
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    serde_json::from_slice(&raw).with_context(|| format!("parse {}", path.display()))
}

pub async fn save_snapshot(path: &Path, snapshot: &Map<String, Value>) -> Result<()> {
    let raw = serde_json::to_vec_pretty(snapshot)?;
    tokio::fs::write(path, raw)
        .await
        .with_context(|| format!("write {}", path.display()))?;
    info!("State snapshot saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_snapshot_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);

        assert!(load_snapshot(&path).await.unwrap().is_empty());

        let mut snapshot = Map::new();
        snapshot.insert("sensor".into(), json!({"temp": 25}));
        save_snapshot(&path, &snapshot).await.unwrap();

        assert_eq!(load_snapshot(&path).await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE);
        std::fs::write(&path, b"[1, 2").unwrap();

        assert!(load_snapshot(&path).await.is_err());
    }
}
