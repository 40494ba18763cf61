//! Cloud API client abstraction

use super::model::{EdgeObject, Model};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source of the edge object and its model
#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn load_object(&self, id: &str) -> Result<EdgeObject>;

    async fn load_model(&self, id: &str) -> Result<Model>;
}

/// Cloud data mirrored on disk
///
/// ```text
/// <root>/objects/<object id>.json
/// <root>/models/<model id>.json
/// ```
pub struct FileApi {
    root: PathBuf,
}

impl FileApi {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        debug!("Loading {}", path.display());
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        serde_json::from_slice(&raw).with_context(|| format!("parse {}", path.display()))
    }
}

#[async_trait]
impl CloudApi for FileApi {
    async fn load_object(&self, id: &str) -> Result<EdgeObject> {
        let path = self.root.join("objects").join(format!("{}.json", id));
        self.read_json(&path).await
    }

    async fn load_model(&self, id: &str) -> Result<Model> {
        let path = self.root.join("models").join(format!("{}.json", id));
        self.read_json(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_api_loads_object_and_model() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("objects")).unwrap();
        std::fs::create_dir_all(dir.path().join("models")).unwrap();
        std::fs::write(
            dir.path().join("objects/edge-1.json"),
            r#"{"id":"edge-1","model":"thermo","config":{"mac":"aa:bb"}}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("models/thermo.json"),
            r#"{"id":"thermo","actions":[{"parent":"edge.temp","read":"value"}]}"#,
        )
        .unwrap();

        let api = FileApi::new(dir.path());
        let object = api.load_object("edge-1").await.unwrap();
        assert_eq!(object.model, "thermo");

        let model = api.load_model(&object.model).await.unwrap();
        assert_eq!(model.actions.len(), 1);
        assert!(model.interactions.is_empty());
    }

    #[tokio::test]
    async fn test_missing_object_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileApi::new(dir.path()).load_object("nope").await.unwrap_err();
        assert!(err.to_string().contains("nope.json"));
    }
}
