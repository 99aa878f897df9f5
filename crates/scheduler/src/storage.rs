//! Load/save contract for the live item set, plus a JSON file backend.

use std::io::Write;
use std::path::{Path, PathBuf};

use cs_domain::item::ScheduleItem;
use cs_domain::{Error, Result};

#[async_trait::async_trait]
pub trait ItemRepository: Send + Sync {
    /// Every persisted item. An empty store yields an empty vec.
    async fn load(&self) -> Result<Vec<ScheduleItem>>;

    /// Replace the persisted set with `items`.
    async fn save(&self, items: &[ScheduleItem]) -> Result<()>;
}

/// Items as one pretty-printed JSON array. Writes go to a temp file in the
/// same directory and are renamed over the target.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl ItemRepository for JsonFileRepository {
    async fn load(&self) -> Result<Vec<ScheduleItem>> {
        let path = self.path.clone();
        let items = tokio::task::spawn_blocking(move || -> Result<Vec<ScheduleItem>> {
            let data = match std::fs::read_to_string(&path) {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            };
            if data.trim().is_empty() {
                return Ok(Vec::new());
            }
            Ok(serde_json::from_str(&data)?)
        })
        .await
        .map_err(|e| Error::Other(format!("load task failed: {e}")))??;

        tracing::info!(count = items.len(), path = %self.path.display(), "loaded items from disk");
        Ok(items)
    }

    async fn save(&self, items: &[ScheduleItem]) -> Result<()> {
        let json = serde_json::to_vec_pretty(items)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let parent = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            std::fs::create_dir_all(&parent)?;
            let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
            tmp.write_all(&json)?;
            tmp.flush()?;
            tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Other(format!("save task failed: {e}")))??;

        tracing::debug!(count = items.len(), path = %self.path.display(), "persisted items");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cs_domain::item::{ItemSpec, ItemType};

    fn item(title: &str) -> ScheduleItem {
        let now = Utc::now();
        ScheduleItem::from_spec(ItemSpec::new(title, ItemType::BlogPost, now), 3, now)
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("items.json"));
        assert!(repo.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("nested").join("items.json"));
        let items = vec![item("a"), item("b")];
        repo.save(&items).await.unwrap();

        let mut loaded = repo.load().await.unwrap();
        loaded.sort_by(|a, b| a.title.cmp(&b.title));
        assert_eq!(loaded, items);

        // Overwrite shrinks the set.
        repo.save(&items[..1]).await.unwrap();
        assert_eq!(repo.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = JsonFileRepository::new(path).load().await.unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
