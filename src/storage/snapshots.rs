use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;

use super::files::{load_obj_or_default, save_obj};
use crate::types::HarnessError;

/// 초기 스냅샷 이름
pub const INITIAL_SNAPSHOT: &str = "initial";

/// 이름 → 스냅샷 ID 저장소 (`snapshotIds.json`)
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    name: String,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self { dir: dir.into(), name: name.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.name))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn load(&self) -> Result<BTreeMap<String, String>> {
        load_obj_or_default(&self.dir, &self.name).await
    }

    pub async fn get(&self, snapshot: &str) -> Result<String> {
        let ids = self.load().await?;
        ids.get(snapshot)
            .cloned()
            .ok_or_else(|| HarnessError::SnapshotNotFound(snapshot.to_string()).into())
    }

    /// 기존 항목은 유지하고 `snapshot`만 갱신
    pub async fn set(&self, snapshot: &str, id: &str) -> Result<()> {
        let mut ids = self.load().await?;
        ids.insert(snapshot.to_string(), id.to_string());
        save_obj(&self.dir, &self.name, &ids).await?;
        Ok(())
    }

    /// 파일 전체를 교체 (post-network 부트스트랩용)
    pub async fn replace_all(&self, ids: &BTreeMap<String, String>) -> Result<()> {
        save_obj(&self.dir, &self.name, ids).await?;
        Ok(())
    }
}
