use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

/// 4칸 들여쓰기 JSON 직렬화
pub fn to_pretty_json<T: Serialize + ?Sized>(obj: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    obj.serialize(&mut ser)?;
    Ok(String::from_utf8(buf)?)
}

fn obj_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.json", name))
}

/// `<dir>/<name>.json` 저장
pub async fn save_obj<T: Serialize + ?Sized>(dir: &Path, name: &str, obj: &T) -> Result<PathBuf> {
    let path = obj_path(dir, name);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = to_pretty_json(obj)?;
    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("파일 저장 실패: {}", path.display()))?;
    debug!("💾 {} 저장", path.display());
    Ok(path)
}

/// `<dir>/<name>.json` 로드
pub async fn load_obj<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<T> {
    let path = obj_path(dir, name);
    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("파일 읽기 실패: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("JSON 파싱 실패: {}", path.display()))
}

/// 파일이 없거나 비어 있으면 기본값
pub async fn load_obj_or_default<T: DeserializeOwned + Default>(dir: &Path, name: &str) -> Result<T> {
    let path = obj_path(dir, name);
    match tokio::fs::read_to_string(&path).await {
        Ok(content) if content.trim().is_empty() => Ok(T::default()),
        Ok(content) => serde_json::from_str(&content)
            .with_context(|| format!("JSON 파싱 실패: {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}
