//! Filesystem helpers for uploads and produced artifacts.

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Create `dir` and its parents if missing.
pub async fn ensure_dir(dir: impl AsRef<Path>) -> MediaResult<()> {
    let dir = dir.as_ref();
    if !dir.exists() {
        fs::create_dir_all(dir).await?;
    }
    Ok(())
}

/// Persist an uploaded file under `dir`, named by the final path component of
/// `file_name`.
///
/// The bytes land in a temporary sibling first and are renamed into place, so
/// a reader never sees a partially written upload. An existing file with the
/// same name is replaced.
pub async fn save_upload(
    dir: impl AsRef<Path>,
    file_name: &str,
    bytes: &[u8],
) -> MediaResult<PathBuf> {
    let dir = dir.as_ref();
    let name = Path::new(file_name)
        .file_name()
        .ok_or_else(|| MediaError::internal(format!("Unusable upload name: {}", file_name)))?;

    ensure_dir(dir).await?;

    let dst = dir.join(name);
    let tmp_dst = dst.with_extension("part");

    fs::write(&tmp_dst, bytes).await?;
    if let Err(e) = fs::rename(&tmp_dst, &dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(MediaError::from(e));
    }

    tracing::debug!(path = %dst.display(), bytes = bytes.len(), "Upload saved");
    Ok(dst)
}

/// True when `path` is a regular file with at least one byte.
pub async fn is_non_empty_file(path: impl AsRef<Path>) -> bool {
    match fs::metadata(path.as_ref()).await {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

/// Delete all but the `keep` most recently modified files in `dir` with the
/// given extension. Returns how many were removed.
///
/// Files that vanish or cannot be removed meanwhile are skipped.
pub async fn prune_oldest(
    dir: impl AsRef<Path>,
    extension: &str,
    keep: usize,
) -> MediaResult<usize> {
    let dir = dir.as_ref();
    let mut entries = fs::read_dir(dir).await?;

    let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some(extension) {
            continue;
        }
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if meta.is_file() {
            files.push((meta.modified().unwrap_or(SystemTime::UNIX_EPOCH), path));
        }
    }

    // newest first
    files.sort_by(|a, b| b.cmp(a));

    let mut removed = 0;
    for (_, path) in files.into_iter().skip(keep) {
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Pruned old artifact");
                removed += 1;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to prune artifact")
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_upload_creates_dir_and_overwrites() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("uploads");

        let first = save_upload(&dir, "clip.mp4", b"first").await.unwrap();
        assert_eq!(first, dir.join("clip.mp4"));

        let second = save_upload(&dir, "clip.mp4", b"second!").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read(&second).await.unwrap(), b"second!");
        assert!(!dir.join("clip.part").exists());
    }

    #[tokio::test]
    async fn test_save_upload_uses_final_component() {
        let temp = TempDir::new().unwrap();

        let path = save_upload(temp.path(), "../../nested/clip.mp4", b"x")
            .await
            .unwrap();
        assert_eq!(path, temp.path().join("clip.mp4"));
    }

    #[tokio::test]
    async fn test_save_upload_rejects_nameless_path() {
        let temp = TempDir::new().unwrap();
        assert!(save_upload(temp.path(), "..", b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_prune_oldest_keeps_newest() {
        let temp = TempDir::new().unwrap();
        let base = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);

        for (i, name) in ["a.mp4", "b.mp4", "c.mp4", "d.mp4"].iter().enumerate() {
            let path = temp.path().join(name);
            let file = std::fs::File::create(&path).unwrap();
            file.set_modified(base + std::time::Duration::from_secs(i as u64 * 60))
                .unwrap();
        }
        std::fs::write(temp.path().join("notes.txt"), b"keep me").unwrap();

        let removed = prune_oldest(temp.path(), "mp4", 2).await.unwrap();

        assert_eq!(removed, 2);
        assert!(!temp.path().join("a.mp4").exists());
        assert!(!temp.path().join("b.mp4").exists());
        assert!(temp.path().join("c.mp4").exists());
        assert!(temp.path().join("d.mp4").exists());
        assert!(temp.path().join("notes.txt").exists());

        assert_eq!(prune_oldest(temp.path(), "mp4", 2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_is_non_empty_file() {
        let temp = TempDir::new().unwrap();
        let empty = temp.path().join("empty.mp4");
        let full = temp.path().join("full.mp4");
        fs::write(&empty, b"").await.unwrap();
        fs::write(&full, b"data").await.unwrap();

        assert!(!is_non_empty_file(&empty).await);
        assert!(is_non_empty_file(&full).await);
        assert!(!is_non_empty_file(temp.path().join("missing.mp4")).await);
        assert!(!is_non_empty_file(temp.path()).await);
    }
}
