//! Local upload storage
//!
//! Uploaded images, staged import files and error reports live flat in one
//! directory that is also served under `/uploads`. Callers only ever handle
//! bare file names relative to that root.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use rand::Rng;
use tracing::debug;

/// URL prefix the upload directory is served under
pub const PUBLIC_PREFIX: &str = "/uploads";

#[derive(Debug, Clone)]
pub struct UploadStorage {
    root: PathBuf,
}

impl UploadStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("cannot create upload dir {}", self.root.display()))
    }

    /// Absolute path of a stored file. Rejects anything that is not a bare
    /// file name.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
        {
            bail!("invalid stored file name: {name}");
        }
        Ok(self.root.join(name))
    }

    /// Store bytes under a fresh `{prefix}-{millis}-{random}{ext}` name
    pub async fn save(&self, prefix: &str, original_name: &str, bytes: &[u8]) -> Result<String> {
        let name = generate_name(prefix, original_name);
        self.write(&name, bytes).await?;
        Ok(name)
    }

    pub async fn write(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(name)?;
        self.ensure_root().await?;
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("cannot write {}", path.display()))?;
        debug!(file = name, size = bytes.len(), "Stored upload");
        Ok(())
    }

    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))
    }

    /// Remove a stored file; a missing file is not an error
    pub async fn remove(&self, name: &str) -> Result<bool> {
        let path = self.resolve(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("cannot remove {}", path.display())),
        }
    }

    #[cfg(test)]
    pub async fn exists(&self, name: &str) -> bool {
        match self.resolve(name) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}

pub fn public_url(name: &str) -> String {
    format!("{PUBLIC_PREFIX}/{name}")
}

/// Stored name behind a `/uploads/...` URL, if it points into the upload dir
pub fn name_from_public_url(url: &str) -> Option<&str> {
    url.strip_prefix(PUBLIC_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|name| !name.is_empty() && !name.contains('/'))
}

fn generate_name(prefix: &str, original_name: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!(
        "{}-{}-{}{}",
        prefix,
        Utc::now().timestamp_millis(),
        suffix,
        extension_of(original_name)
    )
}

/// Lowercased `.ext` of an uploaded name, empty when absent or unusual
fn extension_of(original_name: &str) -> String {
    Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("产品.XLSX"), ".xlsx");
        assert_eq!(extension_of("photo.jpeg"), ".jpeg");
        assert_eq!(extension_of("noext"), "");
        assert_eq!(extension_of("weird.ex t"), "");
    }

    #[test]
    fn test_generated_names_keep_prefix_and_extension() {
        let name = generate_name("import", "货品清单.csv");
        assert!(name.starts_with("import-"));
        assert!(name.ends_with(".csv"));
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let storage = UploadStorage::new("/tmp/uploads");
        assert!(storage.resolve("../etc/passwd").is_err());
        assert!(storage.resolve("a/b.csv").is_err());
        assert!(storage.resolve("").is_err());
        assert_eq!(storage.resolve("a.csv").unwrap(), PathBuf::from("/tmp/uploads/a.csv"));
    }

    #[test]
    fn test_public_url_round_trip() {
        assert_eq!(public_url("logo-1-2.png"), "/uploads/logo-1-2.png");
        assert_eq!(name_from_public_url("/uploads/logo-1-2.png"), Some("logo-1-2.png"));
        assert_eq!(name_from_public_url("https://placehold.co/400x300"), None);
    }

    #[tokio::test]
    async fn test_save_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = UploadStorage::new(dir.path().join("uploads"));

        let name = storage.save("img", "a.png", b"png-bytes").await.unwrap();
        assert!(storage.exists(&name).await);
        assert_eq!(storage.read(&name).await.unwrap(), b"png-bytes");

        assert!(storage.remove(&name).await.unwrap());
        assert!(!storage.remove(&name).await.unwrap());
        assert!(!storage.exists(&name).await);
    }

    #[test]
    fn test_ensure_root_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = UploadStorage::new(dir.path().join("nested").join("uploads"));
        tokio_test::assert_ok!(tokio_test::block_on(storage.ensure_root()));
        assert!(storage.root().is_dir());
    }
}
