//! Publishing of the certificate and key PEM files
//!
//! Both files are staged as hidden temporaries next to their final location and
//! only renamed into place once both are fully written and synced. The previous
//! certificate is kept as a hidden backup until the key rename succeeds, so a failed
//! key rename puts it back instead of leaving a mismatched pair behind.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};

use crate::error::WriteError;

/// Writes a certificate/key pair, all-or-nothing from the caller's view
#[async_trait]
pub trait CertificateWriter: Send + Sync {
    async fn write(&self, cert: &str, key: &str) -> Result<(), WriteError>;
}

/// Writer targeting fixed PEM file paths in an output directory
#[derive(Debug, Clone)]
pub struct PemFileWriter {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl PemFileWriter {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    /// Writer for `cert_name` and `key_name` inside `output_dir`
    pub fn in_dir(output_dir: &Path, cert_name: &str, key_name: &str) -> Self {
        Self::new(output_dir.join(cert_name), output_dir.join(key_name))
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// `dir/name` -> `dir/.name.tmp`
    fn staging_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{}.tmp", name))
    }

    async fn stage(path: &Path, contents: &str, private: bool) -> Result<(), WriteError> {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            if private {
                options.mode(0o600);
            }
        }
        #[cfg(not(unix))]
        let _ = private;

        let mut file = options
            .open(path)
            .await
            .map_err(|e| WriteError::io(path, e))?;
        file.write_all(contents.as_bytes())
            .await
            .map_err(|e| WriteError::io(path, e))?;
        file.sync_all().await.map_err(|e| WriteError::io(path, e))?;
        Ok(())
    }

    /// `dir/name` -> `dir/.name.bak`
    fn backup_path(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{}.bak", name))
    }

    /// Keep the published certificate reachable until the key is in place too.
    ///
    /// Returns `false` when there is no previous certificate file to restore.
    async fn back_up(path: &Path, backup: &Path) -> Result<bool, WriteError> {
        match tokio::fs::symlink_metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Ok(false),
        }
        Self::discard(&[backup]).await;
        if let Err(e) = tokio::fs::hard_link(path, backup).await {
            debug!(error = %e, "Hard link unavailable, copying certificate backup");
            tokio::fs::copy(path, backup)
                .await
                .map_err(|e| WriteError::io(backup, e))?;
        }
        Ok(true)
    }

    async fn discard(paths: &[&Path]) {
        for path in paths {
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove staged file");
                }
            }
        }
    }

    /// Put the previous certificate back after the key could not be replaced
    async fn roll_back_cert(&self, backup: &Path, had_previous: bool) {
        let restored = if had_previous {
            tokio::fs::rename(backup, &self.cert_path).await
        } else {
            tokio::fs::remove_file(&self.cert_path).await
        };
        if let Err(e) = restored {
            error!(
                cert = %self.cert_path.display(),
                error = %e,
                "Failed to roll back certificate after key write failure"
            );
        }
    }
}

#[async_trait]
impl CertificateWriter for PemFileWriter {
    async fn write(&self, cert: &str, key: &str) -> Result<(), WriteError> {
        let cert_tmp = Self::staging_path(&self.cert_path);
        let key_tmp = Self::staging_path(&self.key_path);
        let cert_backup = Self::backup_path(&self.cert_path);
        // Leftovers from an interrupted run would keep their old permissions
        Self::discard(&[&cert_tmp, &key_tmp]).await;

        let staged = async {
            Self::stage(&cert_tmp, cert, false).await?;
            Self::stage(&key_tmp, key, true).await
        }
        .await;
        if let Err(e) = staged {
            Self::discard(&[&cert_tmp, &key_tmp]).await;
            return Err(e);
        }

        let had_previous = match Self::back_up(&self.cert_path, &cert_backup).await {
            Ok(had_previous) => had_previous,
            Err(e) => {
                Self::discard(&[&cert_tmp, &key_tmp]).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&cert_tmp, &self.cert_path).await {
            Self::discard(&[&cert_tmp, &key_tmp, &cert_backup]).await;
            return Err(WriteError::io(&self.cert_path, e));
        }
        if let Err(e) = tokio::fs::rename(&key_tmp, &self.key_path).await {
            self.roll_back_cert(&cert_backup, had_previous).await;
            Self::discard(&[&key_tmp, &cert_backup]).await;
            return Err(WriteError::io(&self.key_path, e));
        }
        Self::discard(&[&cert_backup]).await;

        debug!(
            cert = %self.cert_path.display(),
            key = %self.key_path.display(),
            "Certificate files written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_staging_path() {
        let staged = PemFileWriter::staging_path(Path::new("/output/certs/cert.pem"));
        assert_eq!(staged, PathBuf::from("/output/certs/.cert.pem.tmp"));
    }

    #[tokio::test]
    async fn test_write_creates_both_files() {
        let temp_dir = TempDir::new().unwrap();
        let writer = PemFileWriter::in_dir(temp_dir.path(), "cert.pem", "key.pem");

        writer.write("CERT", "KEY").await.unwrap();

        assert_eq!(std::fs::read_to_string(writer.cert_path()).unwrap(), "CERT");
        assert_eq!(std::fs::read_to_string(writer.key_path()).unwrap(), "KEY");
    }

    #[tokio::test]
    async fn test_write_overwrites_and_leaves_no_staging_files() {
        let temp_dir = TempDir::new().unwrap();
        let writer = PemFileWriter::in_dir(temp_dir.path(), "cert.pem", "key.pem");

        writer.write("CERT-1 with a longer body", "KEY-1 with a longer body").await.unwrap();
        writer.write("CERT-2", "KEY-2").await.unwrap();

        assert_eq!(std::fs::read_to_string(writer.cert_path()).unwrap(), "CERT-2");
        assert_eq!(std::fs::read_to_string(writer.key_path()).unwrap(), "KEY-2");

        let mut names: Vec<String> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["cert.pem".to_string(), "key.pem".to_string()]);
    }

    #[tokio::test]
    async fn test_write_into_missing_directory_fails_without_partial_output() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("gone");
        let writer = PemFileWriter::in_dir(&missing, "cert.pem", "key.pem");

        let result = writer.write("CERT", "KEY").await;
        assert!(matches!(result, Err(WriteError::IoFailure { .. })));
        assert!(!writer.cert_path().exists());
        assert!(!writer.key_path().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_key_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let writer = PemFileWriter::in_dir(temp_dir.path(), "cert.pem", "key.pem");
        writer.write("CERT", "KEY").await.unwrap();

        let mode = std::fs::metadata(writer.key_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    fn write_pair(dir: &Path, cert: &str, key: &str) {
        std::fs::write(dir.join("cert.pem"), cert).unwrap();
        std::fs::write(dir.join("key.pem"), key).unwrap();
    }

    /// A non-empty directory cannot be replaced by a rename
    fn block_path(path: &Path) {
        if path.is_file() {
            std::fs::remove_file(path).unwrap();
        }
        std::fs::create_dir(path).unwrap();
        std::fs::write(path.join("occupied"), "x").unwrap();
    }

    fn hidden_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with('.'))
            .collect()
    }

    #[tokio::test]
    async fn test_key_replace_failure_restores_previous_cert() {
        let temp_dir = TempDir::new().unwrap();
        let writer = PemFileWriter::in_dir(temp_dir.path(), "cert.pem", "key.pem");
        write_pair(temp_dir.path(), "cert-v1", "key-v1");
        block_path(writer.key_path());

        let result = writer.write("cert-v2", "key-v2").await;

        assert!(matches!(result, Err(WriteError::IoFailure { .. })));
        assert_eq!(std::fs::read_to_string(writer.cert_path()).unwrap(), "cert-v1");
        assert!(hidden_files(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_key_replace_failure_without_previous_cert_publishes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let writer = PemFileWriter::in_dir(temp_dir.path(), "cert.pem", "key.pem");
        block_path(writer.key_path());

        let result = writer.write("cert-v1", "key-v1").await;

        assert!(result.is_err());
        assert!(!writer.cert_path().exists());
        assert!(hidden_files(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_cert_replace_failure_keeps_key_and_cleans_staging() {
        let temp_dir = TempDir::new().unwrap();
        let writer = PemFileWriter::in_dir(temp_dir.path(), "cert.pem", "key.pem");
        write_pair(temp_dir.path(), "cert-v1", "key-v1");
        block_path(writer.cert_path());

        let result = writer.write("cert-v2", "key-v2").await;

        assert!(matches!(result, Err(WriteError::IoFailure { .. })));
        assert_eq!(std::fs::read_to_string(writer.key_path()).unwrap(), "key-v1");
        assert!(hidden_files(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_staging_failure_keeps_previous_pair() {
        let temp_dir = TempDir::new().unwrap();
        let writer = PemFileWriter::in_dir(temp_dir.path(), "cert.pem", "key.pem");
        write_pair(temp_dir.path(), "cert-v1", "key-v1");
        let key_staging = PemFileWriter::staging_path(writer.key_path());
        block_path(&key_staging);

        let result = writer.write("cert-v2", "key-v2").await;

        assert!(matches!(result, Err(WriteError::IoFailure { .. })));
        assert_eq!(std::fs::read_to_string(writer.cert_path()).unwrap(), "cert-v1");
        assert_eq!(std::fs::read_to_string(writer.key_path()).unwrap(), "key-v1");
        assert!(!PemFileWriter::staging_path(writer.cert_path()).exists());
    }
}
