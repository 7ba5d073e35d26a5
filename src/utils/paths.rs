//! Filesystem layout the supervised bot relies on
//!
//! The data directory belongs to the bot (its session files live there); we only
//! guarantee that it exists and is writable before the entry point starts.

use crate::utils::error::{BotwardenError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default root for botwarden's own files (`~/.botwarden`).
pub fn default_root() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".botwarden"))
}

/// Creates the data directory if needed and checks that it is writable.
///
/// New directories are created owner-only (0700) on Unix. Existing directories
/// keep their permissions.
pub async fn ensure_data_dir(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => {
            debug!(data_dir = %path.display(), "Data directory already exists");
        }
        Ok(_) => {
            return Err(BotwardenError::environment(format!(
                "data directory path {} exists but is not a directory",
                path.display()
            )));
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(path)
                .await
                .map_err(|e| BotwardenError::io(path, e))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
                    .await
                    .map_err(|e| BotwardenError::io(path, e))?;
            }
            info!(data_dir = %path.display(), "Created data directory");
        }
        Err(e) => return Err(BotwardenError::io(path, e)),
    }

    // Probe writability the cheap way: create and remove a marker file
    let marker = path.join(".botwarden-write-check");
    tokio::fs::write(&marker, b"")
        .await
        .map_err(|e| BotwardenError::io(path, e))?;
    tokio::fs::remove_file(&marker)
        .await
        .map_err(|e| BotwardenError::io(path, e))?;

    Ok(())
}

/// Writes the current PID to `path`.
pub async fn write_pid_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BotwardenError::io(parent, e))?;
        }
    }
    tokio::fs::write(path, std::process::id().to_string())
        .await
        .map_err(|e| BotwardenError::io(path, e))?;
    debug!(pid_file = %path.display(), "PID file written");
    Ok(())
}

/// Removes the PID file; a file that is already gone is not an error.
pub async fn remove_pid_file(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BotwardenError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ensure_data_dir_creates_missing() {
        let temp = TempDir::new().unwrap();
        let data = temp.path().join("app").join("data");

        ensure_data_dir(&data).await.unwrap();
        assert!(data.is_dir());
        // No marker left behind
        assert_eq!(std::fs::read_dir(&data).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ensure_data_dir_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let data = temp.path().join("data");
        ensure_data_dir(&data).await.unwrap();

        let mode = std::fs::metadata(&data).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
    }

    #[tokio::test]
    async fn test_ensure_data_dir_keeps_existing_contents() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("session.json"), "{}").unwrap();

        ensure_data_dir(temp.path()).await.unwrap();
        assert!(temp.path().join("session.json").exists());
    }

    #[tokio::test]
    async fn test_ensure_data_dir_rejects_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("data");
        std::fs::write(&file, "not a dir").unwrap();

        let err = ensure_data_dir(&file).await.unwrap_err();
        assert!(matches!(err, BotwardenError::Environment { .. }));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_pid_file_roundtrip() {
        let temp = TempDir::new().unwrap();
        let pid_file = temp.path().join("run").join("botwarden.pid");

        write_pid_file(&pid_file).await.unwrap();
        let contents = std::fs::read_to_string(&pid_file).unwrap();
        assert_eq!(contents, std::process::id().to_string());

        remove_pid_file(&pid_file).await.unwrap();
        assert!(!pid_file.exists());
        // Second removal is a no-op
        remove_pid_file(&pid_file).await.unwrap();
    }
}
