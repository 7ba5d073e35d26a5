//! Async filesystem helpers
//!
//! Provides thin wrappers around `tokio::fs` to avoid blocking the async
//! runtime with synchronous `std::fs` calls.

use std::io;
use std::path::Path;

/// Returns `true` if the path exists (async, non-blocking).
///
/// A missing path returns `Ok(false)`, not an error.
pub async fn file_exists(path: impl AsRef<Path>) -> io::Result<bool> {
    tokio::fs::try_exists(path).await
}

/// Writes `contents` to `path` through a sibling temp file and a rename, so
/// readers never observe a half-written file. The result is owner-only (0600)
/// on Unix.
pub async fn write_private_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, contents).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    tokio::fs::rename(&tmp_path, path).await
}
