use crate::health::HealthSnapshot;
use crate::utils::error::{BotwardenError, Result};
use crate::utils::fs::write_private_atomic;
use std::path::Path;
use tracing::debug;

/// Persists the snapshot as pretty JSON, atomically, owner-only.
pub async fn save_snapshot(path: &Path, snapshot: &HealthSnapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    write_private_atomic(path, json.as_bytes())
        .await
        .map_err(|e| BotwardenError::io(path, e))?;
    debug!(status_file = %path.display(), status = %snapshot.status, "Health snapshot saved");
    Ok(())
}

/// Reads a snapshot previously written by [`save_snapshot`].
pub async fn load_snapshot(path: &Path) -> Result<HealthSnapshot> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| BotwardenError::io(path, e))?;
    Ok(serde_json::from_str(&json)?)
}
