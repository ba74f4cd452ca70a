//! Persistence of the Mysa session between runs.

use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;
use tracing::info;

use crate::integrations::mysa::MysaSession;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to write session file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize session: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read a stored session. A missing or unreadable file means "no session".
pub async fn load_session(path: &Path) -> Option<MysaSession> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "no stored session");
            return None;
        }
        Err(e) => {
            info!(path = %path.display(), error = %e, "failed to read session file");
            return None;
        }
    };

    match serde_json::from_str(&contents) {
        Ok(session) => {
            debug!(path = %path.display(), "loaded stored session");
            Some(session)
        }
        Err(e) => {
            info!(path = %path.display(), error = %e, "ignoring invalid session file");
            None
        }
    }
}

/// Store the session, or remove the file when there is none.
pub async fn save_session(session: Option<&MysaSession>, path: &Path) -> Result<(), SessionError> {
    match session {
        Some(session) => {
            let contents = serde_json::to_string_pretty(session)?;
            tokio::fs::write(path, contents).await?;
            debug!(path = %path.display(), "saved session");
        }
        None => match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "removed session file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        },
    }
    Ok(())
}
