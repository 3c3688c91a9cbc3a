use tracing::{debug, info};

use crate::errors::TransportError;
use crate::transport::{Transport, DIR_MODE, FILE_MODE};

use super::{directory_prefixes, split_path};

/// Make the file at `path` hold exactly `content`.
///
/// Empty content removes the file; removing a file that is already gone
/// succeeds. Otherwise every missing ancestor directory is created with
/// [`DIR_MODE`] and the file is uploaded with [`FILE_MODE`].
pub fn write_content(
    session: &mut dyn Transport,
    path: &str,
    content: &str,
) -> Result<(), TransportError> {
    if path.trim().is_empty() {
        return Err(TransportError::MissingPath);
    }

    if content.is_empty() {
        let present = session.exists(path).map_err(|e| match e {
            TransportError::Read { path, reason } => TransportError::Remove { path, reason },
            other => other,
        })?;
        if present {
            session.delete(path)?;
            info!("Removed {path}");
        } else {
            debug!("{path} already absent, nothing to remove");
        }
        return Ok(());
    }

    let (dir, _) = split_path(path);
    for prefix in directory_prefixes(dir) {
        let exists = session
            .dir_exists(&prefix)
            .map_err(|e| TransportError::CreateDir {
                path: prefix.clone(),
                reason: e.to_string(),
            })?;
        if !exists {
            debug!("Creating directory {prefix}");
            session.mkdir(&prefix, DIR_MODE)?;
        }
    }

    session.put(path, content.as_bytes(), FILE_MODE)?;
    info!("Wrote {} bytes to {path}", content.len());
    Ok(())
}
