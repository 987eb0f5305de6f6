//! Shared key generation for storage backends.
//!
//! - thumbnails: `{thumbnail_prefix}{source_key}.jpg`
//! - evacuated work: `{evacuation_prefix}{host}/{task_id}/{name}`

use crate::{StorageError, StorageResult};

/// Reject keys that could escape a filesystem root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.starts_with('/') || key.split('/').any(|segment| segment == "..") {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

fn join_prefix(prefix: &str, rest: &str) -> String {
    if prefix.is_empty() {
        rest.to_string()
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), rest)
    }
}

/// Key of the JPEG thumbnail rendered for `source_key`.
pub fn thumbnail_key(prefix: &str, source_key: &str) -> String {
    join_prefix(prefix, &format!("{}.jpg", source_key))
}

/// Key for one artifact of an interrupted task, namespaced by host and task.
pub fn evacuation_key(prefix: &str, host: &str, task_id: &str, name: &str) -> String {
    join_prefix(prefix, &format!("{}/{}/{}", host, task_id, name))
}
