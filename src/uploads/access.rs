//! Who may see or change an upload.
//!
//! Readers are the owner plus everyone in `sharedTo`; only the owner writes.
//! Identifiers compare exactly after trimming.

use crate::error::{AppError, AppResult};

use super::Upload;

pub fn normalize_id(id: &str) -> &str {
    id.trim()
}

pub fn is_owner(upload: &Upload, caller: &str) -> bool {
    upload.user_id == normalize_id(caller)
}

pub fn can_read(upload: &Upload, caller: &str) -> bool {
    let caller = normalize_id(caller);
    upload.user_id == caller || upload.shared_to.iter().any(|r| r == caller)
}

pub fn ensure_readable(upload: &Upload, caller: &str) -> AppResult<()> {
    if can_read(upload, caller) {
        Ok(())
    } else {
        Err(AppError::Forbidden("This upload has not been shared with you".into()))
    }
}

pub fn ensure_owner(upload: &Upload, caller: &str) -> AppResult<()> {
    if is_owner(upload, caller) {
        Ok(())
    } else {
        Err(AppError::Forbidden("Only the owner can change this upload".into()))
    }
}

/// Trim entries, drop blanks and keep the first occurrence of each id.
pub fn normalize_shared_to(ids: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        let id = normalize_id(&id);
        if !id.is_empty() && !out.iter().any(|seen| seen == id) {
            out.push(id.to_string());
        }
    }
    out
}
