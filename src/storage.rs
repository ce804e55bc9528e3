//! JSON persistence helpers shared by the history files and the round ledger

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::ConclaveError;

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
///
/// The data lands in a sibling `.tmp` file first and is renamed over the
/// target, so readers see either the old snapshot or the new one.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ConclaveError> {
    let data = serde_json::to_vec_pretty(value).map_err(|e| {
        ConclaveError::persistence(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ConclaveError::persistence(parent, e))?;
    }

    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, data).map_err(|e| ConclaveError::persistence(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        ConclaveError::persistence(path, e)
    })
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
