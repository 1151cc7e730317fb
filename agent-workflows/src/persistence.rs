use std::{
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
};

use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use twox_hash::XxHash3_64;

use crate::log_workflow;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Missing directory: {0}")]
    MissingParent(String),
}

/// Save the data to a file, if the file exists, it will be overwritten
pub async fn save_to_file(
    data: impl AsRef<[u8]>,
    path: impl AsRef<Path>,
) -> Result<(), PersistenceError> {
    match path.as_ref().parent() {
        Some(parent) => fs::create_dir_all(parent).await?,
        None => {
            return Err(PersistenceError::MissingParent(
                path.as_ref().to_string_lossy().to_string(),
            ));
        }
    };
    fs::write(path, data).await.map_err(|e| e.into())
}

/// Load the data from a file
pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Vec<u8>, PersistenceError> {
    fs::read(path).await.map_err(|e| e.into())
}

/// File name for a report: `<label>_<lower 32 bits of the task hash>.json`.
pub fn report_file_name(label: &str, task: &str) -> String {
    let mut hasher = XxHash3_64::default();
    task.hash(&mut hasher);
    let task_hash = hasher.finish();
    format!("{label}_{:x}.json", task_hash & 0xFFFFFFFF)
}

/// Write `report` as pretty JSON into `dir` and return the file path.
pub async fn save_report(
    dir: impl AsRef<Path>,
    label: &str,
    task: &str,
    report: &impl Serialize,
) -> Result<PathBuf, PersistenceError> {
    let path = dir.as_ref().join(report_file_name(label, task));
    let data = serde_json::to_string_pretty(report)?;
    save_to_file(data, &path).await?;
    log_workflow!(info, label, "saved report to {}", path.display());
    Ok(path)
}
