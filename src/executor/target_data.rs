use super::{ExecutorAction, ExecutorError};
use crate::shared::atomic_write_file;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDataFile {
    pub path: PathBuf,
    pub sha256: String,
}

/// Writes the variable content of one executor action to
/// `<work_folder>/<action>.target.json`; only the path reaches the command line.
pub fn write_target_data(
    work_folder: &Path,
    action: ExecutorAction,
    data: &serde_json::Value,
) -> Result<TargetDataFile, ExecutorError> {
    let path = work_folder.join(format!("{}.target.json", action.as_str()));
    let encoded = serde_json::to_vec_pretty(data).map_err(|source| ExecutorError::EncodeTargetData {
        path: path.display().to_string(),
        source,
    })?;
    atomic_write_file(&path, &encoded).map_err(|source| ExecutorError::TargetData {
        path: path.display().to_string(),
        source,
    })?;
    Ok(TargetDataFile {
        sha256: sha256_hex(&encoded),
        path,
    })
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn target_data_is_written_and_digest_matches_content() {
        let dir = tempdir().expect("tempdir");
        let data = serde_json::json!({"workflowId": "wf-1", "packages": ["a", "b"]});
        let file = write_target_data(dir.path(), ExecutorAction::Install, &data).expect("write");

        assert_eq!(file.path, dir.path().join("install.target.json"));
        let raw = std::fs::read(&file.path).expect("read");
        assert_eq!(file.sha256, sha256_hex(&raw));
        assert_eq!(file.sha256.len(), 64);
        let decoded: serde_json::Value = serde_json::from_slice(&raw).expect("json");
        assert_eq!(decoded, data);
    }
}
