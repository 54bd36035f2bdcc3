//! Per-task output area.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::AnalyzerError;

/// Directory receiving a task's artifacts: `<root>/task_<id>`.
///
/// The directory is created on first write, so tasks that never produce an
/// artifact leave nothing behind.
#[derive(Debug, Clone)]
pub struct OutputArea {
    dir: PathBuf,
}

impl OutputArea {
    pub fn for_task(root: &Path, task_id: &str) -> Self {
        Self {
            dir: root.join(format!("task_{task_id}")),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `contents` to `file_name` inside the area and return its path.
    pub async fn write(
        &self,
        file_name: &str,
        contents: impl AsRef<[u8]>,
    ) -> Result<PathBuf, AnalyzerError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| AnalyzerError::Output {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.dir.join(file_name);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|source| AnalyzerError::Output {
                path: path.clone(),
                source,
            })?;

        debug!("Wrote artifact {}", path.display());
        Ok(path)
    }
}
