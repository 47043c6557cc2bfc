//! Per-request temporary storage for uploaded files.
//!
//! A [`TempWorkspace`] owns one freshly created directory holding exactly one file. Release is
//! tied to the value: [`TempWorkspace::cleanup`] removes the file and then the directory, and
//! `Drop` runs the same cleanup if the owner never did (early return, error, panic).

use std::io;
use std::path::{Path, PathBuf};

const WORKSPACE_PREFIX: &str = "audit-upload-";

/// Scoped directory + file pair owned by a single request.
#[derive(Debug)]
pub struct TempWorkspace {
    dir: Option<PathBuf>,
    file_path: PathBuf,
}

impl TempWorkspace {
    /// Create a unique directory under `root` (or the system temp dir) and write `bytes` into
    /// `file_name` inside it.
    ///
    /// If writing the file fails the half-built workspace is removed before the error returns.
    pub async fn stage(root: Option<&Path>, file_name: &str, bytes: &[u8]) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let dir = match root {
            Some(root) => {
                tokio::fs::create_dir_all(root).await?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        let workspace = Self {
            file_path: dir.path().join(file_name),
            dir: Some(dir.keep()),
        };
        tokio::fs::write(&workspace.file_path, bytes).await?;

        tracing::debug!(
            path = %workspace.file_path.display(),
            bytes = bytes.len(),
            "Staged upload in temp workspace"
        );
        Ok(workspace)
    }

    /// Location of the staged file.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Directory holding the staged file, or `None` once cleaned up.
    #[cfg(test)]
    pub(crate) fn directory(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Remove the file, then the directory. Runs at most once.
    ///
    /// Both removals are best effort: paths that are already gone are skipped and other
    /// failures are logged, never returned.
    pub fn cleanup(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        report_removal(&self.file_path, std::fs::remove_file(&self.file_path));
        report_removal(&dir, std::fs::remove_dir(&dir));
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn report_removal(path: &Path, outcome: io::Result<()>) {
    match outcome {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "Failed to remove temp workspace entry"
            );
        }
    }
}
