//! Execution-scoped scratch directories
//!
//! Every execution gets a working directory: an engine-owned temporary one
//! (removed when the scratch handle drops, on every exit path), or a
//! caller-supplied context directory whose lifetime the caller owns. The
//! code file is written here before the run, and a pre-run snapshot lets the
//! backend report which files the code created or modified, by content-shape
//! diffing rather than name heuristics.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::TempDir;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::core_types::ExecutionEnvironment;
use crate::errors::BackendError;

type Snapshot = HashMap<PathBuf, (u64, Option<SystemTime>)>;

pub struct ScratchDir {
    // None when the directory belongs to an execution context.
    owned: Option<TempDir>,
    path: PathBuf,
    script_name: String,
    snapshot: Snapshot,
}

impl ScratchDir {
    /// Create the working directory (or adopt the context one), write the
    /// code file, and snapshot the initial directory contents.
    pub async fn for_execution(
        env: &ExecutionEnvironment,
        code: &str,
    ) -> Result<Self, BackendError> {
        let (owned, path) = match &env.working_directory {
            Some(dir) => {
                fs::create_dir_all(dir).await?;
                (None, dir.clone())
            }
            None => {
                let tmp = tempfile::Builder::new()
                    .prefix("runcell-")
                    .tempdir()
                    .map_err(|e| BackendError::Scratch(e.to_string()))?;
                let path = tmp.path().to_path_buf();
                (Some(tmp), path)
            }
        };

        let script_name = format!("cell_{}.{}", Uuid::new_v4(), env.language.file_extension());
        let script_path = path.join(&script_name);
        let mut file = fs::File::create(&script_path).await?;
        file.write_all(code.as_bytes()).await?;
        file.flush().await?;

        let snapshot = snapshot_dir(&path)?;

        Ok(Self {
            owned,
            path,
            script_name,
            snapshot,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    pub fn script_path(&self) -> PathBuf {
        self.path.join(&self.script_name)
    }

    /// Diff the directory against the pre-run snapshot. Returns relative
    /// paths, sorted, with the code file itself excluded.
    pub fn changed_files(&self) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let current = match snapshot_dir(&self.path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!(
                    "Could not rescan scratch directory {}: {}",
                    self.path.display(),
                    e
                );
                return (Vec::new(), Vec::new());
            }
        };

        let mut created = Vec::new();
        let mut modified = Vec::new();
        let script = PathBuf::from(&self.script_name);
        for (rel, meta) in &current {
            if *rel == script {
                continue;
            }
            match self.snapshot.get(rel) {
                None => created.push(rel.clone()),
                Some(before) if before != meta => modified.push(rel.clone()),
                Some(_) => {}
            }
        }
        created.sort();
        modified.sort();
        (created, modified)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        // Owned temp dirs are removed wholesale by TempDir. For a
        // caller-owned context directory, only our code file is ours to
        // remove; the context keeps everything the code produced.
        if self.owned.is_none() {
            let _ = std::fs::remove_file(self.path.join(&self.script_name));
        }
    }
}

fn snapshot_dir(root: &Path) -> Result<Snapshot, BackendError> {
    let mut snapshot = Snapshot::new();
    walk(root, root, &mut snapshot)?;
    Ok(snapshot)
}

fn walk(root: &Path, dir: &Path, snapshot: &mut Snapshot) -> Result<(), BackendError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let meta = entry.metadata()?;
        if meta.is_dir() {
            walk(root, &path, snapshot)?;
        } else {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_path_buf();
            snapshot.insert(rel, (meta.len(), meta.modified().ok()));
        }
    }
    Ok(())
}
