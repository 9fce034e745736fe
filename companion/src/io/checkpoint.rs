//! Workflow checkpoint storage.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::state::WorkflowState;

/// Durable snapshots keyed by workflow id.
pub trait CheckpointStore {
    fn save(&self, workflow_id: &str, state: &WorkflowState) -> Result<()>;
    /// `Ok(None)` when no snapshot exists for `workflow_id`.
    fn load(&self, workflow_id: &str) -> Result<Option<WorkflowState>>;
    fn clear(&self, workflow_id: &str) -> Result<()>;
}

/// One pretty-printed JSON file per workflow under a state directory.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, workflow_id: &str) -> PathBuf {
        self.dir.join(format!("{workflow_id}.json"))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&self, workflow_id: &str, state: &WorkflowState) -> Result<()> {
        let path = self.path_for(workflow_id);
        debug!(path = %path.display(), next = %state.next, steps = state.steps_taken, "writing checkpoint");
        let mut buf = serde_json::to_string_pretty(state).context("serialize checkpoint")?;
        buf.push('\n');
        crate::io::write_atomic(&path, &buf)
    }

    fn load(&self, workflow_id: &str) -> Result<Option<WorkflowState>> {
        let path = self.path_for(workflow_id);
        if !path.exists() {
            debug!(path = %path.display(), "no checkpoint");
            return Ok(None);
        }
        let state = read_checkpoint(&path)?;
        debug!(next = %state.next, steps = state.steps_taken, "checkpoint loaded");
        Ok(Some(state))
    }

    fn clear(&self, workflow_id: &str) -> Result<()> {
        let path = self.path_for(workflow_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove checkpoint {}", path.display())),
        }
    }
}

fn read_checkpoint(path: &Path) -> Result<WorkflowState> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read checkpoint {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse checkpoint {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::Turn;
    use crate::core::routing::WorkflowNode;
    use crate::core::types::{ExecutionOutcome, PuzzleDetail};
    use pretty_assertions::assert_eq;

    #[test]
    fn checkpoint_round_trips_mid_puzzle() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileCheckpointStore::new(temp.path().join("state"));

        let mut state = WorkflowState {
            next: WorkflowNode::ExecuteCode,
            queue: ["https://x/2024/day/5".to_string()].into(),
            current_puzzle: Some(PuzzleDetail {
                name: "Day 4: Ceres Search".to_string(),
                description: "grid".to_string(),
                question: "How many times does XMAS appear?".to_string(),
                locator: "https://x/2024/day/4".to_string(),
                level: 1,
            }),
            input_file_path: Some(PathBuf::from("INPUT(Day 4: Ceres Search).txt")),
            last_comment: "code written".to_string(),
            steps_taken: 7,
            ..WorkflowState::default()
        };
        state.attempt.push(Turn::Code {
            source: "print(18)".to_string(),
        });
        state.attempt.push(Turn::Execution {
            outcome: ExecutionOutcome::TimedOut,
        });

        store.save("w1", &state).expect("save");
        assert_eq!(store.load("w1").expect("load"), Some(state));
        assert!(!store.path_for("w1").with_extension("json.tmp").exists());
    }

    #[test]
    fn missing_and_cleared_checkpoints_load_as_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileCheckpointStore::new(temp.path());
        assert_eq!(store.load("absent").expect("load"), None);

        store.save("w", &WorkflowState::default()).expect("save");
        store.clear("w").expect("clear");
        store.clear("w").expect("clear twice");
        assert_eq!(store.load("w").expect("load"), None);
    }

    #[test]
    fn corrupt_checkpoint_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileCheckpointStore::new(temp.path());
        fs::write(store.path_for("w"), "{not json").expect("write");
        let err = store.load("w").unwrap_err();
        assert!(format!("{err:#}").contains("parse checkpoint"));
    }
}
