use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

use gradeloop_types::ResultRecord;

const SNAPSHOT_FILE: &str = "results.json";

/// Sortable timestamp used to name a run's output directory (YYMMDD_HHMMSS).
pub fn run_timestamp() -> String {
    Local::now().format("%y%m%d_%H%M%S").to_string()
}

/// Root output directory for one run. Loop stores are created beneath it,
/// one numbered subdirectory per loop index.
#[derive(Debug)]
pub struct RunDir {
    root: PathBuf,
}

impl RunDir {
    /// Create `<base>/<timestamp>` and return a handle to it.
    pub async fn create(base: impl AsRef<Path>) -> Result<Self> {
        Self::create_named(base, &run_timestamp()).await
    }

    /// Create `<base>/<name>`. Split out so tests can use fixed names.
    pub async fn create_named(base: impl AsRef<Path>, name: &str) -> Result<Self> {
        let root = base.as_ref().join(name);
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create run directory {:?}", root))?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Create the loop's subdirectory and an empty result list for it.
    pub async fn loop_store(&self, loop_index: u32) -> Result<LoopStore> {
        LoopStore::create(self.root.join(loop_index.to_string())).await
    }
}

/// One loop's result list plus its on-disk snapshot. The snapshot is not
/// append-only: the whole in-memory list is serialized wholesale after every
/// append, so the file always reflects the list in test-case order.
#[derive(Debug)]
pub struct LoopStore {
    dir: PathBuf,
    records: Vec<ResultRecord>,
}

impl LoopStore {
    pub async fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create loop directory {:?}", dir))?;
        Ok(Self {
            dir,
            records: Vec::new(),
        })
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    /// Append one finalized record and rewrite the persisted snapshot.
    pub async fn append(&mut self, record: ResultRecord) -> Result<()> {
        self.records.push(record);
        let json = serde_json::to_string_pretty(&self.records)?;
        tokio::fs::write(self.snapshot_path(), json)
            .await
            .with_context(|| format!("Failed to write snapshot {:?}", self.snapshot_path()))?;
        Ok(())
    }
}

/// Read a loop snapshot back, e.g. for summary rendering after a run.
pub async fn read_snapshot(path: impl AsRef<Path>) -> Result<Vec<ResultRecord>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read snapshot {:?}", path))?;
    let records = serde_json::from_str(&content)
        .with_context(|| format!("Invalid snapshot JSON in {:?}", path))?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, score: u32) -> ResultRecord {
        ResultRecord {
            id,
            question: format!("question {id}"),
            reference_answer: "42".to_string(),
            model_answer: "The answer is 42".to_string(),
            max_score: 10,
            score,
            work_token_usage: 100,
            work_duration_ms: 500,
            score_token_usage: 20,
            score_duration_ms: 100,
            error: None,
        }
    }

    #[tokio::test]
    async fn snapshot_is_rewritten_after_every_append() {
        let tmp = tempfile::tempdir().unwrap();
        let run = RunDir::create_named(tmp.path(), "250101_120000")
            .await
            .unwrap();
        let mut store = run.loop_store(1).await.unwrap();

        store.append(record(1, 9)).await.unwrap();
        let on_disk = read_snapshot(store.snapshot_path()).await.unwrap();
        assert_eq!(on_disk.len(), 1);

        store.append(record(2, 7)).await.unwrap();
        let on_disk = read_snapshot(store.snapshot_path()).await.unwrap();
        assert_eq!(on_disk.len(), 2);
        assert_eq!(on_disk[0].id, 1);
        assert_eq!(on_disk[1].id, 2);
        assert_eq!(store.records().len(), 2);
    }

    #[tokio::test]
    async fn loops_get_separate_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let run = RunDir::create_named(tmp.path(), "250101_120000")
            .await
            .unwrap();
        let mut first = run.loop_store(1).await.unwrap();
        let mut second = run.loop_store(2).await.unwrap();
        first.append(record(1, 10)).await.unwrap();
        second.append(record(1, 3)).await.unwrap();

        assert_ne!(first.snapshot_path(), second.snapshot_path());
        let a = read_snapshot(first.snapshot_path()).await.unwrap();
        let b = read_snapshot(second.snapshot_path()).await.unwrap();
        assert_eq!(a[0].score, 10);
        assert_eq!(b[0].score, 3);
    }

    #[test]
    fn run_timestamp_is_sortable() {
        let ts = run_timestamp();
        assert_eq!(ts.len(), 13);
        assert_eq!(ts.as_bytes()[6], b'_');
        assert!(ts[..6].chars().all(|c| c.is_ascii_digit()));
        assert!(ts[7..].chars().all(|c| c.is_ascii_digit()));
    }
}
