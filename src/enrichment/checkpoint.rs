//! Resumable enrichment checkpoint (`SPEC_FULL.md` §4.5): a flat JSON
//! file, not a DB table — distinct from the teacher's DB-backed sync
//! checkpoint (`ingest.rs`'s `checkpoints` table), which tracks a
//! different pipeline's cursor entirely.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedEntry {
    pub hash: String,
    pub source: String,
    pub error: String,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub processed_hashes: HashSet<String>,
    #[serde(default)]
    pub failed_hashes: Vec<FailedEntry>,
}

impl Checkpoint {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read checkpoint {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("malformed checkpoint JSON at {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write checkpoint {}", path.display()))
    }

    pub fn is_processed(&self, hash: &str) -> bool {
        self.processed_hashes.contains(hash)
    }

    pub fn mark_processed(&mut self, hash: &str) {
        self.processed_hashes.insert(hash.to_string());
        self.failed_hashes.retain(|f| f.hash != hash);
    }

    /// Records a failure, bumping `retry_count` if this hash already
    /// failed before.
    pub fn mark_failed(&mut self, hash: &str, source: &str, error: &str) {
        if let Some(existing) = self.failed_hashes.iter_mut().find(|f| f.hash == hash) {
            existing.retry_count += 1;
            existing.error = error.to_string();
        } else {
            self.failed_hashes.push(FailedEntry {
                hash: hash.to_string(),
                source: source.to_string(),
                error: error.to_string(),
                retry_count: 0,
            });
        }
    }

    /// `--clean-checkpoint`: drop all state and start over.
    pub fn clear(&mut self) {
        self.processed_hashes.clear();
        self.failed_hashes.clear();
    }

    /// `--retry-failed`: the set of hashes worth attempting again.
    pub fn failed_hash_set(&self) -> HashSet<String> {
        self.failed_hashes.iter().map(|f| f.hash.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");

        let mut checkpoint = Checkpoint::default();
        checkpoint.mark_processed("hash-a");
        checkpoint.mark_failed("hash-b", "b.txt", "timeout");
        checkpoint.save(&path).unwrap();

        let reloaded = Checkpoint::load(&path).unwrap();
        assert!(reloaded.is_processed("hash-a"));
        assert_eq!(reloaded.failed_hashes.len(), 1);
        assert_eq!(reloaded.failed_hashes[0].retry_count, 0);
    }

    #[test]
    fn missing_file_yields_empty_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        let checkpoint = Checkpoint::load(&path).unwrap();
        assert!(checkpoint.processed_hashes.is_empty());
    }

    #[test]
    fn repeated_failure_increments_retry_count() {
        let mut checkpoint = Checkpoint::default();
        checkpoint.mark_failed("hash-a", "a.txt", "first error");
        checkpoint.mark_failed("hash-a", "a.txt", "second error");
        assert_eq!(checkpoint.failed_hashes.len(), 1);
        assert_eq!(checkpoint.failed_hashes[0].retry_count, 1);
        assert_eq!(checkpoint.failed_hashes[0].error, "second error");
    }

    #[test]
    fn marking_processed_clears_prior_failure() {
        let mut checkpoint = Checkpoint::default();
        checkpoint.mark_failed("hash-a", "a.txt", "timeout");
        checkpoint.mark_processed("hash-a");
        assert!(checkpoint.is_processed("hash-a"));
        assert!(checkpoint.failed_hashes.is_empty());
    }

    #[test]
    fn clear_resets_all_state() {
        let mut checkpoint = Checkpoint::default();
        checkpoint.mark_processed("hash-a");
        checkpoint.mark_failed("hash-b", "b.txt", "timeout");
        checkpoint.clear();
        assert!(checkpoint.processed_hashes.is_empty());
        assert!(checkpoint.failed_hashes.is_empty());
    }
}
