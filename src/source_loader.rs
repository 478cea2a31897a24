//! Minimal document loader for the seeding pipeline.
//!
//! Document/PDF/OCR extraction is out of scope — every walked file is
//! treated as plain UTF-8 text, non-UTF-8 files are skipped with a
//! warning. Grounded on the teacher's `connector_fs.rs` directory walk
//! (glob include/exclude, default excludes for `.git`/`target`/
//! `node_modules`, deterministic ordering), narrowed from a
//! `Connector`-producing `SourceItem` scan to the
//! `{source_path, raw_text, content_hash}` tuple the seeding pipeline
//! actually needs.

use std::path::Path;

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// One file discovered under a `--filesdir` root.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Path relative to the scanned root, used as the document's
    /// `source` and as the stable input to its id.
    pub source_path: String,
    pub raw_text: String,
    /// Full SHA-256 hex digest of the file's bytes, used for the
    /// dedup/checkpoint `content_hash` (distinct from the id, which is
    /// derived from `source_path` alone so edits don't change a
    /// document's identity).
    pub content_hash: String,
}

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];
const DEFAULT_INCLUDES: &[&str] = &["**/*"];

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

fn content_hash_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}

/// Walk `root`, returning one [`SourceDocument`] per readable text
/// file, sorted by `source_path` for deterministic seeding order.
pub fn scan_filesdir(root: &Path) -> Result<Vec<SourceDocument>> {
    if !root.exists() {
        bail!("--filesdir root does not exist: {}", root.display());
    }

    let include_set = build_globset(DEFAULT_INCLUDES)?;
    let exclude_set = build_globset(DEFAULT_EXCLUDES)?;

    let mut documents = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let bytes = std::fs::read(path)?;
        let raw_text = match String::from_utf8(bytes.clone()) {
            Ok(text) => text,
            Err(_) => {
                tracing::warn!(path = %rel_str, "skipping non-UTF-8 file");
                continue;
            }
        };

        documents.push(SourceDocument {
            source_path: rel_str,
            raw_text,
            content_hash: content_hash_hex(&bytes),
        });
    }

    documents.sort_by(|a, b| a.source_path.cmp(&b.source_path));
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_text_files_and_skips_excluded_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "hello world").unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git").join("config"), "ignored").unwrap();

        let docs = scan_filesdir(dir.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source_path, "a.md");
        assert_eq!(docs[0].raw_text, "hello world");
    }

    #[test]
    fn content_hash_is_stable_for_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "same content").unwrap();
        std::fs::write(dir.path().join("b.txt"), "same content").unwrap();

        let docs = scan_filesdir(dir.path()).unwrap();
        assert_eq!(docs[0].content_hash, docs[1].content_hash);
    }

    #[test]
    fn skips_non_utf8_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("binary.bin"), [0xff, 0xfe, 0x00, 0xff]).unwrap();
        std::fs::write(dir.path().join("ok.txt"), "fine").unwrap();

        let docs = scan_filesdir(dir.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source_path, "ok.txt");
    }

    #[test]
    fn missing_root_is_an_error() {
        let missing = Path::new("/nonexistent/path/for/testing");
        assert!(scan_filesdir(missing).is_err());
    }
}
