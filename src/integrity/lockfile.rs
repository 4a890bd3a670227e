//! The `golden.lock.json` lockfile.
//!
//! Every report, the split file and every artifact is digested with SHA-256.
//! Entries are keyed by their path relative to the output directory and the
//! root digest is the SHA-256 of the sorted `name\tdigest\n` lines, so a
//! change to any byte of any locked file changes the root.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{CurationError, ExportError, LockIssue};

use super::digest::{is_sha256_hex, sha256_hex};

/// File name of the lockfile inside the output directory.
pub const LOCKFILE_NAME: &str = "golden.lock.json";

/// Only supported lockfile version.
pub const LOCK_VERSION: u32 = 1;

/// Only supported digest algorithm.
pub const LOCK_ALGORITHM: &str = "sha256";

/// Directories whose every file is locked.
pub const LOCKED_DIRS: [&str; 2] = ["reports", "artifacts"];

/// Individually locked files at the top of the output directory.
pub const LOCKED_FILES: [&str; 1] = ["splits.json"];

/// Whether `name` (a `/`-separated relative path) falls under the lock.
pub fn is_locked_path(name: &str) -> bool {
    if name.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
        return false;
    }
    LOCKED_FILES.contains(&name)
        || LOCKED_DIRS
            .iter()
            .any(|dir| name.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/')))
}

/// Digest-of-digests over every locked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Lockfile {
    pub version: u32,
    pub algorithm: String,
    /// Relative path -> hex SHA-256 of the file bytes.
    pub entries: BTreeMap<String, String>,
    pub root_digest: String,
}

impl Lockfile {
    /// Locks `files`. Paths outside the locked layout are ignored.
    pub fn lock(files: &BTreeMap<String, Vec<u8>>) -> Self {
        let entries: BTreeMap<String, String> = files
            .iter()
            .filter(|(name, _)| is_locked_path(name))
            .map(|(name, bytes)| (name.clone(), sha256_hex(bytes)))
            .collect();
        let root_digest = Self::root_of(&entries);
        info!(entries = entries.len(), root = %root_digest, "Lockfile computed");
        Self {
            version: LOCK_VERSION,
            algorithm: LOCK_ALGORITHM.to_string(),
            entries,
            root_digest,
        }
    }

    /// SHA-256 over the sorted `name\tdigest\n` lines.
    pub fn root_of(entries: &BTreeMap<String, String>) -> String {
        let mut lines = String::new();
        for (name, digest) in entries {
            lines.push_str(name);
            lines.push('\t');
            lines.push_str(digest);
            lines.push('\n');
        }
        sha256_hex(lines.as_bytes())
    }

    /// Parses lockfile bytes.
    ///
    /// # Errors
    ///
    /// A [`LockIssue::Schema`] when the bytes are not a lockfile object.
    pub fn parse(bytes: &[u8]) -> Result<Self, LockIssue> {
        serde_json::from_slice(bytes).map_err(|e| LockIssue::Schema(e.to_string()))
    }

    /// Structural problems: unknown version or algorithm, malformed digests,
    /// entries outside the locked layout.
    pub fn schema_issues(&self) -> Vec<LockIssue> {
        let mut issues = Vec::new();
        if self.version != LOCK_VERSION {
            issues.push(LockIssue::Schema(format!(
                "unsupported version {}",
                self.version
            )));
        }
        if self.algorithm != LOCK_ALGORITHM {
            issues.push(LockIssue::Schema(format!(
                "unsupported algorithm '{}'",
                self.algorithm
            )));
        }
        if !is_sha256_hex(&self.root_digest) {
            issues.push(LockIssue::Schema("malformed root digest".to_string()));
        }
        for (name, digest) in &self.entries {
            if !is_locked_path(name) {
                issues.push(LockIssue::Schema(format!(
                    "entry '{}' is outside the locked layout",
                    name
                )));
            }
            if !is_sha256_hex(digest) {
                issues.push(LockIssue::Schema(format!(
                    "malformed digest for '{}'",
                    name
                )));
            }
        }
        issues
    }

    /// Compares the lock against the files currently on disk.
    ///
    /// `files` must hold every file found in the locked layout, so that
    /// files added after locking are reported as unlisted.
    pub fn verify(&self, files: &BTreeMap<String, Vec<u8>>) -> Vec<LockIssue> {
        let mut issues = self.schema_issues();

        let root = Self::root_of(&self.entries);
        if root != self.root_digest {
            issues.push(LockIssue::RootMismatch {
                expected: self.root_digest.clone(),
                actual: root,
            });
        }

        for (name, expected) in &self.entries {
            match files.get(name) {
                None => issues.push(LockIssue::Missing { name: name.clone() }),
                Some(bytes) => {
                    let actual = sha256_hex(bytes);
                    if &actual != expected {
                        issues.push(LockIssue::DigestMismatch {
                            name: name.clone(),
                            expected: expected.clone(),
                            actual,
                        });
                    } else {
                        debug!(file = %name, "Digest verified");
                    }
                }
            }
        }

        for name in files.keys() {
            if is_locked_path(name) && !self.entries.contains_key(name) {
                issues.push(LockIssue::Unlisted { name: name.clone() });
            }
        }

        issues
    }
}

/// Parses `lock_bytes` and verifies it against `files`.
///
/// # Errors
///
/// `LOCK_ERR` carrying every issue found.
pub fn verify_lock(
    lock_bytes: &[u8],
    files: &BTreeMap<String, Vec<u8>>,
) -> Result<Lockfile, CurationError> {
    let lockfile = Lockfile::parse(lock_bytes).map_err(|issue| CurationError::Lock {
        issues: vec![issue],
    })?;
    let issues = lockfile.verify(files);
    if !issues.is_empty() {
        for issue in &issues {
            warn!(%issue, "Lock verification issue");
        }
        return Err(CurationError::Lock { issues });
    }
    info!(entries = lockfile.entries.len(), "Lockfile verified");
    Ok(lockfile)
}

/// Reads every file in the locked layout under `out_dir`.
///
/// Missing locked directories are treated as empty.
pub async fn collect_locked_files(
    out_dir: impl AsRef<Path>,
) -> Result<BTreeMap<String, Vec<u8>>, ExportError> {
    let out_dir = out_dir.as_ref();
    let mut names = Vec::new();

    for file in LOCKED_FILES {
        if out_dir.join(file).is_file() {
            names.push(file.to_string());
        }
    }
    for dir in LOCKED_DIRS {
        let root = out_dir.join(dir);
        if !root.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| ExportError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(out_dir)
                .map_err(|e| ExportError::Serialization(e.to_string()))?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            names.push(name);
        }
    }

    let mut files = BTreeMap::new();
    for name in names {
        let bytes = tokio::fs::read(out_dir.join(&name)).await?;
        files.insert(name, bytes);
    }
    Ok(files)
}

/// Removes the lockfile, splits and artifacts from `out_dir` so a rejected
/// run leaves nothing that `verify` would accept.
///
/// Reports are left in place; the failing run rewrites the ones it produced.
pub async fn invalidate_release(out_dir: impl AsRef<Path>) -> Result<(), ExportError> {
    let out_dir = out_dir.as_ref();
    let mut removed = 0usize;

    for file in std::iter::once(LOCKFILE_NAME).chain(LOCKED_FILES) {
        match tokio::fs::remove_file(out_dir.join(file)).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    match tokio::fs::remove_dir_all(out_dir.join("artifacts")).await {
        Ok(()) => removed += 1,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    if removed > 0 {
        warn!(out = %out_dir.display(), removed, "Previous release invalidated");
    }
    Ok(())
}
