//! Integrity locking and release verification.
//!
//! # Overview
//!
//! After packaging, every report, `splits.json` and every artifact is bound
//! into `golden.lock.json`:
//!
//! 1. **Digest** - SHA-256 helpers, also used for seed derivation
//! 2. **Lockfile** - Per-file digests plus a root digest over all entries
//! 3. **Release** - Count and split consistency checks on the locked content
//!
//! # Usage
//!
//! ```rust,ignore
//! use golden_forge::integrity::{collect_locked_files, verify_lock, ReleaseChecker};
//!
//! let files = collect_locked_files(&out_dir).await?;
//! let lock_bytes = tokio::fs::read(out_dir.join(LOCKFILE_NAME)).await?;
//! verify_lock(&lock_bytes, &files)?;
//! let issues = ReleaseChecker::new(5, strata).check(&files);
//! ```

pub mod digest;
pub mod lockfile;
pub mod release;

// Re-export main types for convenience
pub use digest::{derive_seed, is_sha256_hex, sha256_hex, sha256_u64};
pub use lockfile::{
    collect_locked_files, invalidate_release, is_locked_path, verify_lock, Lockfile,
    LOCKFILE_NAME, LOCK_ALGORITHM, LOCK_VERSION,
};
pub use release::ReleaseChecker;
