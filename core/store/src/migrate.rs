//! Bulk conversion of a plaintext tree to the encrypted layout.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use cipherbox_common::{Error, Result};
use cipherbox_crypto::{encode_name, is_encrypted_name, ChunkEncoder, MasterKey};

/// Outcome of a migration walk.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Files streamed into their encrypted counterparts.
    pub files_encrypted: usize,
    /// Directories renamed to their encrypted names.
    pub dirs_renamed: usize,
    /// Entries already carrying the marker prefix.
    pub skipped: usize,
    /// Entries that failed to convert; the walk continued past them.
    pub failures: Vec<(PathBuf, Error)>,
}

impl MigrationReport {
    /// Whether every visited entry converted (or was already converted).
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Convert every unmanaged entry under `root` to the encrypted layout.
///
/// The walk keeps an explicit worklist of pending directories rather than
/// recursing. Unmanaged directories are renamed to their encrypted names
/// before their contents are visited; unmanaged files are streamed through
/// the chunk encoder into a sibling named by [`encode_name`], and the
/// original is removed only after the encrypted copy is fully written.
/// Entries already carrying the marker prefix are left untouched, so
/// re-running over a partially converted tree finishes the job. `root`
/// itself is never renamed.
///
/// A failed entry is recorded in the report and does not abort the walk.
pub fn migrate(key: &MasterKey, root: &Path) -> Result<MigrationReport> {
    if !root.is_dir() {
        return Err(Error::NotFound(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let mut report = MigrationReport::default();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                report.failures.push((
                    path,
                    Error::InvalidInput("non-UTF-8 entry name".to_string()),
                ));
                continue;
            };

            if is_encrypted_name(name) {
                report.skipped += 1;
                // Already-converted directories may still hold plaintext
                // entries from an interrupted run.
                if path.is_dir() {
                    pending.push(path);
                }
                continue;
            }

            let converted = if path.is_dir() {
                rename_dir(key, &dir, name).map(|renamed| {
                    report.dirs_renamed += 1;
                    pending.push(renamed);
                })
            } else {
                encrypt_file(key, &dir, name).map(|_| {
                    report.files_encrypted += 1;
                })
            };

            if let Err(e) = converted {
                warn!(path = %path.display(), error = %e, "migration entry failed");
                report.failures.push((path, e));
            }
        }
    }

    info!(
        files = report.files_encrypted,
        dirs = report.dirs_renamed,
        skipped = report.skipped,
        failures = report.failures.len(),
        "migration finished"
    );
    Ok(report)
}

fn rename_dir(key: &MasterKey, parent: &Path, name: &str) -> Result<PathBuf> {
    let target = parent.join(encode_name(key, name)?);
    fs::rename(parent.join(name), &target)?;
    debug!(dir = %target.display(), "directory renamed");
    Ok(target)
}

fn encrypt_file(key: &MasterKey, parent: &Path, name: &str) -> Result<()> {
    let source = parent.join(name);
    let target = parent.join(encode_name(key, name)?);

    let mut reader = fs::File::open(&source)?;
    let mut writer = fs::File::create(&target)?;
    if let Err(e) = ChunkEncoder::new(key).encode(&mut reader, &mut writer) {
        drop(writer);
        let _ = fs::remove_file(&target);
        return Err(e);
    }

    fs::remove_file(&source)?;
    debug!(file = %source.display(), "file encrypted");
    Ok(())
}
