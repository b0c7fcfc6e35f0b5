//! Collision-safe placement of produced files
//!
//! A produced file is moved to its canonical name. If that name is taken the
//! existing file stays untouched and the lowest free `{stem}_{n}{ext}` variant
//! is used instead. Nothing that already exists in the destination is ever
//! deleted or overwritten.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Highest numeric suffix tried before giving up
pub const MAX_SUFFIX: u32 = 9999;

/// Errors for a single placement
#[derive(Error, Debug)]
pub enum PlaceError {
    #[error("Source file not found: {0}")]
    SourceMissing(PathBuf),

    #[error("Invalid target name: {0:?}")]
    InvalidName(String),

    #[error("No free name for {name} after {} attempts", MAX_SUFFIX)]
    Exhausted { name: String },

    #[error("Failed to move {from:?} to {to:?}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Move `source` into `destination_dir` as `canonical_name` without clobbering
///
/// Returns the basename actually used.
pub fn place(
    source: &Path,
    canonical_name: &str,
    destination_dir: &Path,
) -> Result<String, PlaceError> {
    if !is_plain_basename(canonical_name) {
        return Err(PlaceError::InvalidName(canonical_name.to_string()));
    }
    if fs::symlink_metadata(source).is_err() {
        return Err(PlaceError::SourceMissing(source.to_path_buf()));
    }

    let target = destination_dir.join(canonical_name);
    if is_same_file(source, &target) {
        return Ok(canonical_name.to_string());
    }
    if move_if_vacant(source, &target)? {
        return Ok(canonical_name.to_string());
    }

    let (stem, extension) = split_name(canonical_name);
    for n in 1..=MAX_SUFFIX {
        let candidate = format!("{}_{}{}", stem, n, extension);
        if move_if_vacant(source, &destination_dir.join(&candidate))? {
            return Ok(candidate);
        }
    }

    Err(PlaceError::Exhausted {
        name: canonical_name.to_string(),
    })
}

/// Move `source` to `target` only if nothing exists at `target`
///
/// Returns `Ok(false)` when the target is occupied. A hard link refuses to
/// replace an existing entry, which closes the gap between checking and
/// moving; filesystems without hard links fall back to check-then-rename.
fn move_if_vacant(source: &Path, target: &Path) -> Result<bool, PlaceError> {
    let move_err = |e: io::Error| PlaceError::Move {
        from: source.to_path_buf(),
        to: target.to_path_buf(),
        source: e,
    };

    match fs::hard_link(source, target) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(source) {
                // Undo the new link; the source is still intact
                let _ = fs::remove_file(target);
                return Err(move_err(e));
            }
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => {
            log::debug!("hard link {:?} failed ({}), falling back to rename", target, e);
            if fs::symlink_metadata(target).is_ok() {
                return Ok(false);
            }
            fs::rename(source, target).map_err(move_err)?;
            Ok(true)
        }
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn is_plain_basename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}

/// `vocal.wav` → (`vocal`, `.wav`); `vocal` → (`vocal`, ``)
fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    }
}
