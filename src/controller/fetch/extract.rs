//! # Archive Extraction
//!
//! Unpacks a tar.gz artifact member by member. Each member path and each link
//! target is confined to the destination before anything is written.

use super::secure_path::secure_join;
use super::FetchError;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::debug;

/// Extract `archive` into `destination`
///
/// Blocking; run it on a blocking thread.
pub(crate) fn extract_tar_gz(
    archive: &Path,
    destination: &Path,
    max_bytes: Option<u64>,
) -> Result<(), FetchError> {
    let file = File::open(archive).map_err(|source| FetchError::Io {
        path: archive.display().to_string(),
        source,
    })?;
    std::fs::create_dir_all(destination).map_err(|source| FetchError::Io {
        path: destination.display().to_string(),
        source,
    })?;

    let mut tar = Archive::new(GzDecoder::new(BufReader::new(file)));
    let mut extracted: u64 = 0;

    for entry in tar.entries().map_err(FetchError::Extract)? {
        let mut entry = entry.map_err(FetchError::Extract)?;
        let member = entry.path().map_err(FetchError::Extract)?.into_owned();
        let entry_type = entry.header().entry_type();

        // Rejects traversal in the member name itself
        secure_join(destination, &member)?;

        match entry_type {
            EntryType::Directory | EntryType::Regular | EntryType::Continuous => {}
            EntryType::Symlink | EntryType::Link => {
                let target = entry
                    .link_name()
                    .map_err(FetchError::Extract)?
                    .ok_or_else(|| FetchError::PathEscape {
                        path: member.display().to_string(),
                    })?
                    .into_owned();
                confine_link(&member, &target, entry_type == EntryType::Link)?;
            }
            other => {
                debug!(member = %member.display(), entry_type = ?other, "Skipping unsupported archive member");
                continue;
            }
        }

        if entry_type.is_file() || entry_type == EntryType::Continuous {
            extracted = extracted.saturating_add(entry.header().size().map_err(FetchError::Extract)?);
            if let Some(limit) = max_bytes {
                if extracted > limit {
                    return Err(FetchError::TooLarge { limit });
                }
            }
        }

        entry.unpack_in(destination).map_err(FetchError::Extract)?;
    }

    Ok(())
}

/// Reject link targets that resolve outside the archive root
///
/// Symlink targets are relative to the member's directory, hard link targets
/// to the archive root. Absolute symlink targets always escape.
fn confine_link(member: &Path, target: &Path, hard: bool) -> Result<(), FetchError> {
    let escape = || FetchError::PathEscape {
        path: format!("{} -> {}", member.display(), target.display()),
    };

    if !hard && target.has_root() {
        return Err(escape());
    }

    let base: PathBuf = if hard {
        PathBuf::new()
    } else {
        member.parent().map(Path::to_path_buf).unwrap_or_default()
    };

    // Resolve lexically against a virtual root so escapes are detected
    let mut depth = 0usize;
    for component in base.join(target).components() {
        match component {
            Component::ParentDir => {
                if depth == 0 {
                    return Err(escape());
                }
                depth -= 1;
            }
            Component::Normal(_) => depth += 1,
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
        }
    }
    Ok(())
}
