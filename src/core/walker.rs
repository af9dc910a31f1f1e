use std::fs::{self, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::models::{EntryKind, MoveJob, TreeEntry, TreeTotals};
use crate::error::{MoveError, Result};

/// Depth-first, pre-order walk of `root`, children in file-name order.
///
/// Symlinks are reported as `EntryKind::Other` and never followed.
pub fn walk<F>(root: &Path, visit: &mut F) -> Result<()>
where
    F: FnMut(TreeEntry) -> Result<()>,
{
    let metadata = root
        .symlink_metadata()
        .map_err(|e| MoveError::traversal(root, e))?;
    let entry = TreeEntry::from_metadata(root.to_path_buf(), &metadata);
    let descend = entry.is_dir();

    visit(entry)?;

    if descend {
        let mut children = fs::read_dir(root)
            .map_err(|e| MoveError::traversal(root, e))?
            .map(|child| child.map(|c| c.path()))
            .collect::<std::io::Result<Vec<PathBuf>>>()
            .map_err(|e| MoveError::traversal(root, e))?;
        children.sort();

        for child in children {
            walk(&child, visit)?;
        }
    }

    Ok(())
}

/// First pass: count regular files and their bytes.
pub fn precount(root: &Path) -> Result<TreeTotals> {
    let mut totals = TreeTotals::default();

    walk(root, &mut |entry| {
        match entry.kind {
            EntryKind::File => {
                totals.files += 1;
                totals.bytes += entry.size;
            }
            EntryKind::Directory => totals.directories += 1,
            EntryKind::Other => {}
        }
        Ok(())
    })?;

    Ok(totals)
}

/// Summary of the dispatch pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub directories_created: u64,
    pub files_dispatched: u64,
    pub entries_skipped: u64,
}

/// Second pass: mirror directories and queue every regular file.
///
/// Runs on a blocking thread; a full queue blocks the walk. Directories
/// collected in `created_dirs` are in pre-order, parents first.
pub fn dispatch(
    source: &Path,
    destination: &Path,
    queue: &mpsc::Sender<MoveJob>,
    created_dirs: &mut Vec<PathBuf>,
) -> Result<DispatchSummary> {
    let mut summary = DispatchSummary::default();

    walk(source, &mut |entry| {
        let relative = entry
            .path
            .strip_prefix(source)
            .map_err(|_| MoveError::InvalidPath {
                path: entry.path.clone(),
                reason: format!("not under {}", source.display()),
            })?;
        let target = if relative.as_os_str().is_empty() {
            destination.to_path_buf()
        } else {
            destination.join(relative)
        };

        match entry.kind {
            EntryKind::Directory => {
                create_directory(&target, entry.mode)?;
                created_dirs.push(entry.path);
                summary.directories_created += 1;
            }
            EntryKind::File => {
                let job = MoveJob {
                    source: entry.path,
                    destination: target,
                    mode: entry.mode,
                    size: entry.size,
                };
                debug!(source = %job.source.display(), size = job.size, "Queueing file");

                // Every worker has exited: the run is being cancelled.
                queue.blocking_send(job).map_err(|_| MoveError::Cancelled)?;
                summary.files_dispatched += 1;
            }
            EntryKind::Other => {
                warn!(
                    path = %entry.path.display(),
                    "Skipping entry that is not a regular file or directory"
                );
                summary.entries_skipped += 1;
            }
        }

        Ok(())
    })?;

    Ok(summary)
}

/// Create one destination directory with the source's mode.
fn create_directory(path: &Path, mode: u32) -> Result<()> {
    fs::create_dir(path).map_err(|e| MoveError::traversal(path, e))?;
    fs::set_permissions(path, Permissions::from_mode(mode))
        .map_err(|e| MoveError::traversal(path, e))?;
    Ok(())
}

/// Remove emptied source directories, deepest first. Returns how many went.
///
/// Directories that still hold something (skipped entries) are left alone.
pub fn prune_empty_dirs(dirs: &[PathBuf]) -> u64 {
    let mut pruned = 0;

    for dir in dirs.iter().rev() {
        match fs::remove_dir(dir) {
            Ok(()) => pruned += 1,
            Err(e) => debug!(path = %dir.display(), error = %e, "Keeping source directory"),
        }
    }

    pruned
}
