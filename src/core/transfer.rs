use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{self, ErrorKind, Read, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::models::ProgressEvent;
use crate::error::{MoveError, Result};

/// Size of the intermediate copy buffer; one progress event per buffer write.
pub const BUFFER_SIZE: usize = 32 * 1024;

/// Options for a single file transfer
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferOptions {
    /// fsync the destination before reporting the file as transferred
    pub sync_file: bool,
}

/// Copy `source` to `destination`, creating or truncating it with `mode`.
///
/// Sends `BytesWritten` after every buffer write and `FileTransferred` once
/// the last byte is flushed. Returns the number of bytes written. A partial
/// destination is left in place on failure.
pub fn transfer_file(
    source: &Path,
    destination: &Path,
    mode: u32,
    options: TransferOptions,
    events: &UnboundedSender<ProgressEvent>,
    cancel: &CancellationToken,
) -> Result<u64> {
    let err = |e: io::Error| MoveError::Transfer {
        source_path: source.to_path_buf(),
        destination: destination.to_path_buf(),
        source: e,
    };

    // Nothing is created once the run is winding down.
    if cancel.is_cancelled() {
        return Err(MoveError::Cancelled);
    }

    let mut reader = File::open(source).map_err(err)?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(destination)
        .map_err(err)?;

    // The umask may have narrowed the mode on create.
    writer
        .set_permissions(Permissions::from_mode(mode))
        .map_err(err)?;

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut bytes_written: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(MoveError::Cancelled);
        }

        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(err(e)),
        };

        writer.write_all(&buffer[..bytes_read]).map_err(err)?;
        bytes_written += bytes_read as u64;

        // A closed channel only means nobody is watching progress.
        let _ = events.send(ProgressEvent::BytesWritten(bytes_read as u64));
    }

    writer.flush().map_err(err)?;
    if options.sync_file {
        writer.sync_all().map_err(err)?;
    }
    drop(writer);

    if let Err(e) = preserve_timestamps(source, destination) {
        debug!(
            dest = %destination.display(),
            error = %e,
            "Failed to preserve file timestamps"
        );
    }

    let _ = events.send(ProgressEvent::FileTransferred);

    Ok(bytes_written)
}

/// Preserve access and modification timestamps from source to destination
fn preserve_timestamps(source: &Path, dest: &Path) -> io::Result<()> {
    let source_metadata = fs::metadata(source)?;

    let atime = filetime::FileTime::from_last_access_time(&source_metadata);
    let mtime = filetime::FileTime::from_last_modification_time(&source_metadata);

    filetime::set_file_times(dest, atime, mtime)
}
