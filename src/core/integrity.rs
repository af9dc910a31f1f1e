use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::path::Path;
use tracing::debug;

use crate::error::{MoveError, Result};

/// Buffer size used when streaming a file through the checksum
const BUFFER_SIZE: usize = 32 * 1024;

/// CRC-32 (IEEE) of a file's full content, streamed in chunks.
pub fn checksum_file(path: &Path) -> io::Result<u32> {
    let mut file = File::open(path)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}

/// Whether both files have the same checksum.
///
/// Fails closed: if either file cannot be opened or read, the files do not match.
pub fn files_match(a: &Path, b: &Path) -> bool {
    let checksums = checksum_file(a).and_then(|ca| Ok((ca, checksum_file(b)?)));

    match checksums {
        Ok((ca, cb)) => {
            debug!(
                source = %a.display(),
                destination = %b.display(),
                source_crc = format!("{ca:08x}"),
                destination_crc = format!("{cb:08x}"),
                "Compared checksums"
            );
            ca == cb
        }
        Err(e) => {
            debug!(
                source = %a.display(),
                destination = %b.display(),
                error = %e,
                "Checksum failed, treating as mismatch"
            );
            false
        }
    }
}

/// Confirm a completed transfer, mapping a mismatch to `IntegrityMismatch`.
pub fn verify_transfer(source: &Path, destination: &Path) -> Result<()> {
    if files_match(source, destination) {
        Ok(())
    } else {
        Err(MoveError::IntegrityMismatch {
            source_path: source.to_path_buf(),
            destination: destination.to_path_buf(),
        })
    }
}
