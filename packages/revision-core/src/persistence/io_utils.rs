//! I/O error classification and retry for history files.

use std::io::ErrorKind;
use std::thread;
use std::time::Duration;

use crate::error::VersionError;

/// Maps an I/O error onto the matching `VersionError` variant.
///
/// Full disks and exhausted memory become `DiskFull`, interruptions and
/// timeouts become `TransientIoError`; everything else is `IoError`.
pub fn classify_io_error(error: std::io::Error, context: &str) -> VersionError {
    let message = format!("{}: {}", context, error);
    match error.kind() {
        ErrorKind::StorageFull | ErrorKind::OutOfMemory => VersionError::DiskFull(message),
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => {
            VersionError::TransientIoError(message)
        }
        _ => VersionError::IoError(message),
    }
}

/// Runs `operation`, retrying while it fails with `TransientIoError`.
///
/// # Arguments
/// * `operation` - Idempotent I/O step
/// * `max_retries` - Retries after the first attempt
/// * `retry_delay_ms` - Pause between attempts
/// * `context` - Name used in log lines
pub fn retry_io_operation<F, T>(
    mut operation: F,
    max_retries: u32,
    retry_delay_ms: u64,
    context: &str,
) -> Result<T, VersionError>
where
    F: FnMut() -> Result<T, VersionError>,
{
    let mut retries = 0;
    loop {
        let err = match operation() {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !matches!(err, VersionError::TransientIoError(_)) || retries >= max_retries {
            return Err(err);
        }
        retries += 1;
        tracing::warn!(
            "Transient I/O error in {} (retry {}/{}): {}",
            context,
            retries,
            max_retries,
            err
        );
        if retry_delay_ms > 0 {
            thread::sleep(Duration::from_millis(retry_delay_ms));
        }
    }
}
