//! Host/guest boot synchronization.
//!
//! The guest announces readiness by writing a sentinel to its console; the
//! host may snapshot the VM at that point and resume it any number of
//! times. The guest then waits to be released. Neither variant has a
//! timeout: the host owns the guest's lifetime and tears the VM down on
//! its own clock.

use crate::error::InitError;
use mayfly_mount::{mount_fs, unmount};
use nix::mount::MsFlags;
use std::io::{self, ErrorKind, Read, Write};
use std::path::Path;
use std::time::Duration;

/// Written to the console right before the guest parks itself.
pub const SENTINEL: &str = "==========";

/// Two-byte frame the releasing host writes to the console.
const RELEASE_PATTERN: [u8; 2] = [b'=', b'\n'];

/// Consecutive pattern frames that release the guest. The host writes the
/// frame exactly once; keep these in lockstep.
const RELEASE_TARGET: u32 = 1;

/// Mount options for 9p shares in the poll variant.
pub const POLL_MOUNT_OPTIONS: &str = "trans=virtio,version=9p2000.L";

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Stream variant: write the sentinel, then scan the input in exact
/// two-byte frames until the release pattern has appeared
/// [`RELEASE_TARGET`] times in a row. A mismatching frame resets the
/// count.
pub fn stream_marker<R: Read, W: Write>(input: &mut R, output: &mut W) -> Result<(), InitError> {
    output
        .write_all(SENTINEL.as_bytes())
        .map_err(InitError::Handshake)?;
    output.flush().map_err(InitError::Handshake)?;

    let mut frame = [0u8; 2];
    let mut seen = 0;
    loop {
        input.read_exact(&mut frame).map_err(InitError::Handshake)?;
        if frame == RELEASE_PATTERN {
            seen += 1;
            if seen == RELEASE_TARGET {
                tracing::debug!("released by host");
                return Ok(());
            }
        } else {
            seen = 0;
        }
    }
}

/// Poll variant: write the sentinel, then repeatedly try to mount the pack
/// share and look for `marker` inside it. The share stays mounted on
/// success. A missing marker means the host has not published the pack
/// yet: unmount and try again next interval. Any other probe failure is
/// fatal.
pub fn poll_mount(tag: &str, target: &Path, marker: &str) -> Result<(), InitError> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(SENTINEL.as_bytes())
        .map_err(InitError::Handshake)?;
    stdout.flush().map_err(InitError::Handshake)?;
    drop(stdout);

    loop {
        std::thread::sleep(POLL_INTERVAL);

        if let Err(err) = mount_fs(tag, target, "9p", MsFlags::empty(), POLL_MOUNT_OPTIONS) {
            tracing::debug!(error = %err, "pack share not mountable yet");
            continue;
        }

        match std::fs::metadata(target.join(marker)) {
            Ok(_) => {
                tracing::debug!("pack share published");
                return Ok(());
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(InitError::Handshake(err)),
        }

        unmount(target)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_marker_writes_sentinel_and_releases() {
        let mut input = io::Cursor::new(b"xx=\n".to_vec());
        let mut output = Vec::new();

        stream_marker(&mut input, &mut output).unwrap();

        assert_eq!(output, SENTINEL.as_bytes());
    }

    #[test]
    fn test_stream_marker_resets_on_mismatch() {
        // "==" and "ab" are mismatching frames; only the final frame counts.
        let mut input = io::Cursor::new(b"==ab=\n".to_vec());

        stream_marker(&mut input, &mut Vec::new()).unwrap();
    }

    #[test]
    fn test_stream_marker_input_ending_without_release() {
        let mut input = io::Cursor::new(b"xxyy".to_vec());

        let err = stream_marker(&mut input, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, InitError::Handshake(_)));
    }

    #[test]
    fn test_stream_marker_ignores_unaligned_pattern() {
        // The pattern starts at an odd offset, so no frame ever matches.
        let mut input = io::Cursor::new(b"x=\nz".to_vec());

        let err = stream_marker(&mut input, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, InitError::Handshake(_)));
    }
}
