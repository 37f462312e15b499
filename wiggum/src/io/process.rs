//! Helpers for draining child process pipes with bounded memory.

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Bytes captured from a pipe plus the number of bytes discarded past the limit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LimitedOutput {
    pub bytes: Vec<u8>,
    pub truncated: usize,
}

impl LimitedOutput {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn truncated_notice(&self, label: &str) -> String {
        if self.truncated > 0 {
            format!("\n[{label} truncated {} bytes]\n", self.truncated)
        } else {
            String::new()
        }
    }
}

/// Read `reader` to EOF, keeping at most `limit` bytes.
///
/// Bytes beyond the limit are still drained so the child never blocks on a
/// full pipe.
pub async fn read_stream_limited<R: AsyncRead + Unpin>(
    mut reader: R,
    limit: usize,
) -> Result<LimitedOutput> {
    let mut out = LimitedOutput::default();
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).await.context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(out.bytes.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            out.bytes.extend_from_slice(&chunk[..keep]);
            out.truncated += n.saturating_sub(keep);
        } else {
            out.truncated += n;
        }
    }

    Ok(out)
}
