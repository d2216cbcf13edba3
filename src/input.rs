//! Line-oriented user input.
//!
//! Lines are read off the caller's path, either on a tokio task (any
//! `AsyncRead`) or on a dedicated OS thread (process stdin), and handed
//! over through a bounded queue. The relay loop therefore never blocks on
//! the keyboard while socket data is waiting.
//!
//! Stdin gets its own thread because a pending blocking read would otherwise
//! hold up runtime shutdown until the user presses enter.

// ============================================================================
// Imports
// ============================================================================

use std::io::{self, BufRead};
use std::thread;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;

// ============================================================================
// InputSource
// ============================================================================

/// Queue of lines typed by the user.
///
/// `next_line` yields `Ok(None)` once input has ended (e.g. stdin closed).
/// That is a terminal signal, not an error.
pub struct InputSource {
    lines: mpsc::Receiver<io::Result<String>>,
    reader: Option<JoinHandle<()>>,
}

impl InputSource {
    /// Reads lines from `reader` on a tokio task.
    #[must_use]
    pub fn spawn<R>(reader: R, capacity: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, lines) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                let read = reader.read_until(b'\n', &mut buf).await;
                if !forward(&tx, read, &buf).await {
                    break;
                }
            }
            debug!("Input reader finished");
        });

        Self {
            lines,
            reader: Some(handle),
        }
    }

    /// Reads lines from process stdin on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the thread cannot be spawned.
    pub fn stdin(capacity: usize) -> Result<Self> {
        let (tx, lines) = mpsc::channel(capacity.max(1));

        thread::Builder::new()
            .name("stdin-reader".into())
            .spawn(move || {
                let mut stdin = io::stdin().lock();
                let mut buf = Vec::new();
                loop {
                    buf.clear();
                    let item = match stdin.read_until(b'\n', &mut buf) {
                        Ok(0) => break,
                        Ok(_) => Ok(decode_line(&buf)),
                        Err(e) => Err(e),
                    };
                    let failed = item.is_err();
                    if tx.blocking_send(item).is_err() || failed {
                        break;
                    }
                }
                debug!("Stdin reader finished");
            })?;

        Ok(Self {
            lines,
            reader: None,
        })
    }

    /// Returns the next line, or `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if reading failed. Input has
    /// ended after an error.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        match self.lines.recv().await {
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}

impl Drop for InputSource {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Sends one read result downstream. Returns `false` when reading must stop.
async fn forward(
    tx: &mpsc::Sender<io::Result<String>>,
    read: io::Result<usize>,
    buf: &[u8],
) -> bool {
    match read {
        Ok(0) => false,
        Ok(_) => tx.send(Ok(decode_line(buf))).await.is_ok(),
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

/// Strips the line terminator and decodes UTF-8.
///
/// Invalid sequences are replaced rather than rejected.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);

    match std::str::from_utf8(raw) {
        Ok(line) => line.to_owned(),
        Err(e) => {
            warn!(error = %e, "Input line is not valid UTF-8; replacing invalid bytes");
            String::from_utf8_lossy(raw).into_owned()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::io::AsyncWriteExt;
    use tokio_test::io::Builder;

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line(b"hello\n"), "hello");
        assert_eq!(decode_line(b"hello\r\n"), "hello");
        assert_eq!(decode_line(b"no newline"), "no newline");
        assert_eq!(decode_line(b"\n"), "");
        assert_eq!(decode_line(b"  padded  \n"), "  padded  ");
        assert_eq!(decode_line(b"bad \xff byte\n"), "bad \u{fffd} byte");
    }

    #[tokio::test]
    async fn test_lines_then_end_of_input() {
        let reader = Builder::new()
            .read(b"first\nsec")
            .read(b"ond\r\n\n")
            .read(b"last")
            .build();
        let mut input = InputSource::spawn(reader, 4);

        assert_eq!(input.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(input.next_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(input.next_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(input.next_line().await.unwrap().as_deref(), Some("last"));
        assert_eq!(input.next_line().await.unwrap(), None);
        assert_eq!(input.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_error_is_reported_then_ends() {
        let reader = Builder::new()
            .read(b"ok\n")
            .read_error(io::Error::other("tty gone"))
            .build();
        let mut input = InputSource::spawn(reader, 4);

        assert_eq!(input.next_line().await.unwrap().as_deref(), Some("ok"));
        assert!(input.next_line().await.is_err());
        assert_eq!(input.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_next_line_waits_for_complete_line() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut input = InputSource::spawn(client, 1);

        let pending = tokio::time::timeout(Duration::from_millis(20), input.next_line()).await;
        assert!(pending.is_err());

        server.write_all(b"par").await.unwrap();
        let partial = tokio::time::timeout(Duration::from_millis(20), input.next_line()).await;
        assert!(partial.is_err());

        server.write_all(b"tial\n").await.unwrap();
        assert_eq!(input.next_line().await.unwrap().as_deref(), Some("partial"));

        drop(server);
        assert_eq!(input.next_line().await.unwrap(), None);
    }
}
