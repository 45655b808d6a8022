//! Output capture for launched SDK tools.
//!
//! One drain task per child stream appends complete lines to an
//! [`OutputBuffer`]. Readers take snapshots at any time; a snapshot is always
//! a prefix of the final contents and never ends in the middle of a line.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Append-only text buffer shared between a drain task and its readers.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    inner: Arc<Mutex<String>>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, String> {
        // Appends are single push_str calls, so a poisoned buffer is still whole.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one line plus a line terminator as a single step.
    pub fn append_line(&self, line: &str) {
        let mut buf = self.lock();
        buf.reserve(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
    }

    /// Snapshot of everything captured so far.
    pub fn contents(&self) -> String {
        self.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lock().contains(needle)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Where child stderr ends up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamMode {
    /// Stderr ends up in the stdout buffer and the stderr buffer stays empty.
    /// [`crate::ProcessLauncher`] points both child streams at one pipe, so
    /// the buffer keeps the order the child wrote in.
    #[default]
    Merged,
    /// Each stream has its own buffer.
    Separate,
}

/// Background drain tasks for one child process.
///
/// A drain task ends at end-of-stream or when [`OutputMonitor::stop`] is
/// called, whichever comes first. Read errors end the task quietly.
#[derive(Debug)]
pub struct OutputMonitor {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl OutputMonitor {
    /// Start draining `stdout` and `stderr` into the given buffers.
    pub fn spawn<O, E>(
        stdout: Option<O>,
        stderr: Option<E>,
        stdout_buf: &OutputBuffer,
        stderr_buf: &OutputBuffer,
        mode: StreamMode,
    ) -> Self
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let mut tasks = Vec::with_capacity(2);

        if let Some(stdout) = stdout {
            tasks.push(tokio::spawn(drain(
                stdout,
                stdout_buf.clone(),
                cancel.clone(),
                "stdout",
            )));
        }
        if let Some(stderr) = stderr {
            let target = match mode {
                StreamMode::Merged => stdout_buf.clone(),
                StreamMode::Separate => stderr_buf.clone(),
            };
            tasks.push(tokio::spawn(drain(stderr, target, cancel.clone(), "stderr")));
        }

        Self { cancel, tasks }
    }

    /// Ask the drain tasks to finish. Does not wait for them.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait up to `limit` for the drain tasks to reach end-of-stream.
    ///
    /// Used after the child has exited so trailing output is in the buffers
    /// before they are inspected. Returns `false` if the limit was hit.
    pub async fn settle(&mut self, limit: Duration) -> bool {
        let tasks = std::mem::take(&mut self.tasks);
        let joined = tokio::time::timeout(limit, async {
            for task in tasks {
                if let Err(err) = task.await {
                    warn!(error = %err, "output drain task failed");
                }
            }
        })
        .await;
        if joined.is_err() {
            debug!(limit_ms = limit.as_millis() as u64, "output still open after child exit");
        }
        joined.is_ok()
    }
}

impl Drop for OutputMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn drain<R>(reader: R, buffer: OutputBuffer, cancel: CancellationToken, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::with_capacity(256);

    loop {
        line.clear();
        let read = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(stream, "output monitor stopped");
                break;
            }
            read = reader.read_until(b'\n', &mut line) => read,
        };

        match read {
            Ok(0) => {
                debug!(stream, "end of output stream");
                break;
            }
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                buffer.append_line(text.trim_end_matches(['\n', '\r']));
            }
            Err(err) => {
                debug!(stream, error = %err, "output read failed; dropping remaining output");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn buffer_appends_lines_with_terminator() {
        let buf = OutputBuffer::new();
        assert!(buf.is_empty());
        buf.append_line("one");
        buf.append_line("two");
        assert_eq!(buf.contents(), "one\ntwo\n");
        assert!(buf.contains("two"));
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn concurrent_reads_see_whole_lines() {
        let buf = OutputBuffer::new();
        let writer = {
            let buf = buf.clone();
            std::thread::spawn(move || {
                for i in 0..2000 {
                    buf.append_line(&format!("line-{i:04}"));
                }
            })
        };

        for _ in 0..200 {
            let snapshot = buf.contents();
            assert!(snapshot.is_empty() || snapshot.ends_with('\n'));
            for (i, line) in snapshot.lines().enumerate() {
                assert_eq!(line, format!("line-{i:04}"));
            }
        }
        writer.join().unwrap();
        assert_eq!(buf.contents().lines().count(), 2000);
    }

    #[tokio::test]
    async fn merged_mode_collects_both_streams_into_stdout() {
        let (mut out_w, out_r) = tokio::io::duplex(64);
        let (mut err_w, err_r) = tokio::io::duplex(64);
        let stdout = OutputBuffer::new();
        let stderr = OutputBuffer::new();
        let mut monitor =
            OutputMonitor::spawn(Some(out_r), Some(err_r), &stdout, &stderr, StreamMode::Merged);

        out_w.write_all(b"hello\n").await.unwrap();
        err_w.write_all(b"oops\r\n").await.unwrap();
        drop(out_w);
        drop(err_w);

        assert!(monitor.settle(Duration::from_secs(5)).await);
        let contents = stdout.contents();
        assert!(contents.contains("hello\n"));
        assert!(contents.contains("oops\n"));
        assert!(!contents.contains('\r'));
        assert!(stderr.is_empty());
    }

    #[tokio::test]
    async fn separate_mode_keeps_streams_apart() {
        let (mut out_w, out_r) = tokio::io::duplex(64);
        let (mut err_w, err_r) = tokio::io::duplex(64);
        let stdout = OutputBuffer::new();
        let stderr = OutputBuffer::new();
        let mut monitor =
            OutputMonitor::spawn(Some(out_r), Some(err_r), &stdout, &stderr, StreamMode::Separate);

        out_w.write_all(b"to stdout\n").await.unwrap();
        err_w.write_all(b"to stderr").await.unwrap();
        drop(out_w);
        drop(err_w);

        assert!(monitor.settle(Duration::from_secs(5)).await);
        assert_eq!(stdout.contents(), "to stdout\n");
        // Unterminated trailing line still lands as a whole line.
        assert_eq!(stderr.contents(), "to stderr\n");
    }

    #[tokio::test]
    async fn stop_ends_drain_while_stream_is_open() {
        let (mut out_w, out_r) = tokio::io::duplex(64);
        let stdout = OutputBuffer::new();
        let stderr = OutputBuffer::new();
        let mut monitor = OutputMonitor::spawn(
            Some(out_r),
            None::<tokio::io::DuplexStream>,
            &stdout,
            &stderr,
            StreamMode::Merged,
        );

        out_w.write_all(b"before stop\n").await.unwrap();
        for _ in 0..100 {
            if stdout.contains("before stop") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        monitor.stop();
        assert!(monitor.is_stopped());
        assert!(monitor.settle(Duration::from_secs(5)).await);
        assert_eq!(stdout.contents(), "before stop\n");
        // Writer is still open; the buffer keeps what was captured.
        drop(out_w);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced_not_dropped() {
        let (mut out_w, out_r) = tokio::io::duplex(64);
        let stdout = OutputBuffer::new();
        let stderr = OutputBuffer::new();
        let mut monitor = OutputMonitor::spawn(
            Some(out_r),
            None::<tokio::io::DuplexStream>,
            &stdout,
            &stderr,
            StreamMode::Merged,
        );

        out_w.write_all(b"bad \xff byte\nnext\n").await.unwrap();
        drop(out_w);

        assert!(monitor.settle(Duration::from_secs(5)).await);
        let contents = stdout.contents();
        assert!(contents.starts_with("bad "));
        assert!(contents.ends_with("next\n"));
    }
}
