// src/stream/line.rs

//! Single-source line reader.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};

/// A line stream over a type-erased reader, used when streams of different
/// concrete types (e.g. `ChildStdout` and `ChildStderr`) share a collection.
pub type BoxedLineStream = LineStream<Box<dyn AsyncBufRead + Send + Unpin>>;

/// Reads one line at a time from an async byte source.
///
/// Lines are returned without their trailing `\n` / `\r\n`. Bytes that are
/// not valid UTF-8 are replaced rather than failing the stream, so a tool
/// that prints a stray binary byte does not cut off the rest of its log.
///
/// `next_line` is cancel safe: bytes read by a dropped call are kept in the
/// internal buffer and show up in the next returned line.
pub struct LineStream<R> {
    reader: R,
    buf: Vec<u8>,
    exhausted: bool,
}

impl<R> LineStream<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            exhausted: false,
        }
    }

    /// Next line from the source, or `None` once the source is closed.
    ///
    /// Keeps returning `None` after exhaustion. An I/O error from the
    /// underlying source is propagated as-is.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        if self.exhausted {
            return Ok(None);
        }

        let read = self.reader.read_until(b'\n', &mut self.buf).await?;

        if read == 0 && self.buf.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }

        let line = decode_line(&self.buf);
        self.buf.clear();
        Ok(Some(line))
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl BoxedLineStream {
    /// Box any async reader into a [`BoxedLineStream`].
    pub fn boxed<S>(source: S) -> Self
    where
        S: AsyncRead + Send + Unpin + 'static,
    {
        LineStream::new(Box::new(BufReader::new(source)))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && raw[end - 1] == b'\r' {
            end -= 1;
        }
    }
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::io::{AsyncWriteExt, ReadBuf};

    #[tokio::test]
    async fn returns_lines_in_order_then_none_repeatedly() {
        let mut stream = LineStream::new(&b"first\nsecond\r\nthird"[..]);

        assert_eq!(stream.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(stream.next_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(stream.next_line().await.unwrap().as_deref(), Some("third"));
        assert_eq!(stream.next_line().await.unwrap(), None);
        assert_eq!(stream.next_line().await.unwrap(), None);
        assert!(stream.is_exhausted());
    }

    #[tokio::test]
    async fn empty_lines_are_preserved() {
        let mut stream = LineStream::new(&b"\n\nx\n"[..]);

        assert_eq!(stream.next_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(stream.next_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(stream.next_line().await.unwrap().as_deref(), Some("x"));
        assert_eq!(stream.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let mut stream = LineStream::new(&b"ok \xff done\n"[..]);

        let line = stream.next_line().await.unwrap().unwrap();
        assert!(line.starts_with("ok "));
        assert!(line.ends_with(" done"));
    }

    #[tokio::test]
    async fn waits_for_writer_to_complete_a_line() {
        let (reader, mut writer) = tokio::io::duplex(64);
        let mut stream = BoxedLineStream::boxed(reader);

        let writer_task = tokio::spawn(async move {
            writer.write_all(b"par").await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            writer.write_all(b"tial\n").await.unwrap();
        });

        assert_eq!(stream.next_line().await.unwrap().as_deref(), Some("partial"));
        writer_task.await.unwrap();
        assert_eq!(stream.next_line().await.unwrap(), None);
    }

    struct FailingReader;

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe gone")))
        }
    }

    #[tokio::test]
    async fn propagates_source_errors() {
        let mut stream = BoxedLineStream::boxed(FailingReader);

        let err = stream.next_line().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
