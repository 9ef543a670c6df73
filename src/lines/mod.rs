//! # Pull-based line framing.
//!
//! [`LineReader`] turns an [`AsyncRead`] into trimmed, non-empty text lines.
//! It sits on a [`BufReader`] and fills it only while a [`LineReader::next`]
//! call is waiting for a line, so a slow consumer applies backpressure all
//! the way to the producer (e.g. a child process blocked on a full stdout pipe).
//!
//! ## Rules
//! - Lines split on `\n`; surrounding whitespace (including `\r`) is trimmed.
//! - Empty lines are skipped.
//! - At end of stream the buffered partial line is returned before `None`.
//! - A read error fails the pending call and every later call.
//! - `next` is cancel safe: bytes of an unfinished line survive a dropped call.
//! - File-backed readers own their file; stream-backed readers hand the stream
//!   back from [`LineReader::dispose`].

use std::io;
use std::path::Path;

use serde::de::DeserializeOwned;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

const CHUNK: usize = 8 * 1024;

/// Line framer over an async byte stream.
pub struct LineReader<R> {
    reader: Option<BufReader<R>>,
    owned: bool,
    line: Vec<u8>,
    eof: bool,
    failed: Option<(io::ErrorKind, String)>,
}

impl LineReader<File> {
    /// Opens `path`; the file is closed on [`dispose`](LineReader::dispose).
    pub async fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path).await?;
        Ok(Self::with_stream(file, true))
    }
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Wraps a stream owned by someone else.
    pub fn from_stream(stream: R) -> Self {
        Self::with_stream(stream, false)
    }

    fn with_stream(stream: R, owned: bool) -> Self {
        Self {
            reader: Some(BufReader::with_capacity(CHUNK, stream)),
            owned,
            line: Vec::new(),
            eof: false,
            failed: None,
        }
    }

    /// Returns the next non-empty line, or `None` at end of stream.
    pub async fn next(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some((kind, msg)) = &self.failed {
                return Err(io::Error::new(*kind, msg.clone()));
            }
            if self.eof {
                return Ok(None);
            }
            let Some(reader) = self.reader.as_mut() else {
                self.eof = true;
                continue;
            };

            match reader.read_until(b'\n', &mut self.line).await {
                Ok(0) => self.eof = true,
                Ok(_) => {}
                Err(e) => {
                    self.failed = Some((e.kind(), e.to_string()));
                    return Err(e);
                }
            }

            // Partial bytes stay in `line` until a delimiter or end of stream.
            let text = String::from_utf8_lossy(&self.line).trim().to_string();
            self.line.clear();
            if !text.is_empty() {
                return Ok(Some(text));
            }
        }
    }

    /// Releases the reader.
    ///
    /// Owned (file-backed) streams are dropped, which closes them; borrowed
    /// streams are returned to the caller. Bytes already buffered but not yet
    /// returned as lines are discarded.
    pub fn dispose(mut self) -> Option<R> {
        let reader = self.reader.take();
        if self.owned {
            None
        } else {
            reader.map(BufReader::into_inner)
        }
    }
}

/// Reads every non-empty line of `path`.
pub async fn read_all_lines(path: impl AsRef<Path>) -> io::Result<Vec<String>> {
    let mut reader = LineReader::from_file(path).await?;
    let mut out = Vec::new();
    while let Some(line) = reader.next().await? {
        out.push(line);
    }
    reader.dispose();
    Ok(out)
}

/// Reads `path` as one JSON document per line.
pub async fn read_objects<T: DeserializeOwned>(path: impl AsRef<Path>) -> io::Result<Vec<T>> {
    read_all_lines(path)
        .await?
        .iter()
        .map(|line| serde_json::from_str(line).map_err(io::Error::from))
        .collect()
}

/// Reads every remaining line of an already open stream.
pub async fn drain<R: AsyncRead + Unpin>(stream: R) -> io::Result<Vec<String>> {
    let mut reader = LineReader::from_stream(stream);
    let mut out = Vec::new();
    while let Some(line) = reader.next().await? {
        out.push(line);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    #[tokio::test]
    async fn test_trims_and_skips_empty_lines() {
        let mut reader = LineReader::from_stream(&b"a\nb\n\n"[..]);
        assert_eq!(reader.next().await.unwrap().as_deref(), Some("a"));
        assert_eq!(reader.next().await.unwrap().as_deref(), Some("b"));
        assert_eq!(reader.next().await.unwrap(), None);
        assert_eq!(reader.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_flushes_partial_line_at_eof() {
        let lines = drain(&b"  first \r\n\n  second"[..]).await.unwrap();
        assert_eq!(lines, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_borrowed_stream_is_handed_back() {
        let data: &[u8] = b"x\ny\n";
        let mut reader = LineReader::from_stream(data);
        assert_eq!(reader.next().await.unwrap().as_deref(), Some("x"));
        let rest = reader.dispose().unwrap();
        assert!(rest.is_empty());
    }

    struct Broken;

    impl AsyncRead for Broken {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::other("pipe broke")))
        }
    }

    #[tokio::test]
    async fn test_error_is_sticky() {
        let mut reader = LineReader::from_stream(Broken);
        assert!(reader.next().await.is_err());
        let again = reader.next().await.unwrap_err();
        assert_eq!(again.to_string(), "pipe broke");
    }

    /// Hands out one queued chunk per read and counts the reads.
    struct Chunked {
        chunks: VecDeque<&'static [u8]>,
        reads: Arc<AtomicUsize>,
    }

    impl AsyncRead for Chunked {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if let Some(chunk) = self.chunks.pop_front() {
                buf.put_slice(chunk);
            }
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_reads_only_while_a_line_is_requested() {
        let reads = Arc::new(AtomicUsize::new(0));
        let stream = Chunked {
            chunks: VecDeque::from([&b"a\n"[..], &b"b\n"[..], &b"c"[..]]),
            reads: Arc::clone(&reads),
        };

        let mut reader = LineReader::from_stream(stream);
        assert_eq!(reads.load(Ordering::SeqCst), 0);

        assert_eq!(reader.next().await.unwrap().as_deref(), Some("a"));
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        assert_eq!(reader.next().await.unwrap().as_deref(), Some("b"));
        assert_eq!(reads.load(Ordering::SeqCst), 2);

        assert_eq!(reader.next().await.unwrap().as_deref(), Some("c"));
        assert_eq!(reader.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "{\"n\":1}\n\n{\"n\":2}\n").unwrap();

        assert_eq!(read_all_lines(&path).await.unwrap().len(), 2);

        #[derive(serde::Deserialize)]
        struct Row {
            n: u32,
        }
        let rows: Vec<Row> = read_objects(&path).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.n).sum::<u32>(), 3);

        let reader = LineReader::from_file(&path).await.unwrap();
        assert!(reader.dispose().is_none());
    }
}
