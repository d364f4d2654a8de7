//! Incremental splitting of command output into delimiter-separated chunks.

use futures::Stream;
use std::collections::VecDeque;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const NUL: u8 = b'\0';
pub const NEWLINE: u8 = b'\n';

const READ_SIZE: usize = 512;

/// Splits bytes on a single delimiter, carrying incomplete chunks across reads.
///
/// Bytes are decoded only once a chunk is complete, so a multi-byte character
/// split across two reads still decodes correctly. Invalid UTF-8 is replaced.
#[derive(Debug)]
pub struct Chunker {
    sep: u8,
    pending: Vec<u8>,
}

impl Chunker {
    pub fn new(sep: u8) -> Self {
        Self {
            sep,
            pending: Vec::new(),
        }
    }

    /// Consume one read's worth of data and return every chunk it completed.
    pub fn feed(&mut self, mut data: &[u8]) -> Vec<String> {
        let mut chunks = Vec::new();
        while let Some(i) = data.iter().position(|&b| b == self.sep) {
            self.pending.extend_from_slice(&data[..i]);
            chunks.push(String::from_utf8_lossy(&self.pending).into_owned());
            self.pending.clear();
            data = &data[i + 1..];
        }
        self.pending.extend_from_slice(data);
        chunks
    }

    /// The trailing chunk left over at end of stream, if it is non-empty.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(rest)
    }
}

/// Lazily reads chunks from an async reader.
pub struct ChunkReader<R> {
    reader: R,
    chunker: Chunker,
    ready: VecDeque<String>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    pub fn new(reader: R, sep: u8) -> Self {
        Self {
            reader,
            chunker: Chunker::new(sep),
            ready: VecDeque::new(),
            eof: false,
        }
    }

    /// Next complete chunk, or `None` once the reader is exhausted.
    pub async fn next_chunk(&mut self) -> io::Result<Option<String>> {
        let mut buf = [0u8; READ_SIZE];
        loop {
            if let Some(chunk) = self.ready.pop_front() {
                return Ok(Some(chunk));
            }
            if self.eof {
                return Ok(None);
            }

            let n = self.reader.read(&mut buf).await?;
            if n == 0 {
                self.eof = true;
                self.ready.extend(self.chunker.finish());
            } else {
                self.ready.extend(self.chunker.feed(&buf[..n]));
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = io::Result<String>> {
        futures::stream::unfold(Some(self), |state| async move {
            let mut reader = state?;
            match reader.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(reader))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}
