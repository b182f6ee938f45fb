//! Incremental reads of a run's log.
//!
//! Clients poll with the mark returned by their previous read. Each mark is
//! an opaque id resolving to a byte offset in a [`TtlCache`]; every read
//! mints a fresh mark, so a client that stops polling leaves nothing behind
//! once the TTL lapses.

use serde::{Deserialize, Serialize};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::error::Result;

/// Maximum bytes returned per read.
pub const BUFF_SIZE: usize = 10 * 1024;

/// Default lifetime of a mark.
pub const DEFAULT_MARK_TTL: Duration = Duration::from_secs(5);

/// Message sent while the log file does not exist yet.
pub const WAITING_MESSAGE: &str = "Waiting ...\n";

/// Message sent when the run finished without leaving a log.
pub const NOT_FOUND_MESSAGE: &str = "Not found the log";

/// One polled chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailChunk {
    /// Log text with `\n` turned into `\r\n` for terminal clients
    pub data: String,
    /// No more data will ever follow
    pub end: bool,
    /// Pass back on the next read
    pub mark: String,
}

/// Reads log files in bounded chunks.
#[derive(Debug, Clone)]
pub struct LogTail {
    cache: Arc<TtlCache>,
    mark_ttl: Duration,
}

impl LogTail {
    pub fn new(cache: Arc<TtlCache>) -> Self {
        Self {
            cache,
            mark_ttl: DEFAULT_MARK_TTL,
        }
    }

    pub fn with_mark_ttl(mut self, ttl: Duration) -> Self {
        self.mark_ttl = ttl;
        self
    }

    fn cache_key(mark: &str) -> String {
        format!("log_tail_mark_{}", mark)
    }

    /// Read the next chunk of `path`.
    ///
    /// `is_finished` must be sampled before calling: `end` is only reported
    /// when the run had already finished and this read found no new bytes,
    /// so the last lines written before completion are never skipped.
    pub async fn read(&self, path: &Path, is_finished: bool, mark: Option<&str>) -> Result<TailChunk> {
        let mark = match mark.filter(|m| !m.is_empty()) {
            Some(mark) => mark.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        let mut file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let data = if is_finished {
                    NOT_FOUND_MESSAGE
                } else {
                    WAITING_MESSAGE
                };
                return Ok(TailChunk {
                    data: data.to_string(),
                    end: is_finished,
                    mark,
                });
            }
            Err(err) => return Err(err.into()),
        };

        let offset = self
            .cache
            .get_as::<u64>(&Self::cache_key(&mark))
            .unwrap_or(0);
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = Vec::with_capacity(BUFF_SIZE);
        (&mut file).take(BUFF_SIZE as u64).read_to_end(&mut buf).await?;

        let (text, consumed) = decode_chunk(&buf);
        let next_mark = Uuid::new_v4().to_string();
        self.cache.set(
            Self::cache_key(&next_mark),
            offset + consumed as u64,
            Some(self.mark_ttl),
        );

        Ok(TailChunk {
            end: text.is_empty() && is_finished,
            data: text.replace('\n', "\r\n"),
            mark: next_mark,
        })
    }
}

/// Decode a chunk, holding back a multi-byte character cut at the end.
fn decode_chunk(buf: &[u8]) -> (String, usize) {
    match std::str::from_utf8(buf) {
        Ok(text) => (text.to_string(), buf.len()),
        Err(err) if err.error_len().is_none() => {
            let valid = err.valid_up_to();
            (String::from_utf8_lossy(&buf[..valid]).into_owned(), valid)
        }
        Err(_) => (String::from_utf8_lossy(buf).into_owned(), buf.len()),
    }
}
