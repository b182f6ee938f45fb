//! Run history and log tailing.

pub mod log;
pub mod record;
pub mod tail;

pub use log::RunLog;
pub use record::{HistorySummary, RunHistory};
pub use tail::{LogTail, TailChunk, BUFF_SIZE, NOT_FOUND_MESSAGE, WAITING_MESSAGE};
