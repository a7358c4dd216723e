//! Errors - エラー型と分類
//!
//! I/O の失敗はすべて `QueueError` で表し、`ErrorKind` で
//! 「一時的なタイムアウト」か「致命的」かに分類します。
//! 分類はどのステージ（read / write / commit）で起きたかに依存しません。

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// ErrorKind は I/O エラーの運用分類
///
/// - Timeout: 期限切れ（ステージによって続行 or ベストエフォート）
/// - Fatal: 接続が壊れている前提（ループを止める）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    Fatal,
}

/// The bounded I/O call that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Read,
    Write,
    Commit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Read => "read",
            Stage::Write => "write",
            Stage::Commit => "commit",
        };
        f.write_str(s)
    }
}

/// Failure of a read, write or commit against a queue handle.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The call did not finish before its deadline.
    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },

    #[error("broker unreachable: {0}")]
    Unreachable(String),

    #[error("handle already closed")]
    Closed,

    #[error("unknown topic or partition: {topic}/{partition}")]
    UnknownPartition { topic: String, partition: u32 },

    #[error("record of {size} bytes exceeds max batch size of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    #[error("cannot commit {message}: reader is bound to {bound}")]
    ForeignCommit { message: String, bound: String },

    #[error("{0}")]
    Other(String),
}

impl QueueError {
    pub fn kind(&self) -> ErrorKind {
        classify(self)
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}

/// Classify an I/O failure as transient timeout or fatal.
pub fn classify(err: &QueueError) -> ErrorKind {
    match err {
        QueueError::Timeout { .. } => ErrorKind::Timeout,
        QueueError::Unreachable(_)
        | QueueError::Closed
        | QueueError::UnknownPartition { .. }
        | QueueError::MessageTooLarge { .. }
        | QueueError::ForeignCommit { .. }
        | QueueError::Other(_) => ErrorKind::Fatal,
    }
}

/// Failure to establish a reader or writer. Never retried here.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("broker unreachable: {0:?}")]
    Unreachable(Vec<String>),

    #[error("invalid connection config: {0}")]
    InvalidConfig(String),

    #[error("unknown topic or partition: {topic}/{partition}")]
    UnknownTopic { topic: String, partition: u32 },
}

/// Failure inside a message handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("json decode: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("validation: {0}")]
    Validation(String),

    #[error("json encode: {0}")]
    Encode(#[source] serde_json::Error),
}
