//! MessageReader port - 入力キューの読み取りハンドル
//!
//! # 設計原則
//! - 1 つの poll loop が排他的に所有する（`&mut self`、ロック不要）
//! - 期限（deadline）は呼び出し側が `tokio::time::timeout` で与える
//! - クライアント側の期限切れは `QueueError::Timeout` で返してよい

use async_trait::async_trait;

use crate::domain::{QueueMessage, QueueError};

/// Read handle bound to one topic/partition/consumer group.
#[async_trait]
pub trait MessageReader: Send {
    /// Wait for the next record at the reader's position.
    async fn read_message(&mut self) -> Result<QueueMessage, QueueError>;

    /// Record `message.offset() + 1` as the group's committed position.
    async fn commit(&mut self, message: &QueueMessage) -> Result<(), QueueError>;

    /// Release the handle. Later calls fail with `QueueError::Closed`.
    async fn close(&mut self) -> Result<(), QueueError>;
}
