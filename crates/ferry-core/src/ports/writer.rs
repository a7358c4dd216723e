//! MessageWriter port - 出力キューへの書き込みハンドル

use async_trait::async_trait;

use crate::domain::{OutgoingMessage, QueueError};

/// Write handle bound to one topic; the partition is chosen by its balancer.
#[async_trait]
pub trait MessageWriter: Send {
    async fn write_message(&mut self, message: OutgoingMessage) -> Result<(), QueueError>;

    /// Release the handle. Later calls fail with `QueueError::Closed`.
    async fn close(&mut self) -> Result<(), QueueError>;
}
