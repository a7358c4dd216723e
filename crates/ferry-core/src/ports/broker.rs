//! Broker port - 接続の確立（Connection Manager の下位層）
//!
//! connect は起動時の依存関係であり、ここではリトライしません。
//! リトライが必要なら poll loop を起動する前に呼び出し側で行います。

use async_trait::async_trait;

use crate::config::{ReaderConfig, WriterConfig};
use crate::domain::ConnectError;
use crate::ports::{MessageReader, MessageWriter};

#[async_trait]
pub trait Broker: Send + Sync {
    /// Open a durable read handle for `config.topic`/`config.partition`
    /// under `config.consumer_group`.
    async fn connect_reader(
        &self,
        config: &ReaderConfig,
    ) -> Result<Box<dyn MessageReader>, ConnectError>;

    /// Open a durable write handle for `config.topic`.
    async fn connect_writer(
        &self,
        config: &WriterConfig,
    ) -> Result<Box<dyn MessageWriter>, ConnectError>;
}
