//! Connection - reader / writer ハンドルの確立と解放
//!
//! # 学習ポイント
//! - connect は 1 回だけ（起動時の依存関係、リトライしない）
//! - close も 1 回だけ（正常終了・致命的エラーのどちらの経路でも呼ぶ）
//! - ハンドルは poll loop が排他的に所有する

use tracing::{info, warn};

use crate::config::{ReaderConfig, WriterConfig};
use crate::domain::ConnectError;
use crate::ports::{Broker, MessageReader, MessageWriter};

/// The reader/writer pair owned by one poll loop.
pub struct Connection {
    reader: Box<dyn MessageReader>,
    writer: Box<dyn MessageWriter>,
    closed: bool,
}

impl Connection {
    pub fn new(reader: Box<dyn MessageReader>, writer: Box<dyn MessageWriter>) -> Self {
        Self {
            reader,
            writer,
            closed: false,
        }
    }

    /// Connect the reader, then the writer.
    ///
    /// If the writer cannot be connected the reader is closed before the
    /// error is returned.
    pub async fn open(
        broker: &dyn Broker,
        reader_config: &ReaderConfig,
        writer_config: &WriterConfig,
    ) -> Result<Self, ConnectError> {
        let mut reader = broker.connect_reader(reader_config).await?;
        let writer = match broker.connect_writer(writer_config).await {
            Ok(writer) => writer,
            Err(err) => {
                if let Err(close_err) = reader.close().await {
                    warn!(error = %close_err, "closing reader after failed writer connect");
                }
                return Err(err);
            }
        };
        Ok(Self::new(reader, writer))
    }

    pub fn reader_mut(&mut self) -> &mut dyn MessageReader {
        self.reader.as_mut()
    }

    pub fn writer_mut(&mut self) -> &mut dyn MessageWriter {
        self.writer.as_mut()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close both handles. Only the first call has an effect.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.reader.close().await {
            warn!(error = %err, "reader close failed");
        }
        if let Err(err) = self.writer.close().await {
            warn!(error = %err, "writer close failed");
        }
        info!("connection closed");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if !self.closed {
            // handle 側の Drop に解放を任せる（panic 経路など）
            warn!("connection dropped without close");
        }
    }
}
