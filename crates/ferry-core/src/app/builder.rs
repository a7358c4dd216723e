//! PipelineBuilder - パイプラインの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: 設定で選んだ handler が未登録なら build() で失敗
//! - Handler は構築時に 1 つだけ選ぶ（strategy パターン）

use std::sync::Arc;

use tracing::info;

use super::connection::Connection;
use super::poll_loop::{PollLoop, PollLoopHandle};
use crate::config::PipelineConfig;
use crate::domain::{ConnectError, FirstMessageRequest, InfoMessage};
use crate::impls::{FirstMessageHandler, InfoHandler};
use crate::ports::{Broker, SystemClock, UlidGenerator};
use crate::typed::{Handler, HandlerRegistry, MessageHandler, Payload, RegistryError};

/// # 使用例
/// ```ignore
/// let pipeline = PipelineBuilder::new(config)
///     .with_builtin_handlers()?
///     .build()?;
/// let handle = pipeline.start(&broker).await?;
/// let reason = handle.wait().await?;
/// ```
pub struct PipelineBuilder {
    config: PipelineConfig,
    registry: HandlerRegistry,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Handler '{requested}' is not registered. Registered schemas: {available:?}")]
    UnknownHandler {
        requested: String,
        available: Vec<String>,
    },
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            registry: HandlerRegistry::new(),
        }
    }

    /// Register `info.v1` and `first_message.v1`.
    pub fn with_builtin_handlers(self) -> Result<Self, RegistryError> {
        let ids = Arc::new(UlidGenerator::new(SystemClock));
        self.register::<InfoMessage, _>(InfoHandler::new(ids))?
            .register::<FirstMessageRequest, _>(FirstMessageHandler)
    }

    pub fn register<T: Payload, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    /// Register a byte-level handler under its own schema name.
    pub fn register_handler(
        mut self,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Self, RegistryError> {
        self.registry.insert(handler)?;
        Ok(self)
    }

    /// Select the configured handler.
    pub fn build(self) -> Result<Pipeline, BuildError> {
        let handler = self.registry.get(&self.config.handler).ok_or_else(|| {
            BuildError::UnknownHandler {
                requested: self.config.handler.clone(),
                available: self.registry.registered_schemas(),
            }
        })?;
        Ok(Pipeline {
            config: self.config,
            handler,
        })
    }
}

/// A configured pipeline with its handler chosen, not yet connected.
pub struct Pipeline {
    config: PipelineConfig,
    handler: Arc<dyn MessageHandler>,
}

impl Pipeline {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn handler(&self) -> &Arc<dyn MessageHandler> {
        &self.handler
    }

    /// Open the connection and wrap it in a poll loop.
    pub async fn connect(&self, broker: &dyn Broker) -> Result<PollLoop, ConnectError> {
        let connection = Connection::open(broker, &self.config.reader, &self.config.writer).await?;
        Ok(PollLoop::new(
            connection,
            Arc::clone(&self.handler),
            self.config.poll.clone(),
        ))
    }

    /// Connect and run the loop on its own task.
    pub async fn start(&self, broker: &dyn Broker) -> Result<PollLoopHandle, ConnectError> {
        let poll_loop = self.connect(broker).await?;
        info!(
            input = %self.config.reader.topic,
            output = %self.config.writer.topic,
            handler = %self.handler.schema(),
            "pipeline started"
        );
        Ok(poll_loop.spawn())
    }
}
