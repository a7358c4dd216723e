//! Handler trait - メッセージを変換する Handler の定義
//!
//! # 二層構造
//! - **表層（Typed）**: `Handler<T>` - デコード済みの `T` を受け取る
//! - **内部（Bytes）**: `MessageHandler` - object-safe、poll loop が呼ぶ
//!
//! `JsonHandler<T, H>` が JSON のデコード・エンコードを担当し、
//! `Handler<T>` を `MessageHandler` に型消去します。

use std::marker::PhantomData;

use serde::Serialize;

use super::payload::Payload;
use crate::domain::HandlerError;

/// Handler は `T` を受け取ってレスポンスを返す
///
/// 入力に対して純粋関数であること（状態を持たない、入力を保持しない）。
pub trait Handler<T: Payload>: Send + Sync {
    type Response: Serialize;

    fn respond(&self, key: &[u8], request: T) -> Result<Self::Response, HandlerError>;
}

/// Byte-level handler invoked by the poll loop.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, key: &[u8], value: &[u8]) -> Result<Vec<u8>, HandlerError>;

    /// Schema name the handler is registered under.
    fn schema(&self) -> &str;
}

pub struct JsonHandler<T: Payload, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<T>,
}

impl<T: Payload, H: Handler<T>> JsonHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

impl<T: Payload, H: Handler<T>> MessageHandler for JsonHandler<T, H> {
    fn handle(&self, key: &[u8], value: &[u8]) -> Result<Vec<u8>, HandlerError> {
        let request: T = serde_json::from_slice(value).map_err(HandlerError::Decode)?;
        let response = self.handler.respond(key, request)?;
        serde_json::to_vec(&response).map_err(HandlerError::Encode)
    }

    fn schema(&self) -> &str {
        T::SCHEMA
    }
}
