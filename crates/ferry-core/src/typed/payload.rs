//! Payload trait - スキーマ名と型の対応付け
//!
//! # 学習ポイント
//! - Associated Constants (`const SCHEMA`)
//! - Trait bounds の組み合わせ (Serialize + DeserializeOwned + Send + Sync + 'static)

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{FirstMessageRequest, InfoMessage};

/// Payload はメッセージ本文の型とスキーマ名を対応付ける
///
/// # 命名規約
/// - `{name}.v{major}`
/// - 例: `info.v1`
pub trait Payload: Serialize + DeserializeOwned + Send + Sync + 'static {
    const SCHEMA: &'static str;
}

impl Payload for InfoMessage {
    const SCHEMA: &'static str = "info.v1";
}

impl Payload for FirstMessageRequest {
    const SCHEMA: &'static str = "first_message.v1";
}
