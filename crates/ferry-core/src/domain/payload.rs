//! Payload - キューメッセージ本文（JSON）のドメイン型
//!
//! # スキーマ
//! - `InfoMessage`: `{ "id", "message", "count" }`（リクエスト兼レスポンス A）
//! - `FirstMessageRequest`: `{ "id", "items": [[itemId, type, count], ...] }`
//! - `FirstMessageResponse`: `{ "id", "ok" }`（レスポンス B）

use serde::{Deserialize, Serialize};

/// Request and response A share this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoMessage {
    pub id: String,
    pub message: String,
    pub count: i32,
}

/// One `[itemId, type, count]` triple as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem(pub String, pub i64, pub i64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstMessageRequest {
    pub id: String,
    pub items: Vec<RawItem>,
}

/// A triple after validation, with named fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: i64,
    pub count: i64,
}

impl From<RawItem> for ParsedItem {
    fn from(RawItem(id, item_type, count): RawItem) -> Self {
        Self {
            id,
            item_type,
            count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstMessageResponse {
    pub id: String,
    pub ok: bool,
}
