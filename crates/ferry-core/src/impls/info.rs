//! InfoHandler - `info.v1` リクエストに答える Handler（レスポンス A）
//!
//! `id` は毎回新しく生成するため、同じ入力でも出力は一致しません。

use std::sync::Arc;

use tracing::debug;

use crate::domain::{HandlerError, InfoMessage};
use crate::ports::IdGenerator;
use crate::typed::Handler;

pub struct InfoHandler {
    ids: Arc<dyn IdGenerator>,
}

impl InfoHandler {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self { ids }
    }
}

impl Handler<InfoMessage> for InfoHandler {
    type Response = InfoMessage;

    fn respond(&self, key: &[u8], request: InfoMessage) -> Result<InfoMessage, HandlerError> {
        if request.id.is_empty() {
            return Err(HandlerError::Validation("id must not be empty".to_string()));
        }
        let key = String::from_utf8_lossy(key);
        debug!(kafka_id = %key, message_id = %request.id, count = request.count, "answering info message");

        Ok(InfoMessage {
            id: self.ids.generate_reply_id().to_string(),
            message: format!(
                "Answer to kafka_id: {key}, message_id: {}. Count was: {}",
                request.id, request.count
            ),
            count: request.count,
        })
    }
}
