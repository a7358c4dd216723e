//! FirstMessageHandler - `first_message.v1` リクエストに答える Handler（レスポンス B）

use tracing::debug;

use crate::domain::{FirstMessageRequest, FirstMessageResponse, HandlerError, ParsedItem};
use crate::typed::Handler;

/// Parses the item triples and acknowledges the request id.
pub struct FirstMessageHandler;

impl Handler<FirstMessageRequest> for FirstMessageHandler {
    type Response = FirstMessageResponse;

    fn respond(
        &self,
        _key: &[u8],
        request: FirstMessageRequest,
    ) -> Result<FirstMessageResponse, HandlerError> {
        if request.id.is_empty() {
            return Err(HandlerError::Validation("id must not be empty".to_string()));
        }
        let parsed_items: Vec<ParsedItem> =
            request.items.into_iter().map(ParsedItem::from).collect();
        if let Some(pos) = parsed_items.iter().position(|item| item.id.is_empty()) {
            return Err(HandlerError::Validation(format!(
                "item {pos} has an empty id"
            )));
        }
        debug!(id = %request.id, ?parsed_items, "parsed first message");

        Ok(FirstMessageResponse {
            id: request.id,
            ok: true,
        })
    }
}
