//! Domain model (messages, errors, outcomes, payloads, ids).

pub mod errors;
pub mod ids;
pub mod message;
pub mod outcome;
pub mod payload;

pub use self::errors::{ConnectError, ErrorKind, HandlerError, QueueError, Stage, classify};
pub use self::ids::{Id, IdMarker, ReplyId};
pub use self::message::{Header, OutgoingMessage, QueueMessage};
pub use self::outcome::{LoopOutcome, LoopState, StopReason};
pub use self::payload::{
    FirstMessageRequest, FirstMessageResponse, InfoMessage, ParsedItem, RawItem,
};
