//! Message - キューを流れるレコード
//!
//! 入力キューから読んだ `QueueMessage` と、出力キューへ書く
//! `OutgoingMessage` の 2 種類を定義します。

use std::fmt;

/// A single header entry attached to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub key: String,
    pub value: Vec<u8>,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A record read from the input queue.
///
/// Immutable once read: the poll loop only borrows `key`/`value` for the
/// handler and hands the whole message back to the reader for `commit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    topic: String,
    partition: u32,
    offset: u64,
    key: Vec<u8>,
    value: Vec<u8>,
    headers: Vec<Header>,
}

impl QueueMessage {
    pub fn new(
        topic: impl Into<String>,
        partition: u32,
        offset: u64,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        headers: Vec<Header>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: key.into(),
            value: value.into(),
            headers,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> u32 {
        self.partition
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Look up the first header with the given key.
    pub fn header(&self, key: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|h| h.key == key)
            .map(|h| h.value.as_slice())
    }

    /// Size counted against a reader's batch limit.
    pub fn size_bytes(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

impl fmt::Display for QueueMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.topic, self.partition, self.offset)
    }
}

/// A record handed to the writer.
///
/// The poll loop builds this from the handler's response, reusing the input
/// key so the answer can be correlated downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub headers: Vec<Header>,
}

impl OutgoingMessage {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    pub fn size_bytes(&self) -> usize {
        self.key.len() + self.value.len()
    }
}
