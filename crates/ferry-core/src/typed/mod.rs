//! Typed - 型付き Handler API
//!
//! スキーマ名の typo を型で排除し、Handler との対応付けを静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `Payload` trait, `Handler<T>` trait - 型安全
//! - **内部（Bytes）**: `MessageHandler` trait - object-safe, type erasure

pub mod handler;
pub mod payload;
pub mod registry;

pub use self::handler::{Handler, JsonHandler, MessageHandler};
pub use self::payload::Payload;
pub use self::registry::{HandlerRegistry, RegistryError};
