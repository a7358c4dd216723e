//! HandlerRegistry - Handler の登録と選択
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - Generic methods での登録と型安全性
//! - Arc による共有所有権

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{Handler, JsonHandler, MessageHandler};
use super::payload::Payload;

/// HandlerRegistry はスキーマ名 → Handler の対応を管理
///
/// # 使用例
/// ```ignore
/// let mut registry = HandlerRegistry::new();
/// registry.register::<InfoMessage, _>(InfoHandler::new(id_gen))?;
/// let handler = registry.get("info.v1");
/// ```
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Handler for schema '{0}' is already registered")]
    AlreadyRegistered(String),
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a typed handler, wrapped in a `JsonHandler`.
    pub fn register<T: Payload, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        self.insert(Arc::new(JsonHandler::<T, H>::new(handler)))
    }

    /// Register a byte-level handler under its own schema name.
    pub fn insert(&mut self, handler: Arc<dyn MessageHandler>) -> Result<(), RegistryError> {
        let schema = handler.schema().to_string();
        if self.handlers.contains_key(&schema) {
            return Err(RegistryError::AlreadyRegistered(schema));
        }
        self.handlers.insert(schema, handler);
        Ok(())
    }

    pub fn get(&self, schema: &str) -> Option<Arc<dyn MessageHandler>> {
        self.handlers.get(schema).cloned()
    }

    pub fn registered_schemas(&self) -> Vec<String> {
        let mut schemas: Vec<String> = self.handlers.keys().cloned().collect();
        schemas.sort();
        schemas
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
