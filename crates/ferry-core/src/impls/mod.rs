//! Impls - ports の実装と組み込み Handler
//!
//! # 含まれる実装
//! - **InMemoryBroker**: 開発用・テスト用のブローカー（reader / writer）
//! - **LeastBytes**: 既定の Balancer
//! - **InfoHandler** / **FirstMessageHandler**: サンプル Handler

pub mod balancer;
pub mod first_message;
pub mod info;
pub mod inmem_broker;

pub use self::balancer::{LeastBytes, balancer_for};
pub use self::first_message::FirstMessageHandler;
pub use self::info::InfoHandler;
pub use self::inmem_broker::{InMemoryBroker, OpenHandles};
