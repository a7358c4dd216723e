//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（メッセージブローカー、時計、ID 生成）への
//! インターフェースを提供し、実装の詳細を隠蔽します。

pub mod balancer;
pub mod broker;
pub mod clock;
pub mod id_generator;
pub mod reader;
pub mod writer;

pub use self::balancer::Balancer;
pub use self::broker::Broker;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::reader::MessageReader;
pub use self::writer::MessageWriter;
