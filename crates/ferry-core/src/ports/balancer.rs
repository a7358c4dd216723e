//! Balancer port - 書き込み先パーティションの選択
//!
//! # 実装
//! - **LeastBytes**: 書き込みバイト数が最も少ないパーティションを選ぶ

use crate::domain::OutgoingMessage;

/// Chooses the partition for each outgoing record.
///
/// `partitions` is never empty. Implementations may track state across calls
/// (e.g. bytes written so far), which is why `balance` takes `&mut self`.
pub trait Balancer: Send {
    fn balance(&mut self, message: &OutgoingMessage, partitions: &[u32]) -> u32;
}
