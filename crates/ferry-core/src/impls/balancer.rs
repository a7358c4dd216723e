//! LeastBytes - 書き込みバイト数が最小のパーティションを選ぶ Balancer
//!
//! このライターが各パーティションに書いたバイト数を数え、
//! 一番少ないパーティションを選びます。同数なら一覧の先頭を選びます。

use std::collections::HashMap;

use crate::config::BalancerKind;
use crate::domain::OutgoingMessage;
use crate::ports::Balancer;

/// Instantiate the configured balancing policy for one writer.
pub fn balancer_for(kind: BalancerKind) -> Box<dyn Balancer> {
    match kind {
        BalancerKind::LeastBytes => Box::new(LeastBytes::new()),
    }
}

#[derive(Debug, Default)]
pub struct LeastBytes {
    written: HashMap<u32, u64>,
}

impl LeastBytes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self, partition: u32) -> u64 {
        self.written.get(&partition).copied().unwrap_or(0)
    }
}

impl Balancer for LeastBytes {
    fn balance(&mut self, message: &OutgoingMessage, partitions: &[u32]) -> u32 {
        let chosen = partitions
            .iter()
            .copied()
            .min_by_key(|p| self.written(*p))
            .unwrap_or(0);
        *self.written.entry(chosen).or_default() += message.size_bytes() as u64;
        chosen
    }
}
