//! App - アプリケーション層
//!
//! ports を組み合わせてパイプラインを実装します。
//!
//! # 主要コンポーネント
//! - **PipelineBuilder**: 構築とワイヤリング（handler の選択）
//! - **Connection**: reader / writer の確立と解放
//! - **PollLoop**: read → handle → forward → commit の繰り返し
//! - **TerminationSignal**: 停止を呼び出し側へ 1 回だけ通知

pub mod builder;
pub mod connection;
pub mod poll_loop;
pub mod signal;

pub use self::builder::{BuildError, Pipeline, PipelineBuilder};
pub use self::connection::Connection;
pub use self::poll_loop::{LoopStats, PollLoop, PollLoopHandle, StatsSnapshot};
pub use self::signal::{
    SignalError, TerminationNotifier, TerminationWaiter, termination_signal,
};
