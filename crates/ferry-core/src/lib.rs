//! ferry-core
//!
//! 入力キューからメッセージを取り出し、handler で変換し、出力キューへ転送して
//! offset を commit するパイプラインの構成要素。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（message, errors, outcome, payload, ids）
//! - **ports**: 抽象化レイヤー（MessageReader, MessageWriter, Broker, Balancer, Clock, IdGenerator）
//! - **typed**: 型付き Handler API（Payload trait, Handler trait, HandlerRegistry）
//! - **app**: アプリケーションロジック（builder, connection, poll_loop, signal）
//! - **impls**: 実装（InMemoryBroker, LeastBytes, サンプル Handler）
//! - **config**: キューの接続設定と poll loop のタイミング

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod typed;
