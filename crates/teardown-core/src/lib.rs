//! teardown-core
//!
//! Idempotent removal of preview environments: resolve the cluster project
//! for a branch or pull request, delete it, and mark the environment deleted
//! in the registry. Failures are retried with backoff or dead-lettered.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（task, identity, errors, outcome, decision, events）
//! - **ports**: 抽象化レイヤー（ClusterProjectApi, EnvironmentRegistry, EventSink, TaskConsumer, Clock）
//! - **app**: アプリケーションロジック（RemovalWorker, WorkerGroup）
//! - **impls**: 実装（HTTP クライアント、インメモリキュー、tracing sink）
//! - **config**: WorkerConfig とその検証

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

#[cfg(test)]
mod testing;
