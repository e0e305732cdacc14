//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **HttpClusterApi**: クラスタの project API クライアント
//! - **GraphqlRegistry**: registry の GraphQL クライアント
//! - **TracingEventSink**: tracing へのイベント出力
//! - **InMemoryTaskQueue**: 遅延再配送つきのインメモリキュー

pub mod graphql_registry;
pub mod http_cluster;
pub mod inmem_queue;
pub mod log_sink;

pub use self::graphql_registry::GraphqlRegistry;
pub use self::http_cluster::HttpClusterApi;
pub use self::inmem_queue::{DeadLetter, DeliveryState, InMemoryTaskQueue, QueueCounts};
pub use self::log_sink::TracingEventSink;
