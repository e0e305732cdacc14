//! Ports - 抽象化レイヤー
//!
//! 外部システム（クラスタ API、registry、イベント送出、キュー）への
//! インターフェース。RemovalWorker はこれらを注入で受け取るので、
//! テストでは差し替えられる。

pub mod clock;
pub mod cluster;
pub mod consumer;
pub mod event_sink;
pub mod registry;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::cluster::{ClusterError, ClusterProjectApi};
pub use self::consumer::{QueueError, TaskConsumer, TaskLease};
pub use self::event_sink::{EventSink, EventSinkError};
pub use self::registry::{EnvironmentRegistry, RegistryError};
