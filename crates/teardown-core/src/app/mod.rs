//! App - アプリケーション層
//!
//! ports を組み合わせて削除タスクの処理を実装する。
//!
//! # 主要コンポーネント
//! - **RemovalWorker**: 1 タスク分の削除手順（resolve→exists→delete→mark_deleted）
//! - **WorkerGroup**: lease→handle→decide→ack/retry/dead_letter のループ群

pub mod removal;
pub mod worker_loop;

pub use self::removal::{DeleteConfirmation, RemovalWorker};
pub use self::worker_loop::{ShutdownHandle, WorkerGroup, process_lease};
