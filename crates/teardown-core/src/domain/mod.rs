//! Domain model (tasks, identities, errors, outcomes, events, decisions).
//!
//! このモジュールは I/O を持たない。外部システムとのやりとりは ports 経由。

pub mod decision;
pub mod errors;
pub mod events;
pub mod identity;
pub mod ids;
pub mod outcome;
pub mod task;

pub use decision::{Decider, Decision, DefaultDecider, RetryPolicy};
pub use errors::{ErrorKind, RemovalError};
pub use events::{EventLevel, RemovalEvent};
pub use identity::{ResourceIdentity, resolve, resolve_task, sanitize};
pub use ids::TaskId;
pub use outcome::{Outcome, OutcomeKind};
pub use task::{EnvironmentKind, REMOVE_TASK_TYPE, RemovalTask, TaskEnvelope, TaskType};
