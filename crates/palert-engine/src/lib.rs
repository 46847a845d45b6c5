//! Rule scheduling and evaluation engine.
//!
//! A single scheduler loop polls the schedule store on a fixed tick and
//! hands one evaluation task per due rule to a bounded worker pool; each
//! task runs the full rule pipeline (load, filter, fan out to the source
//! adapters, deduplicate, notify, persist bookkeeping) and reschedules the
//! rule for `now + check_interval` regardless of outcome, so a transient
//! failure can never leave a rule permanently stuck.

pub mod pool;
pub mod processor;
pub mod scheduler;

pub use pool::{Task, WorkerPool};
pub use processor::{ProcessError, RuleProcessor};
pub use scheduler::{Scheduler, SchedulerError};

pub const CRATE_NAME: &str = "palert-engine";
