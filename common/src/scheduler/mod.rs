// Scheduler: live schedule, reconciliation and the tick loop

pub mod clock;
pub mod engine;
pub mod inflight;
pub mod reconciler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{EngineConfig, Scheduler, SchedulerEngine};
pub use inflight::{InFlightGuard, InFlightTracker};
pub use reconciler::{DueTasks, LiveSchedule, ReconcileReport, ScheduleEntry};
