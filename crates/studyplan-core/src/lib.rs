//! # Studyplan Core Library
//!
//! Core logic for turning coursework into a day-by-day study plan. Tasks with
//! due dates, fixed commitments and a personal energy curve go in; a set of
//! study blocks comes out, recomputed whenever the inputs change.
//!
//! ## Architecture
//!
//! - **Timeline**: task ranking and free-time detection
//! - **Scheduler**: slot scoring, block allocation and exam reviews, driven by
//!   the pure [`compute_schedule`] function
//! - **Rescheduler**: debounced recompute on store changes, synchronous or as
//!   a tokio worker
//! - **Storage**: TOML configuration and the repository boundary to the task
//!   store
//!
//! ## Key Components
//!
//! - [`compute_schedule`]: one full scheduling pass
//! - [`Rescheduler`]: hook-driven recompute state machine
//! - [`SchedulerConfig`]: tunable scheduling parameters
//! - [`EnergyProfile`]: hour-of-day productivity curve

pub mod energy;
pub mod error;
pub mod rescheduler;
pub mod schedule;
pub mod scheduler;
pub mod storage;
pub mod task;
pub mod timeline;

pub use energy::{EnergyProfile, SessionFeedback};
pub use error::{ConfigError, CoreError, ValidationError};
pub use rescheduler::{
    spawn_worker, spawn_worker_with_clock, RescheduleHandle, RescheduleState, Rescheduler,
    ScheduleUpdate, Trigger,
};
pub use schedule::{BlockOrigin, FixedEvent, FixedEventKind, StudyBlock};
pub use scheduler::{
    compute_schedule, ScheduleOutcome, ScheduleStatus, ScoringWeights, SkipReason, SkippedTask,
    TaskReport,
};
pub use storage::{
    MemoryRepository, ScheduleRepository, ScheduleSnapshot, SchedulerConfig, SpreadStrategy,
    Workload, WorkloadChange, WorkloadFile,
};
pub use task::{DayPeriod, EnergyLevel, Task, TaskPatch, TaskStatus, TaskType};
pub use timeline::{prioritize, AvailabilityResolver, PriorityWeights, TimeGap};
