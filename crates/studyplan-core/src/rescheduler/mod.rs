//! Dynamic rescheduling.
//!
//! Store mutations and profile updates are recorded as triggers. Once the
//! debounce window has passed without a new trigger, one scheduling pass
//! runs over a fresh snapshot and the full replacement block set is
//! published in a single step.
//!
//! States: `Idle` → `Pending` (triggers waiting out the debounce window) →
//! `Recomputing` → `Idle`. A pass that finishes after newer triggers arrived
//! is stale and is discarded instead of published.

mod worker;

pub use worker::{spawn_worker, spawn_worker_with_clock, RescheduleHandle};

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::energy::EnergyProfile;
use crate::error::Result;
use crate::schedule::FixedEvent;
use crate::scheduler::{compute_schedule, ScheduleOutcome};
use crate::storage::{ScheduleRepository, ScheduleSnapshot, SchedulerConfig, WorkloadChange};
use crate::task::{Task, TaskPatch};

/// What caused a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    TaskCompleted(String),
    TaskAdded(String),
    TaskChanged(String),
    TaskRemoved(String),
    EventAdded(String),
    EventRemoved(String),
    EnergyUpdated,
    /// Explicit request with no store change
    Requested,
}

impl From<&WorkloadChange> for Trigger {
    fn from(change: &WorkloadChange) -> Self {
        match change {
            WorkloadChange::CompleteTask(id) => Trigger::TaskCompleted(id.clone()),
            WorkloadChange::AddTask(task) => Trigger::TaskAdded(task.id.clone()),
            WorkloadChange::UpdateTask(id, _) => Trigger::TaskChanged(id.clone()),
            WorkloadChange::RemoveTask(id) => Trigger::TaskRemoved(id.clone()),
            WorkloadChange::AddEvent(event) => Trigger::EventAdded(event.id.clone()),
            WorkloadChange::RemoveEvent(id) => Trigger::EventRemoved(id.clone()),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::TaskCompleted(id) => write!(f, "task completed: {id}"),
            Trigger::TaskAdded(id) => write!(f, "task added: {id}"),
            Trigger::TaskChanged(id) => write!(f, "task changed: {id}"),
            Trigger::TaskRemoved(id) => write!(f, "task removed: {id}"),
            Trigger::EventAdded(id) => write!(f, "event added: {id}"),
            Trigger::EventRemoved(id) => write!(f, "event removed: {id}"),
            Trigger::EnergyUpdated => f.write_str("energy profile updated"),
            Trigger::Requested => f.write_str("recompute requested"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescheduleState {
    Idle,
    Pending,
    Recomputing,
}

/// A published schedule.
#[derive(Debug, Clone)]
pub struct ScheduleUpdate {
    /// Increases by one per publication
    pub generation: u64,
    pub computed_at: DateTime<Utc>,
    pub triggers: Vec<Trigger>,
    pub outcome: Arc<ScheduleOutcome>,
}

/// Everything one pass reads, detached from the rescheduler so it can run
/// elsewhere.
#[derive(Debug, Clone)]
pub struct PassInput {
    pub snapshot: ScheduleSnapshot,
    pub config: SchedulerConfig,
    pub energy: EnergyProfile,
    pub now: DateTime<Utc>,
    pub triggers: Vec<Trigger>,
    /// Trigger count at the start of the pass
    epoch: u64,
}

impl PassInput {
    pub fn run(&self) -> Result<ScheduleOutcome> {
        compute_schedule(
            &self.snapshot.tasks,
            &self.snapshot.events,
            &self.snapshot.manual_blocks,
            &self.energy,
            &self.config,
            self.now,
        )
    }
}

/// Debounced recompute driver over a [`ScheduleRepository`].
pub struct Rescheduler<R> {
    repo: R,
    config: SchedulerConfig,
    energy: EnergyProfile,
    state: RescheduleState,
    pending: Vec<Trigger>,
    debounce_until: Option<DateTime<Utc>>,
    /// Triggers recorded so far; used to spot stale passes
    epoch: u64,
    generation: u64,
    current: Arc<ScheduleOutcome>,
}

impl<R: ScheduleRepository> Rescheduler<R> {
    pub fn new(repo: R, config: SchedulerConfig, energy: EnergyProfile) -> Self {
        Self {
            repo,
            config,
            energy,
            state: RescheduleState::Idle,
            pending: Vec::new(),
            debounce_until: None,
            epoch: 0,
            generation: 0,
            current: Arc::new(ScheduleOutcome::default()),
        }
    }

    pub fn state(&self) -> RescheduleState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Last published outcome.
    pub fn current(&self) -> Arc<ScheduleOutcome> {
        Arc::clone(&self.current)
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn into_repository(self) -> R {
        self.repo
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn energy(&self) -> &EnergyProfile {
        &self.energy
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn debounce_until(&self) -> Option<DateTime<Utc>> {
        self.debounce_until
    }

    pub fn on_task_completed(&mut self, task_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.on_change(WorkloadChange::CompleteTask(task_id.to_string()), now)
    }

    pub fn on_task_added(&mut self, task: Task, now: DateTime<Utc>) -> Result<()> {
        self.on_change(WorkloadChange::AddTask(task), now)
    }

    pub fn on_task_changed(
        &mut self,
        task_id: &str,
        patch: TaskPatch,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.on_change(WorkloadChange::UpdateTask(task_id.to_string(), patch), now)
    }

    pub fn on_task_removed(&mut self, task_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.on_change(WorkloadChange::RemoveTask(task_id.to_string()), now)
    }

    pub fn on_event_added(&mut self, event: FixedEvent, now: DateTime<Utc>) -> Result<()> {
        self.on_change(WorkloadChange::AddEvent(event), now)
    }

    pub fn on_event_removed(&mut self, event_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.on_change(WorkloadChange::RemoveEvent(event_id.to_string()), now)
    }

    pub fn on_energy_updated(&mut self, energy: EnergyProfile, now: DateTime<Utc>) -> Result<()> {
        energy.validate()?;
        self.energy = energy;
        self.record(Trigger::EnergyUpdated, now);
        Ok(())
    }

    /// Apply `change` to the repository and schedule a pass.
    ///
    /// A change that leaves the store as it was schedules nothing.
    pub fn on_change(&mut self, change: WorkloadChange, now: DateTime<Utc>) -> Result<()> {
        if self.repo.apply_change(&change)? {
            self.record(Trigger::from(&change), now);
        }
        Ok(())
    }

    /// Schedule a pass without a store change.
    pub fn request(&mut self, now: DateTime<Utc>) {
        self.record(Trigger::Requested, now);
    }

    fn record(&mut self, trigger: Trigger, now: DateTime<Utc>) {
        debug!(%trigger, "reschedule triggered");
        self.pending.push(trigger);
        self.epoch += 1;
        self.debounce_until = Some(now + self.debounce_window());
        if self.state == RescheduleState::Idle {
            self.state = RescheduleState::Pending;
        }
    }

    /// Run a pass if the debounce window has elapsed.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Result<Option<ScheduleUpdate>> {
        match self.debounce_until {
            Some(until) if now >= until && self.has_pending() => self.run_pass(now),
            _ => Ok(None),
        }
    }

    /// Run a pass now if any trigger is waiting.
    pub fn flush(&mut self, now: DateTime<Utc>) -> Result<Option<ScheduleUpdate>> {
        if self.has_pending() {
            self.run_pass(now)
        } else {
            Ok(None)
        }
    }

    /// Run a pass now, triggers or not.
    pub fn recompute(&mut self, now: DateTime<Utc>) -> Result<Option<ScheduleUpdate>> {
        if !self.has_pending() {
            self.request(now);
        }
        self.run_pass(now)
    }

    fn run_pass(&mut self, now: DateTime<Utc>) -> Result<Option<ScheduleUpdate>> {
        let input = self.begin_pass(now)?;
        let result = input.run();
        self.complete_pass(input, result)
    }

    /// Take a snapshot and move to `Recomputing`.
    ///
    /// The returned input can be run on another thread; hand the result
    /// back through [`complete_pass`](Self::complete_pass).
    pub fn begin_pass(&mut self, now: DateTime<Utc>) -> Result<PassInput> {
        let snapshot = self.repo.load_snapshot()?;
        self.state = RescheduleState::Recomputing;
        self.debounce_until = None;
        Ok(PassInput {
            snapshot,
            config: self.config.clone(),
            energy: self.energy.clone(),
            now,
            triggers: std::mem::take(&mut self.pending),
            epoch: self.epoch,
        })
    }

    /// Publish the result of a pass, or discard it if newer triggers arrived
    /// while it ran.
    pub fn complete_pass(
        &mut self,
        input: PassInput,
        result: Result<ScheduleOutcome>,
    ) -> Result<Option<ScheduleUpdate>> {
        if input.epoch != self.epoch {
            debug!(
                superseded_by = self.epoch - input.epoch,
                "discarding stale schedule"
            );
            self.requeue(input.triggers);
            return Ok(None);
        }

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "scheduling pass failed, will retry");
                self.requeue(input.triggers);
                self.debounce_until = Some(input.now + self.debounce_window());
                return Err(e);
            }
        };
        if let Err(e) = self.repo.replace_blocks(&outcome) {
            warn!(error = %e, "failed to store schedule, will retry");
            self.requeue(input.triggers);
            self.debounce_until = Some(input.now + self.debounce_window());
            return Err(e);
        }

        self.generation += 1;
        self.current = Arc::new(outcome);
        self.state = RescheduleState::Idle;
        info!(
            generation = self.generation,
            triggers = input.triggers.len(),
            blocks = self.current.blocks.len(),
            "schedule published"
        );
        Ok(Some(ScheduleUpdate {
            generation: self.generation,
            computed_at: input.now,
            triggers: input.triggers,
            outcome: Arc::clone(&self.current),
        }))
    }

    /// Put the triggers of an unpublished pass back in front of newer ones.
    fn requeue(&mut self, mut triggers: Vec<Trigger>) {
        triggers.append(&mut self.pending);
        self.pending = triggers;
        self.state = RescheduleState::Pending;
    }

    fn debounce_window(&self) -> Duration {
        Duration::milliseconds(i64::try_from(self.config.debounce_ms).unwrap_or(i64::MAX))
    }

    /// Drop an in-flight pass that never produced a result.
    pub fn abort_pass(&mut self) {
        self.state = if self.has_pending() {
            RescheduleState::Pending
        } else {
            RescheduleState::Idle
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryRepository, Workload};
    use crate::task::TaskType;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap()
    }

    /// Memory store whose first `failures` publishes fail.
    pub(crate) struct FlakyRepository {
        pub inner: MemoryRepository,
        pub failures: u32,
    }

    impl ScheduleRepository for FlakyRepository {
        fn load_snapshot(&self) -> Result<ScheduleSnapshot> {
            self.inner.load_snapshot()
        }

        fn apply_change(&mut self, change: &WorkloadChange) -> Result<bool> {
            self.inner.apply_change(change)
        }

        fn replace_blocks(&mut self, outcome: &ScheduleOutcome) -> Result<()> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into());
            }
            self.inner.replace_blocks(outcome)
        }
    }

    pub(crate) fn flaky(failures: u32) -> Rescheduler<FlakyRepository> {
        let r = rescheduler();
        Rescheduler::new(
            FlakyRepository {
                inner: r.repo,
                failures,
            },
            r.config,
            r.energy,
        )
    }

    fn rescheduler() -> Rescheduler<MemoryRepository> {
        let workload = Workload {
            tasks: vec![
                Task::new("a", "Reading", TaskType::Reading, now() + Duration::days(3)),
                Task::new("b", "Lab report", TaskType::Lab, now() + Duration::days(4)),
            ],
            ..Default::default()
        };
        let config = SchedulerConfig {
            seed: Some(5),
            ..Default::default()
        };
        Rescheduler::new(
            MemoryRepository::new(workload),
            config,
            EnergyProfile::default(),
        )
    }

    #[test]
    fn triggers_inside_debounce_window_coalesce() {
        let mut r = rescheduler();
        r.on_task_changed(
            "a",
            TaskPatch {
                estimated_hours: Some(2.0),
                ..Default::default()
            },
            now(),
        )
        .unwrap();
        r.on_task_completed("b", now() + Duration::milliseconds(200))
            .unwrap();
        assert_eq!(r.state(), RescheduleState::Pending);

        // Second trigger pushed the deadline out
        assert!(r.poll(now() + Duration::milliseconds(600)).unwrap().is_none());

        let update = r
            .poll(now() + Duration::milliseconds(700))
            .unwrap()
            .unwrap();
        assert_eq!(update.generation, 1);
        assert_eq!(update.triggers.len(), 2);
        assert_eq!(r.state(), RescheduleState::Idle);
        assert_eq!(r.repository().publish_count, 1);
        assert!(update.outcome.blocks.iter().all(|b| b.task_id == "a"));
    }

    #[test]
    fn unknown_task_is_an_error_and_schedules_nothing() {
        let mut r = rescheduler();
        assert!(r.on_task_completed("missing", now()).is_err());
        assert!(!r.has_pending());
        assert!(r.flush(now()).unwrap().is_none());
    }

    #[test]
    fn no_op_change_schedules_nothing() {
        let mut r = rescheduler();
        r.on_task_changed("a", TaskPatch::default(), now()).unwrap();
        assert_eq!(r.state(), RescheduleState::Idle);
    }

    #[test]
    fn stale_pass_is_discarded() {
        let mut r = rescheduler();
        r.request(now());
        let input = r.begin_pass(now()).unwrap();
        assert_eq!(r.state(), RescheduleState::Recomputing);

        r.on_task_completed("a", now()).unwrap();
        let result = input.run();
        assert!(r.complete_pass(input, result).unwrap().is_none());
        assert_eq!(r.generation(), 0);
        assert_eq!(r.state(), RescheduleState::Pending);

        let update = r.flush(now()).unwrap().unwrap();
        assert_eq!(update.generation, 1);
        assert_eq!(
            update.triggers,
            vec![Trigger::Requested, Trigger::TaskCompleted("a".into())]
        );
        assert!(update.outcome.blocks.iter().all(|b| b.task_id == "b"));
    }

    #[test]
    fn energy_update_validates_profile() {
        let mut r = rescheduler();
        let mut bad = EnergyProfile::default();
        bad.hourly[3] = 2.0;
        assert!(r.on_energy_updated(bad, now()).is_err());
        r.on_energy_updated(EnergyProfile::flat(0.5), now()).unwrap();
        assert!(r.has_pending());
    }

    #[test]
    fn recompute_is_idempotent_without_changes() {
        let mut r = rescheduler();
        let first = r.recompute(now()).unwrap().unwrap();
        let second = r.recompute(now()).unwrap().unwrap();
        assert_eq!(first.outcome.blocks, second.outcome.blocks);
        assert_eq!(second.generation, 2);
    }

    #[test]
    fn failed_publish_keeps_triggers_for_retry() {
        let mut r = flaky(1);
        r.on_task_completed("b", now()).unwrap();

        assert!(r.flush(now()).is_err());
        assert_eq!(r.state(), RescheduleState::Pending);
        assert!(r.has_pending());
        assert_eq!(r.generation(), 0);
        assert_eq!(
            r.debounce_until(),
            Some(now() + Duration::milliseconds(500))
        );

        assert!(r.poll(now() + Duration::milliseconds(100)).unwrap().is_none());
        let update = r
            .poll(now() + Duration::milliseconds(500))
            .unwrap()
            .unwrap();
        assert_eq!(update.generation, 1);
        assert_eq!(update.triggers, vec![Trigger::TaskCompleted("b".into())]);
        assert_eq!(r.state(), RescheduleState::Idle);

        let repo = r.into_repository();
        assert_eq!(repo.inner.publish_count, 1);
        assert_eq!(repo.inner.workload.blocks, update.outcome.blocks);
        assert!(!repo.inner.workload.blocks.is_empty());
    }

    #[test]
    fn failed_pass_keeps_triggers_for_retry() {
        let mut r = rescheduler();
        r.config.study_start = "bogus".into();
        r.request(now());

        assert!(r.flush(now()).is_err());
        assert_eq!(r.state(), RescheduleState::Pending);
        assert_eq!(r.generation(), 0);

        r.config.study_start = "08:00".into();
        let update = r.flush(now()).unwrap().unwrap();
        assert_eq!(update.triggers, vec![Trigger::Requested]);
    }
}
