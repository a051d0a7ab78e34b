//! Background rescheduler.
//!
//! The worker task owns the [`Rescheduler`]. Hooks arrive over an mpsc
//! channel, each answered through a oneshot so callers still see validation
//! errors. Passes run on the blocking pool and each published schedule goes
//! out through a watch channel.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Rescheduler, ScheduleUpdate};
use crate::energy::EnergyProfile;
use crate::error::{CoreError, Result};
use crate::schedule::FixedEvent;
use crate::storage::{ScheduleRepository, WorkloadChange};
use crate::task::{Task, TaskPatch};

const COMMAND_BUFFER: usize = 64;

/// Longest wait between retries of a failing pass.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

enum Command {
    Change {
        change: WorkloadChange,
        reply: oneshot::Sender<Result<()>>,
    },
    Energy {
        profile: EnergyProfile,
        reply: oneshot::Sender<Result<()>>,
    },
    Recompute,
}

/// Cloneable front end to a running worker.
///
/// The worker shuts down once every handle is dropped, after running a final
/// pass for any triggers still waiting.
#[derive(Clone)]
pub struct RescheduleHandle {
    commands: mpsc::Sender<Command>,
    updates: watch::Receiver<Option<Arc<ScheduleUpdate>>>,
}

impl RescheduleHandle {
    pub async fn task_completed(&self, task_id: &str) -> Result<()> {
        self.change(WorkloadChange::CompleteTask(task_id.to_string()))
            .await
    }

    pub async fn task_added(&self, task: Task) -> Result<()> {
        self.change(WorkloadChange::AddTask(task)).await
    }

    pub async fn task_changed(&self, task_id: &str, patch: TaskPatch) -> Result<()> {
        self.change(WorkloadChange::UpdateTask(task_id.to_string(), patch))
            .await
    }

    pub async fn task_removed(&self, task_id: &str) -> Result<()> {
        self.change(WorkloadChange::RemoveTask(task_id.to_string()))
            .await
    }

    pub async fn event_added(&self, event: FixedEvent) -> Result<()> {
        self.change(WorkloadChange::AddEvent(event)).await
    }

    pub async fn event_removed(&self, event_id: &str) -> Result<()> {
        self.change(WorkloadChange::RemoveEvent(event_id.to_string()))
            .await
    }

    pub async fn energy_updated(&self, profile: EnergyProfile) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Energy { profile, reply }).await?;
        rx.await.map_err(|_| CoreError::WorkerStopped)?
    }

    /// Ask for a pass without changing anything.
    pub async fn recompute(&self) -> Result<()> {
        self.send(Command::Recompute).await
    }

    /// Receiver that sees every published schedule.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<ScheduleUpdate>>> {
        self.updates.clone()
    }

    /// Most recently published schedule, if any.
    pub fn latest(&self) -> Option<Arc<ScheduleUpdate>> {
        self.updates.borrow().clone()
    }

    async fn change(&self, change: WorkloadChange) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Change { change, reply }).await?;
        rx.await.map_err(|_| CoreError::WorkerStopped)?
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CoreError::WorkerStopped)
    }
}

/// Spawn a worker that stamps passes with the wall clock.
pub fn spawn_worker<R>(rescheduler: Rescheduler<R>) -> (RescheduleHandle, JoinHandle<Rescheduler<R>>)
where
    R: ScheduleRepository + Send + 'static,
{
    spawn_worker_with_clock(rescheduler, Utc::now)
}

/// Spawn a worker whose passes use `clock` for "now".
///
/// Must be called inside a tokio runtime. The join handle yields the
/// rescheduler back after shutdown.
pub fn spawn_worker_with_clock<R, C>(
    rescheduler: Rescheduler<R>,
    clock: C,
) -> (RescheduleHandle, JoinHandle<Rescheduler<R>>)
where
    R: ScheduleRepository + Send + 'static,
    C: Fn() -> DateTime<Utc> + Send + 'static,
{
    let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
    let (publish, updates) = watch::channel(None);
    let task = tokio::spawn(run(rescheduler, rx, publish, clock));
    (RescheduleHandle { commands, updates }, task)
}

async fn run<R, C>(
    mut rescheduler: Rescheduler<R>,
    mut rx: mpsc::Receiver<Command>,
    publish: watch::Sender<Option<Arc<ScheduleUpdate>>>,
    clock: C,
) -> Rescheduler<R>
where
    R: ScheduleRepository + Send + 'static,
    C: Fn() -> DateTime<Utc> + Send + 'static,
{
    let debounce = Duration::from_millis(rescheduler.config().debounce_ms);
    let mut wait = debounce;
    let mut open = true;
    info!(debounce_ms = rescheduler.config().debounce_ms, "rescheduler worker started");

    loop {
        if !rescheduler.has_pending() {
            if !open {
                break;
            }
            match rx.recv().await {
                Some(command) => handle(&mut rescheduler, command, clock()),
                None => open = false,
            }
            continue;
        }

        // Wait for a quiet period; every command restarts it
        if open {
            match tokio::time::timeout(wait, rx.recv()).await {
                Ok(Some(command)) => {
                    handle(&mut rescheduler, command, clock());
                    continue;
                }
                Ok(None) => open = false,
                Err(_) => {}
            }
        }

        let input = match rescheduler.begin_pass(clock()) {
            Ok(input) => input,
            Err(e) => {
                error!(error = %e, "failed to snapshot workload");
                rescheduler.abort_pass();
                break;
            }
        };
        let mut job = tokio::task::spawn_blocking(move || {
            let result = input.run();
            (input, result)
        });

        let joined = loop {
            tokio::select! {
                joined = &mut job => break joined,
                command = rx.recv(), if open => match command {
                    Some(command) => handle(&mut rescheduler, command, clock()),
                    None => open = false,
                },
            }
        };

        match joined {
            Ok((input, result)) => match rescheduler.complete_pass(input, result) {
                Ok(Some(update)) => {
                    wait = debounce;
                    publish.send_replace(Some(Arc::new(update)));
                }
                Ok(None) => debug!("pass superseded, recomputing"),
                Err(e) => {
                    if !open {
                        warn!(error = %e, "pass failed during shutdown, triggers left pending");
                        break;
                    }
                    // Back off while the failure persists
                    wait = (wait * 2).max(Duration::from_millis(100)).min(MAX_RETRY_DELAY);
                    debug!(error = %e, retry_in_ms = wait.as_millis() as u64, "retrying pass");
                }
            },
            Err(e) => {
                error!(error = %e, "scheduling pass panicked");
                rescheduler.abort_pass();
            }
        }
    }

    info!(generation = rescheduler.generation(), "rescheduler worker stopped");
    rescheduler
}

fn handle<R: ScheduleRepository>(rescheduler: &mut Rescheduler<R>, command: Command, now: DateTime<Utc>) {
    match command {
        Command::Change { change, reply } => {
            let _ = reply.send(rescheduler.on_change(change, now));
        }
        Command::Energy { profile, reply } => {
            let _ = reply.send(rescheduler.on_energy_updated(profile, now));
        }
        Command::Recompute => rescheduler.request(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryRepository, SchedulerConfig, Workload};
    use crate::task::TaskType;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap()
    }

    fn rescheduler() -> Rescheduler<MemoryRepository> {
        let workload = Workload {
            tasks: vec![
                Task::new("a", "Reading", TaskType::Reading, now() + chrono::Duration::days(3)),
                Task::new("b", "Quiz", TaskType::Quiz, now() + chrono::Duration::days(2)),
            ],
            ..Default::default()
        };
        let config = SchedulerConfig {
            seed: Some(9),
            ..Default::default()
        };
        Rescheduler::new(MemoryRepository::new(workload), config, EnergyProfile::default())
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_hooks_publishes_once() {
        let (handle, task) = spawn_worker_with_clock(rescheduler(), now);
        let mut updates = handle.subscribe();

        handle.task_completed("a").await.unwrap();
        handle
            .task_changed(
                "b",
                TaskPatch {
                    estimated_hours: Some(1.5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        updates.changed().await.unwrap();
        let update = handle.latest().unwrap();
        assert_eq!(update.generation, 1);
        assert_eq!(update.triggers.len(), 2);
        assert!(update.outcome.blocks.iter().all(|b| b.task_id == "b"));

        drop(updates);
        drop(handle);
        let rescheduler = task.await.unwrap();
        assert_eq!(rescheduler.repository().publish_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_ids_are_reported_to_the_caller() {
        let (handle, task) = spawn_worker_with_clock(rescheduler(), now);
        assert!(handle.task_completed("ghost").await.is_err());
        assert!(handle.event_removed("ghost").await.is_err());
        drop(handle);
        let rescheduler = task.await.unwrap();
        assert_eq!(rescheduler.generation(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_triggers_flush_on_shutdown() {
        let (handle, task) = spawn_worker_with_clock(rescheduler(), now);
        handle.recompute().await.unwrap();
        drop(handle);
        let rescheduler = task.await.unwrap();
        assert_eq!(rescheduler.generation(), 1);
    }

    #[tokio::test]
    async fn handle_errors_after_worker_stops() {
        let (handle, task) = spawn_worker_with_clock(rescheduler(), now);
        task.abort();
        let _ = task.await;
        assert!(matches!(
            handle.recompute().await,
            Err(CoreError::WorkerStopped)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_store_is_retried() {
        let (handle, task) = spawn_worker_with_clock(super::super::tests::flaky(2), now);
        let mut updates = handle.subscribe();

        handle.task_completed("a").await.unwrap();
        updates.changed().await.unwrap();
        let update = handle.latest().unwrap();
        assert_eq!(update.generation, 1);
        assert_eq!(update.triggers.len(), 1);

        drop(updates);
        drop(handle);
        let repo = task.await.unwrap().into_repository();
        assert_eq!(repo.failures, 0);
        assert_eq!(repo.inner.publish_count, 1);
    }
}
