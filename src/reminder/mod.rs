#![forbid(unsafe_code)]

//! Per-task repeating reminder timers.
//!
//! Each running timer is a spawned tokio task that ticks on an interval and
//! posts a [`ReminderFire`] to the scheduler's channel. The owner of the
//! scheduler drains the channel on its own loop and runs the notification
//! there, so firing never overlaps a task operation.
//!
//! Every start hands out a new generation number. A fire is only honoured
//! while its generation is still the registered one, which discards ticks
//! that were already queued when the timer was stopped or replaced.

pub mod notifier;

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::task::model::Task;

/// One elapsed period of a task's reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderFire {
    pub task_id: String,
    pub generation: u64,
}

#[derive(Debug)]
struct ActiveTimer {
    generation: u64,
    period: Duration,
    handle: JoinHandle<()>,
}

impl Drop for ActiveTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug)]
pub struct ReminderScheduler {
    timers: HashMap<String, ActiveTimer>,
    next_generation: u64,
    tx: mpsc::UnboundedSender<ReminderFire>,
    rx: mpsc::UnboundedReceiver<ReminderFire>,
}

impl Default for ReminderScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ReminderScheduler {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            timers: HashMap::new(),
            next_generation: 0,
            tx,
            rx,
        }
    }

    #[must_use]
    pub fn period_for(minutes: u32) -> Duration {
        Duration::from_secs(u64::from(minutes) * 60)
    }

    /// Starts (or restarts) the repeating timer for `task_id`.
    ///
    /// Any previous timer for the id is cancelled first. `minutes == 0` only
    /// stops. Must be called from within a tokio runtime.
    pub fn start(&mut self, task_id: &str, minutes: u32) {
        self.stop(task_id);
        if minutes == 0 {
            return;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let period = Self::period_for(minutes);
        let tx = self.tx.clone();
        let fire = ReminderFire {
            task_id: task_id.to_owned(),
            generation,
        };

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(fire.clone()).is_err() {
                    break;
                }
            }
        });

        debug!(task_id, minutes, generation, "reminder started");
        self.timers.insert(
            task_id.to_owned(),
            ActiveTimer {
                generation,
                period,
                handle,
            },
        );
    }

    /// Starts the timer for a task's configured interval.
    pub fn start_task(&mut self, task: &Task) {
        self.start(&task.id, task.reminder_minutes);
    }

    /// Cancels the timer for `task_id`. Returns whether one was running.
    pub fn stop(&mut self, task_id: &str) -> bool {
        let Some(timer) = self.timers.remove(task_id) else {
            return false;
        };
        debug!(task_id, generation = timer.generation, "reminder stopped");
        true
    }

    pub fn stop_all(&mut self) {
        if !self.timers.is_empty() {
            debug!(count = self.timers.len(), "stopping all reminders");
        }
        self.timers.clear();
    }

    /// Starts a timer for every task whose stored intent says it should run.
    /// Returns the number of timers running afterwards.
    pub fn restore_all(&mut self, tasks: &[Task]) -> usize {
        for task in tasks.iter().filter(|t| t.wants_timer()) {
            self.start_task(task);
        }
        self.timers.len()
    }

    #[must_use]
    pub fn is_running(&self, task_id: &str) -> bool {
        self.timers.contains_key(task_id)
    }

    #[must_use]
    pub fn period(&self, task_id: &str) -> Option<Duration> {
        self.timers.get(task_id).map(|t| t.period)
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    /// Ids with a running timer, sorted.
    #[must_use]
    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.timers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether `fire` belongs to the timer currently registered for its task.
    #[must_use]
    pub fn is_current(&self, fire: &ReminderFire) -> bool {
        self.timers
            .get(&fire.task_id)
            .is_some_and(|t| t.generation == fire.generation)
    }

    /// Waits for the next tick from any timer. Cancel safe.
    pub async fn next_fire(&mut self) -> Option<ReminderFire> {
        self.rx.recv().await
    }

    /// Returns a queued tick without waiting.
    pub fn try_next_fire(&mut self) -> Option<ReminderFire> {
        self.rx.try_recv().ok()
    }
}
