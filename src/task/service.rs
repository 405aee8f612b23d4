#![forbid(unsafe_code)]

use tracing::{debug, info};

use crate::error::RemindoError;
use crate::reminder::notifier::{Delivery, Notifier, Presenter};
use crate::reminder::{ReminderFire, ReminderScheduler};
use crate::task::model::{Task, TaskDraft, now_millis};
use crate::task::storage::{KvStore, TaskStorage};
use crate::task::store::{TaskFilter, TaskStats, TaskStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderChange {
    Unchanged,
    Restarted(u32),
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    pub task: Task,
    pub reminder: ReminderChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Cleared(usize),
    NothingToClear,
}

/// Task CRUD with reminder bookkeeping.
///
/// Owns the task list, its persistence and the reminder timers, and keeps
/// `reminder_active` consistent with what the scheduler is running. Every
/// successful mutation writes the whole list and notifies the presenter.
pub struct TaskService<K> {
    store: TaskStore,
    storage: TaskStorage<K>,
    scheduler: ReminderScheduler,
    notifier: Notifier,
    presenter: Box<dyn Presenter>,
}

impl<K: KvStore> TaskService<K> {
    /// Loads the stored list. Timers are not started until
    /// [`restore_reminders`](Self::restore_reminders).
    pub fn new(storage: TaskStorage<K>, notifier: Notifier, presenter: Box<dyn Presenter>) -> Self {
        let store = TaskStore::new(storage.load());
        debug!(count = store.len(), "tasks loaded");
        Self {
            store,
            storage,
            scheduler: ReminderScheduler::new(),
            notifier,
            presenter,
        }
    }

    pub fn restore_reminders(&mut self) -> usize {
        let started = self.scheduler.restore_all(self.store.as_slice());
        info!(started, "reminders restored");
        started
    }

    pub fn add(&mut self, draft: &TaskDraft) -> Result<Task, RemindoError> {
        let (text, minutes) = draft.validate()?;
        let task = Task {
            id: self.store.fresh_id(),
            text,
            priority: draft.priority,
            category: draft.category,
            reminder_minutes: minutes,
            reminder_active: minutes > 0,
            completed: false,
            created_at: now_millis(),
        };
        self.store.insert_front(task.clone());
        self.changed();

        if task.reminder_active {
            self.scheduler.start_task(&task);
        }
        info!(task_id = %task.id, reminder_minutes = minutes, "task added");
        Ok(task)
    }

    pub fn edit(&mut self, id: &str, draft: &TaskDraft) -> Result<EditOutcome, RemindoError> {
        if !self.store.contains(id) {
            return Err(RemindoError::TaskNotFound(id.to_owned()));
        }
        let (text, minutes) = draft.validate()?;

        let task = self
            .store
            .get_mut(id)
            .ok_or_else(|| RemindoError::TaskNotFound(id.to_owned()))?;
        let old_minutes = task.reminder_minutes;
        task.text = text;
        task.priority = draft.priority;
        task.category = draft.category;
        task.reminder_minutes = minutes;

        let mut reminder = ReminderChange::Unchanged;
        if minutes != old_minutes {
            self.scheduler.stop(id);
            task.reminder_active = minutes > 0 && !task.completed;
            if task.reminder_active {
                self.scheduler.start(id, minutes);
                reminder = ReminderChange::Restarted(minutes);
            } else {
                reminder = ReminderChange::Stopped;
            }
        }
        let task = task.clone();
        self.changed();

        info!(task_id = %id, ?reminder, "task edited");
        Ok(EditOutcome { task, reminder })
    }

    /// Flips completion and returns the new state. Completing stops the
    /// reminder; un-completing leaves it off.
    pub fn toggle_completed(&mut self, id: &str) -> Result<bool, RemindoError> {
        let task = self
            .store
            .get_mut(id)
            .ok_or_else(|| RemindoError::TaskNotFound(id.to_owned()))?;
        task.completed = !task.completed;
        let completed = task.completed;
        if completed {
            task.reminder_active = false;
            self.scheduler.stop(id);
        }
        self.changed();

        info!(task_id = %id, completed, "task completion toggled");
        Ok(completed)
    }

    pub fn delete(&mut self, id: &str) -> Result<Task, RemindoError> {
        if !self.store.contains(id) {
            return Err(RemindoError::TaskNotFound(id.to_owned()));
        }
        self.scheduler.stop(id);
        let task = self
            .store
            .remove(id)
            .ok_or_else(|| RemindoError::TaskNotFound(id.to_owned()))?;
        self.changed();

        info!(task_id = %id, "task deleted");
        Ok(task)
    }

    pub fn clear_completed(&mut self) -> ClearOutcome {
        let done: Vec<String> = self
            .store
            .filtered(TaskFilter::Completed)
            .map(|t| t.id.clone())
            .collect();
        if done.is_empty() {
            return ClearOutcome::NothingToClear;
        }
        for id in &done {
            self.scheduler.stop(id);
        }
        let removed = self.store.drain_completed().len();
        self.changed();

        info!(removed, "completed tasks cleared");
        ClearOutcome::Cleared(removed)
    }

    /// Flips the reminder on or off and returns the new state.
    pub fn toggle_reminder(&mut self, id: &str) -> Result<bool, RemindoError> {
        let task = self
            .store
            .get_mut(id)
            .ok_or_else(|| RemindoError::TaskNotFound(id.to_owned()))?;
        if task.completed {
            return Err(RemindoError::TaskCompleted(id.to_owned()));
        }
        if task.reminder_minutes == 0 {
            return Err(RemindoError::ReminderNotConfigured(id.to_owned()));
        }

        task.reminder_active = !task.reminder_active;
        let active = task.reminder_active;
        if active {
            self.scheduler.start(id, task.reminder_minutes);
        } else {
            self.scheduler.stop(id);
        }
        self.changed();

        info!(task_id = %id, active, "reminder toggled");
        Ok(active)
    }

    /// Waits for the next timer tick. Cancel safe.
    pub async fn next_fire(&mut self) -> Option<ReminderFire> {
        self.scheduler.next_fire().await
    }

    /// Delivers a reminder for `fire` using the task as it is now.
    ///
    /// Ticks from stopped or replaced timers are dropped. A tick for a task
    /// that no longer wants a timer stops it.
    pub fn handle_fire(&mut self, fire: &ReminderFire) -> Option<Delivery> {
        if !self.scheduler.is_current(fire) {
            debug!(task_id = %fire.task_id, generation = fire.generation, "stale reminder tick dropped");
            return None;
        }
        let Some(task) = self.store.get(&fire.task_id).filter(|t| t.wants_timer()) else {
            self.scheduler.stop(&fire.task_id);
            return None;
        };
        let delivery = self.notifier.remind(task, self.presenter.as_ref());
        debug!(task_id = %task.id, ?delivery, "reminder delivered");
        Some(delivery)
    }

    /// Cancels every timer. Stored reminder intent is kept.
    pub fn shutdown(&mut self) {
        self.scheduler.stop_all();
    }

    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        self.store.as_slice()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Task> {
        self.store.get(id)
    }

    pub fn find(&self, pattern: &str) -> Result<&Task, RemindoError> {
        self.store.find(pattern)
    }

    pub fn filtered(&self, filter: TaskFilter) -> impl Iterator<Item = &Task> {
        self.store.filtered(filter)
    }

    #[must_use]
    pub fn stats(&self) -> TaskStats {
        self.store.stats()
    }

    #[must_use]
    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    #[must_use]
    pub fn storage(&self) -> &TaskStorage<K> {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut TaskStorage<K> {
        &mut self.storage
    }

    fn changed(&mut self) {
        self.storage.save(self.store.as_slice());
        self.presenter.tasks_changed(self.store.as_slice());
    }
}

impl<K> Drop for TaskService<K> {
    fn drop(&mut self) {
        self.scheduler.stop_all();
    }
}
