#![forbid(unsafe_code)]

use serde::Serialize;

use crate::error::RemindoError;
use crate::task::model::Task;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl TaskFilter {
    #[must_use]
    pub fn matches(self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Active => !task.completed,
            Self::Completed => task.completed,
        }
    }
}

impl std::str::FromStr for TaskFilter {
    type Err = RemindoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "all" => Ok(Self::All),
            "active" => Ok(Self::Active),
            "completed" | "done" => Ok(Self::Completed),
            other => Err(RemindoError::Other(format!(
                "invalid filter '{other}' (expected all|active|completed)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct TaskStats {
    pub total: usize,
    pub done: usize,
    pub active: usize,
    pub percent_done: u8,
}

/// Ordered task collection, newest first.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: Vec<Task>,
}

impl TaskStore {
    #[must_use]
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Task] {
        &self.tasks
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Draws ids until one is not taken.
    #[must_use]
    pub fn fresh_id(&self) -> String {
        loop {
            let id = Task::new_id();
            if !self.contains(&id) {
                return id;
            }
        }
    }

    pub fn insert_front(&mut self, task: Task) {
        self.tasks.insert(0, task);
    }

    pub fn remove(&mut self, id: &str) -> Option<Task> {
        let idx = self.tasks.iter().position(|t| t.id == id)?;
        Some(self.tasks.remove(idx))
    }

    /// Removes every completed task, preserving the order of the rest.
    pub fn drain_completed(&mut self) -> Vec<Task> {
        let (done, keep): (Vec<Task>, Vec<Task>) =
            std::mem::take(&mut self.tasks).into_iter().partition(|t| t.completed);
        self.tasks = keep;
        done
    }

    pub fn filtered(&self, filter: TaskFilter) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |t| filter.matches(t))
    }

    /// Resolves an exact id, a unique id prefix, or a unique text match.
    pub fn find(&self, pattern: &str) -> Result<&Task, RemindoError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(RemindoError::TaskNotFound(pattern.to_owned()));
        }
        if let Some(task) = self.get(pattern) {
            return Ok(task);
        }

        let by_prefix: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| t.id.starts_with(pattern))
            .collect();
        match by_prefix.len() {
            1 => return Ok(by_prefix[0]),
            n if n > 1 => return Err(RemindoError::AmbiguousTask(pattern.to_owned())),
            _ => {}
        }

        let needle = pattern.to_lowercase();
        let mut by_text = self
            .tasks
            .iter()
            .filter(|t| t.text.to_lowercase().contains(&needle));
        match (by_text.next(), by_text.next()) {
            (Some(task), None) => Ok(task),
            (Some(_), Some(_)) => Err(RemindoError::AmbiguousTask(pattern.to_owned())),
            _ => Err(RemindoError::TaskNotFound(pattern.to_owned())),
        }
    }

    #[must_use]
    pub fn stats(&self) -> TaskStats {
        let total = self.tasks.len();
        let done = self.tasks.iter().filter(|t| t.completed).count();
        let percent_done = if total == 0 {
            0
        } else {
            // Rounded half up, always within 0..=100.
            u8::try_from((done * 200 + total) / (total * 2)).unwrap_or(100)
        };
        TaskStats {
            total,
            done,
            active: total - done,
            percent_done,
        }
    }
}
