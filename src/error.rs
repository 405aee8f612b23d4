#![forbid(unsafe_code)]

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemindoError {
    #[error("task text must not be empty")]
    EmptyText,

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("multiple tasks match pattern: {0}")]
    AmbiguousTask(String),

    #[error("reminder interval must be between 0 and 1440 minutes, got {0}")]
    InvalidReminder(u32),

    #[error("no reminder interval configured for task {0} (set one with `edit --remind`)")]
    ReminderNotConfigured(String),

    #[error("task {0} is completed")]
    TaskCompleted(String),

    #[error("invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("storage is full or read-only")]
    StorageFull,

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid config key '{0}'")]
    InvalidConfigKey(String),

    #[error("invalid config value for '{key}': {msg}")]
    InvalidConfigValue { key: String, msg: String },

    #[error("io error at {path}: {source}")]
    IoPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl RemindoError {
    /// Validation failures leave state untouched and are safe to show to the user as-is.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyText
                | Self::TaskNotFound(_)
                | Self::AmbiguousTask(_)
                | Self::InvalidReminder(_)
        )
    }

    /// The task exists but its reminder cannot be toggled in its current state.
    #[must_use]
    pub fn is_reminder_state(&self) -> bool {
        matches!(self, Self::ReminderNotConfigured(_) | Self::TaskCompleted(_))
    }

    /// Process exit status: 2 for invalid input, 3 for a reminder that cannot
    /// be toggled, 1 for anything else.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.is_validation() {
            2
        } else if self.is_reminder_state() {
            3
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_group_outcomes() {
        assert_eq!(RemindoError::EmptyText.exit_code(), 2);
        assert_eq!(RemindoError::TaskNotFound("a".into()).exit_code(), 2);
        assert_eq!(RemindoError::ReminderNotConfigured("a".into()).exit_code(), 3);
        assert_eq!(RemindoError::TaskCompleted("a".into()).exit_code(), 3);
        assert_eq!(RemindoError::StorageFull.exit_code(), 1);
        assert_eq!(RemindoError::Other("x".into()).exit_code(), 1);
    }
}
