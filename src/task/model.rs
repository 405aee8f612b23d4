#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RemindoError;

/// Upper bound for a reminder interval (one day).
pub const MAX_REMINDER_MINUTES: u32 = 1440;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Normal",
            Self::High => "High",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    None,
    Work,
    Personal,
    Shopping,
    Health,
}

impl Category {
    pub const ALL: [Self; 5] = [
        Self::None,
        Self::Work,
        Self::Personal,
        Self::Shopping,
        Self::Health,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Work => "work",
            Self::Personal => "personal",
            Self::Shopping => "shopping",
            Self::Health => "health",
        }
    }

    /// Display label, optionally prefixed with an icon. `None` has no label.
    #[must_use]
    pub fn label(self, icons: bool) -> Option<String> {
        let (icon, name) = match self {
            Self::None => return None,
            Self::Work => ("💼", "Work"),
            Self::Personal => ("👤", "Personal"),
            Self::Shopping => ("🛒", "Shopping"),
            Self::Health => ("💪", "Health"),
        };
        Some(if icons {
            format!("{icon} {name}")
        } else {
            name.to_owned()
        })
    }
}

macro_rules! impl_str_enum {
    ($ty:ty, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = RemindoError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let want = s.trim().to_ascii_lowercase();
                Self::ALL
                    .into_iter()
                    .find(|v| v.as_str() == want)
                    .ok_or_else(|| {
                        let allowed: Vec<&str> = Self::ALL.iter().map(|v| v.as_str()).collect();
                        RemindoError::Other(format!(
                            "invalid {} '{s}' (expected one of: {})",
                            $what,
                            allowed.join(", ")
                        ))
                    })
            }
        }
    };
}

impl_str_enum!(Priority, "priority");
impl_str_enum!(Category, "category");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub reminder_minutes: u32,
    #[serde(default)]
    pub reminder_active: bool,
    #[serde(default)]
    pub completed: bool,
    /// Creation instant in unix milliseconds.
    #[serde(default)]
    pub created_at: i64,
}

/// Form input for `add` and `edit`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub text: String,
    pub priority: Priority,
    pub category: Category,
    pub reminder_minutes: u32,
}

impl TaskDraft {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    #[must_use]
    pub fn remind_every(mut self, minutes: u32) -> Self {
        self.reminder_minutes = minutes;
        self
    }

    /// Returns the trimmed text and the checked interval.
    pub fn validate(&self) -> Result<(String, u32), RemindoError> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(RemindoError::EmptyText);
        }
        let minutes = check_reminder_minutes(self.reminder_minutes)?;
        Ok((text.to_owned(), minutes))
    }
}

impl Task {
    #[must_use]
    pub fn new_id() -> String {
        let id = Uuid::new_v4().simple().to_string();
        id.chars().take(8).collect()
    }

    #[must_use]
    pub fn has_reminder(&self) -> bool {
        self.reminder_minutes > 0
    }

    /// Whether a timer should be running for this task.
    #[must_use]
    pub fn wants_timer(&self) -> bool {
        self.reminder_active && !self.completed && self.reminder_minutes > 0
    }

    /// Restores the reminder invariants on a record read from storage.
    /// Returns true when anything had to change.
    pub fn repair(&mut self) -> bool {
        let mut changed = false;
        if self.reminder_minutes > MAX_REMINDER_MINUTES {
            self.reminder_minutes = 0;
            changed = true;
        }
        if self.reminder_active && (self.reminder_minutes == 0 || self.completed) {
            self.reminder_active = false;
            changed = true;
        }
        let trimmed = self.text.trim();
        if trimmed.len() != self.text.len() {
            self.text = trimmed.to_owned();
            changed = true;
        }
        changed
    }
}

pub fn check_reminder_minutes(minutes: u32) -> Result<u32, RemindoError> {
    if minutes > MAX_REMINDER_MINUTES {
        return Err(RemindoError::InvalidReminder(minutes));
    }
    Ok(minutes)
}

/// Formats an interval as `15m`, `2h`, or `90m` when it is not whole hours.
#[must_use]
pub fn format_interval(minutes: u32) -> String {
    if minutes >= 60 && minutes % 60 == 0 {
        return format!("{}h", minutes / 60);
    }
    format!("{minutes}m")
}

#[must_use]
pub fn now_millis() -> i64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_priority_and_category_case_insensitively() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(" shopping ".parse::<Category>().unwrap(), Category::Shopping);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn draft_validation_trims_and_bounds() {
        let (text, minutes) = TaskDraft::new("  Buy milk ").remind_every(15).validate().unwrap();
        assert_eq!(text, "Buy milk");
        assert_eq!(minutes, 15);

        assert!(matches!(
            TaskDraft::new("   ").validate(),
            Err(RemindoError::EmptyText)
        ));
        assert!(matches!(
            TaskDraft::new("x").remind_every(1441).validate(),
            Err(RemindoError::InvalidReminder(1441))
        ));
    }

    #[test]
    fn formats_intervals() {
        assert_eq!(format_interval(5), "5m");
        assert_eq!(format_interval(60), "1h");
        assert_eq!(format_interval(90), "90m");
        assert_eq!(format_interval(1440), "24h");
    }

    #[test]
    fn repair_enforces_reminder_invariants() {
        let mut t = Task {
            id: "a".to_owned(),
            text: "x".to_owned(),
            priority: Priority::Medium,
            category: Category::None,
            reminder_minutes: 0,
            reminder_active: true,
            completed: false,
            created_at: 0,
        };
        assert!(t.repair());
        assert!(!t.reminder_active);

        t.reminder_minutes = 10;
        t.reminder_active = true;
        t.completed = true;
        assert!(t.repair());
        assert!(!t.reminder_active);

        t.completed = false;
        t.reminder_active = true;
        assert!(!t.repair());
        assert!(t.wants_timer());
    }

    #[test]
    fn category_labels() {
        assert_eq!(Category::None.label(true), None);
        assert_eq!(Category::Work.label(false).as_deref(), Some("Work"));
    }
}
