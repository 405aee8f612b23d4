#![forbid(unsafe_code)]

use std::cell::Cell;

use tracing::{debug, warn};

use crate::error::RemindoError;
use crate::task::model::Task;

pub const ALERT_TITLE: &str = "To-Do";
pub const TOAST_TITLE: &str = "⏰ Task reminder";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    Undetermined,
}

/// A system-level alert. `tag` identifies the task so a newer alert replaces
/// the previous one instead of stacking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemAlert {
    pub title: String,
    pub body: String,
    pub tag: String,
    pub priority_label: String,
}

impl SystemAlert {
    #[must_use]
    pub fn for_task(task: &Task) -> Self {
        let priority_label = task.priority.label().to_owned();
        Self {
            title: ALERT_TITLE.to_owned(),
            body: format!("{}\nPriority: {priority_label}", task.text),
            tag: format!("task-{}", task.id),
            priority_label,
        }
    }
}

/// Platform alert capability.
pub trait AlertBackend {
    fn permission(&self) -> Permission;
    /// Fire-and-forget; the outcome shows up in later `permission()` calls.
    fn request_permission(&self);
    fn show(&self, alert: &SystemAlert) -> Result<(), RemindoError>;
}

/// Core -> UI callbacks.
pub trait Presenter {
    fn tasks_changed(&self, tasks: &[Task]);
    fn toast(&self, title: &str, body: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    ToastOnly,
    ToastAndAlert,
}

pub struct Notifier {
    alerts: Box<dyn AlertBackend>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("permission", &self.alerts.permission())
            .finish()
    }
}

impl Notifier {
    #[must_use]
    pub fn new(alerts: Box<dyn AlertBackend>) -> Self {
        Self { alerts }
    }

    #[must_use]
    pub fn permission(&self) -> Permission {
        self.alerts.permission()
    }

    /// Asks for permission only while it has never been decided.
    pub fn request_permission_if_undetermined(&self) {
        if self.alerts.permission() == Permission::Undetermined {
            self.alerts.request_permission();
        }
    }

    /// Delivers one reminder for `task`. The toast is unconditional; the
    /// system alert needs permission and its failures are only logged.
    pub fn remind(&self, task: &Task, presenter: &dyn Presenter) -> Delivery {
        presenter.toast(TOAST_TITLE, &task.text);

        if self.alerts.permission() != Permission::Granted {
            debug!(task_id = %task.id, "alert permission not granted, toast only");
            return Delivery::ToastOnly;
        }
        match self.alerts.show(&SystemAlert::for_task(task)) {
            Ok(()) => Delivery::ToastAndAlert,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "system alert failed");
                Delivery::ToastOnly
            }
        }
    }
}

/// Backend for environments without system alerts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAlerts;

impl AlertBackend for NoAlerts {
    fn permission(&self) -> Permission {
        Permission::Denied
    }

    fn request_permission(&self) {}

    fn show(&self, _alert: &SystemAlert) -> Result<(), RemindoError> {
        Ok(())
    }
}

/// Shows alerts through a desktop notification command such as `notify-send`.
///
/// Permission is granted when alerts are enabled and the command resolves on
/// PATH. It stays undetermined until the first probe.
#[derive(Debug)]
pub struct CommandAlerts {
    command: String,
    app_name: String,
    enabled: bool,
    permission: Cell<Permission>,
}

impl CommandAlerts {
    #[must_use]
    pub fn new(command: String, app_name: String, enabled: bool) -> Self {
        let permission = if enabled {
            Permission::Undetermined
        } else {
            Permission::Denied
        };
        Self {
            command,
            app_name,
            enabled,
            permission: Cell::new(permission),
        }
    }

    fn urgency(alert: &SystemAlert) -> &'static str {
        match alert.priority_label.as_str() {
            "High" => "critical",
            "Low" => "low",
            _ => "normal",
        }
    }
}

impl AlertBackend for CommandAlerts {
    fn permission(&self) -> Permission {
        self.permission.get()
    }

    fn request_permission(&self) {
        if !self.enabled {
            self.permission.set(Permission::Denied);
            return;
        }
        let granted = which::which(&self.command).is_ok();
        if !granted {
            debug!(command = %self.command, "notification command not found in PATH");
        }
        self.permission.set(if granted {
            Permission::Granted
        } else {
            Permission::Denied
        });
    }

    fn show(&self, alert: &SystemAlert) -> Result<(), RemindoError> {
        let result = tokio::process::Command::new(&self.command)
            .arg(format!("--app-name={}", self.app_name))
            .arg(format!("--urgency={}", Self::urgency(alert)))
            .arg(format!(
                "--hint=string:x-canonical-private-synchronous:{}",
                alert.tag
            ))
            .arg(&alert.title)
            .arg(&alert.body)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn();
        match result {
            // The runtime reaps the child in the background.
            Ok(_child) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.permission.set(Permission::Denied);
                Err(RemindoError::Other(format!(
                    "{} was not found in PATH",
                    self.command
                )))
            }
            Err(e) => Err(RemindoError::Other(format!(
                "failed to run {}: {e}",
                self.command
            ))),
        }
    }
}
