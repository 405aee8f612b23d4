use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Duration;

use remindo::error::RemindoError;
use remindo::reminder::notifier::{
    AlertBackend, Delivery, NoAlerts, Notifier, Permission, Presenter, SystemAlert, TOAST_TITLE,
};
use remindo::task::model::{Category, Priority, Task, TaskDraft};
use remindo::task::service::{ClearOutcome, ReminderChange, TaskService};
use remindo::task::storage::{KvStore, MemoryKvStore, TASKS_KEY, TaskStorage};
use remindo::task::store::TaskFilter;
use tokio::time::Instant;

#[derive(Clone, Default)]
struct Recorder {
    toasts: Rc<RefCell<Vec<(String, String)>>>,
    changes: Rc<RefCell<usize>>,
}

impl Presenter for Recorder {
    fn tasks_changed(&self, _tasks: &[Task]) {
        *self.changes.borrow_mut() += 1;
    }

    fn toast(&self, title: &str, body: &str) {
        self.toasts
            .borrow_mut()
            .push((title.to_owned(), body.to_owned()));
    }
}

#[derive(Clone, Default)]
struct GrantedAlerts {
    shown: Rc<RefCell<Vec<SystemAlert>>>,
}

impl AlertBackend for GrantedAlerts {
    fn permission(&self) -> Permission {
        Permission::Granted
    }

    fn request_permission(&self) {}

    fn show(&self, alert: &SystemAlert) -> Result<(), RemindoError> {
        self.shown.borrow_mut().push(alert.clone());
        Ok(())
    }
}

fn service_with(kv: MemoryKvStore, recorder: &Recorder) -> TaskService<MemoryKvStore> {
    TaskService::new(
        TaskStorage::new(kv),
        Notifier::new(Box::new(NoAlerts)),
        Box::new(recorder.clone()),
    )
}

fn service(recorder: &Recorder) -> TaskService<MemoryKvStore> {
    service_with(MemoryKvStore::new(), recorder)
}

async fn no_fire_within(service: &mut TaskService<MemoryKvStore>, window: Duration) -> bool {
    tokio::time::timeout(window, service.next_fire()).await.is_err()
}

#[tokio::test(start_paused = true)]
async fn add_with_reminder_fires_after_interval() {
    let recorder = Recorder::default();
    let mut service = service(&recorder);
    service.add(&TaskDraft::new("Older")).unwrap();

    let started = Instant::now();
    let task = service
        .add(&TaskDraft::new("  Buy milk ").remind_every(15))
        .unwrap();
    assert_eq!(task.text, "Buy milk");
    assert!(task.reminder_active);
    assert!(!task.completed);
    assert_eq!(service.tasks()[0].id, task.id);
    assert_eq!(
        service.scheduler().period(&task.id),
        Some(Duration::from_secs(900))
    );
    assert_eq!(*recorder.changes.borrow(), 2);

    let fire = service.next_fire().await.unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(900), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(901), "{elapsed:?}");
    assert_eq!(fire.task_id, task.id);

    assert_eq!(service.handle_fire(&fire), Some(Delivery::ToastOnly));
    assert_eq!(
        recorder.toasts.borrow().as_slice(),
        [(TOAST_TITLE.to_owned(), "Buy milk".to_owned())]
    );
}

#[tokio::test(start_paused = true)]
async fn add_rejects_blank_text_and_long_intervals() {
    let recorder = Recorder::default();
    let mut service = service(&recorder);

    assert!(matches!(
        service.add(&TaskDraft::new("   ")),
        Err(RemindoError::EmptyText)
    ));
    assert!(matches!(
        service.add(&TaskDraft::new("x").remind_every(1441)),
        Err(RemindoError::InvalidReminder(1441))
    ));
    assert!(service.tasks().is_empty());
    assert_eq!(*recorder.changes.borrow(), 0);
}

#[tokio::test(start_paused = true)]
async fn ids_stay_unique() {
    let recorder = Recorder::default();
    let mut service = service(&recorder);
    for i in 0..64 {
        service.add(&TaskDraft::new(format!("task {i}"))).unwrap();
    }
    let ids: HashSet<&str> = service.tasks().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids.len(), 64);
}

#[tokio::test(start_paused = true)]
async fn completing_stops_reminder_and_reopening_leaves_it_off() {
    let recorder = Recorder::default();
    let mut service = service(&recorder);
    let task = service
        .add(&TaskDraft::new("Stretch").remind_every(5))
        .unwrap();
    assert!(service.scheduler().is_running(&task.id));

    assert!(service.toggle_completed(&task.id).unwrap());
    let stored = service.get(&task.id).unwrap();
    assert!(stored.completed);
    assert!(!stored.reminder_active);
    assert!(!service.scheduler().is_running(&task.id));
    assert!(no_fire_within(&mut service, Duration::from_secs(3600)).await);

    assert!(!service.toggle_completed(&task.id).unwrap());
    let stored = service.get(&task.id).unwrap();
    assert!(!stored.completed);
    assert!(!stored.reminder_active);
    assert_eq!(stored.reminder_minutes, 5);
    assert!(!service.scheduler().is_running(&task.id));

    assert!(matches!(
        service.toggle_completed("missing"),
        Err(RemindoError::TaskNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn edit_to_zero_minutes_stops_reminder() {
    let recorder = Recorder::default();
    let mut service = service(&recorder);
    let task = service
        .add(&TaskDraft::new("Call mom").remind_every(15))
        .unwrap();

    let outcome = service
        .edit(
            &task.id,
            &TaskDraft::new("Call mom").priority(Priority::High),
        )
        .unwrap();
    assert_eq!(outcome.reminder, ReminderChange::Stopped);
    assert_eq!(outcome.task.reminder_minutes, 0);
    assert!(!outcome.task.reminder_active);
    assert_eq!(outcome.task.priority, Priority::High);
    assert!(!service.scheduler().is_running(&task.id));
}

#[tokio::test(start_paused = true)]
async fn edit_changing_interval_restarts_timer() {
    let recorder = Recorder::default();
    let mut service = service(&recorder);
    let task = service
        .add(&TaskDraft::new("Drink water").remind_every(30))
        .unwrap();

    let outcome = service
        .edit(
            &task.id,
            &TaskDraft::new("Drink water")
                .category(Category::Health)
                .remind_every(30),
        )
        .unwrap();
    assert_eq!(outcome.reminder, ReminderChange::Unchanged);
    assert_eq!(outcome.task.category, Category::Health);

    let started = Instant::now();
    let outcome = service
        .edit(&task.id, &TaskDraft::new("Drink water").remind_every(10))
        .unwrap();
    assert_eq!(outcome.reminder, ReminderChange::Restarted(10));

    let fire = service.next_fire().await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(600));
    assert!(started.elapsed() < Duration::from_secs(601));
    assert!(service.handle_fire(&fire).is_some());
}

#[tokio::test(start_paused = true)]
async fn editing_completed_task_keeps_reminder_inactive() {
    let recorder = Recorder::default();
    let mut service = service(&recorder);
    let task = service.add(&TaskDraft::new("Report")).unwrap();
    service.toggle_completed(&task.id).unwrap();

    let outcome = service
        .edit(&task.id, &TaskDraft::new("Report").remind_every(20))
        .unwrap();
    assert_eq!(outcome.reminder, ReminderChange::Stopped);
    assert_eq!(outcome.task.reminder_minutes, 20);
    assert!(!outcome.task.reminder_active);
    assert_eq!(service.scheduler().active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn fire_uses_current_text() {
    let recorder = Recorder::default();
    let mut service = service(&recorder);
    let task = service
        .add(&TaskDraft::new("Old text").remind_every(5))
        .unwrap();
    service
        .edit(&task.id, &TaskDraft::new("New text").remind_every(5))
        .unwrap();

    let fire = service.next_fire().await.unwrap();
    service.handle_fire(&fire);
    assert_eq!(recorder.toasts.borrow()[0].1, "New text");
}

#[tokio::test(start_paused = true)]
async fn stale_fire_after_stop_is_dropped() {
    let recorder = Recorder::default();
    let mut service = service(&recorder);
    let task = service
        .add(&TaskDraft::new("Stand up").remind_every(1))
        .unwrap();

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(!service.toggle_reminder(&task.id).unwrap());

    let queued = service.next_fire().await.unwrap();
    assert_eq!(queued.task_id, task.id);
    assert_eq!(service.handle_fire(&queued), None);
    assert!(recorder.toasts.borrow().is_empty());
    assert!(no_fire_within(&mut service, Duration::from_secs(600)).await);
}

#[tokio::test(start_paused = true)]
async fn toggle_reminder_requires_interval_and_open_task() {
    let recorder = Recorder::default();
    let mut service = service(&recorder);
    let plain = service.add(&TaskDraft::new("No reminder")).unwrap();
    let changes = *recorder.changes.borrow();

    assert!(matches!(
        service.toggle_reminder(&plain.id),
        Err(RemindoError::ReminderNotConfigured(_))
    ));
    assert!(!service.get(&plain.id).unwrap().reminder_active);
    assert_eq!(*recorder.changes.borrow(), changes);

    let timed = service
        .add(&TaskDraft::new("Timed").remind_every(45))
        .unwrap();
    assert!(!service.toggle_reminder(&timed.id).unwrap());
    assert!(!service.scheduler().is_running(&timed.id));
    assert!(service.toggle_reminder(&timed.id).unwrap());
    assert!(service.scheduler().is_running(&timed.id));

    service.toggle_completed(&timed.id).unwrap();
    assert!(matches!(
        service.toggle_reminder(&timed.id),
        Err(RemindoError::TaskCompleted(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn clear_completed_removes_only_done_tasks() {
    let recorder = Recorder::default();
    let mut service = service(&recorder);
    assert_eq!(service.clear_completed(), ClearOutcome::NothingToClear);

    let mut done = Vec::new();
    for i in 0..5 {
        let task = service
            .add(&TaskDraft::new(format!("t{i}")).remind_every(10))
            .unwrap();
        if i % 2 == 0 {
            done.push(task.id);
        }
    }
    for id in &done {
        service.toggle_completed(id).unwrap();
    }

    assert_eq!(service.clear_completed(), ClearOutcome::Cleared(3));
    assert_eq!(service.tasks().len(), 2);
    assert!(service.tasks().iter().all(|t| !t.completed));
    assert_eq!(service.scheduler().active_count(), 2);
    assert_eq!(service.filtered(TaskFilter::Completed).count(), 0);
}

#[tokio::test(start_paused = true)]
async fn delete_stops_timer() {
    let recorder = Recorder::default();
    let mut service = service(&recorder);
    let task = service
        .add(&TaskDraft::new("Temp").remind_every(2))
        .unwrap();

    let removed = service.delete(&task.id).unwrap();
    assert_eq!(removed.id, task.id);
    assert!(service.tasks().is_empty());
    assert_eq!(service.scheduler().active_count(), 0);
    assert!(no_fire_within(&mut service, Duration::from_secs(600)).await);
    assert!(matches!(
        service.delete(&task.id),
        Err(RemindoError::TaskNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn restore_starts_only_active_open_tasks() {
    let stored = r#"[
        {"id":"a","text":"A","priority":"high","category":"work","reminderMinutes":30,"reminderActive":true,"completed":false,"createdAt":1},
        {"id":"b","text":"B","reminderMinutes":30,"reminderActive":true,"completed":true,"createdAt":2},
        {"id":"c","text":"C","reminderMinutes":10,"reminderActive":false,"completed":false,"createdAt":3}
    ]"#;
    let recorder = Recorder::default();
    let mut service = service_with(MemoryKvStore::new().with_slot(TASKS_KEY, stored), &recorder);

    assert_eq!(service.tasks().len(), 3);
    assert!(!service.get("b").unwrap().reminder_active);
    assert_eq!(service.scheduler().active_count(), 0);

    assert_eq!(service.restore_reminders(), 1);
    assert_eq!(service.scheduler().active_ids(), ["a"]);
    assert_eq!(
        service.scheduler().period("a"),
        Some(Duration::from_secs(1800))
    );
}

#[tokio::test(start_paused = true)]
async fn corrupted_records_are_dropped_before_restore() {
    let stored = r#"[
        {"id":"a","text":"   ","reminderMinutes":5,"reminderActive":true,"completed":false,"createdAt":1},
        {"id":"a","text":"dup","reminderMinutes":5,"reminderActive":true,"completed":false,"createdAt":2}
    ]"#;
    let recorder = Recorder::default();
    let mut service = service_with(MemoryKvStore::new().with_slot(TASKS_KEY, stored), &recorder);

    let texts: Vec<&str> = service.tasks().iter().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, ["dup"]);
    assert_eq!(service.restore_reminders(), 1);

    service.delete("a").unwrap();
    assert!(service.tasks().is_empty());
    assert_eq!(service.scheduler().active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn malformed_storage_starts_empty() {
    let recorder = Recorder::default();
    let service = service_with(
        MemoryKvStore::new().with_slot(TASKS_KEY, "{not json"),
        &recorder,
    );
    assert!(service.tasks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rejected_writes_do_not_fail_operations() {
    let mut kv = MemoryKvStore::new();
    kv.reject_writes = true;
    let recorder = Recorder::default();
    let mut service = service_with(kv, &recorder);

    let task = service
        .add(&TaskDraft::new("Still works").remind_every(5))
        .unwrap();
    assert!(service.toggle_completed(&task.id).unwrap());
    assert_eq!(service.tasks().len(), 1);
    assert_eq!(*recorder.changes.borrow(), 2);
    assert_eq!(service.storage().kv().get(TASKS_KEY).unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn list_survives_reload() {
    let recorder = Recorder::default();
    let mut service = service(&recorder);
    service
        .add(
            &TaskDraft::new("First")
                .priority(Priority::Low)
                .category(Category::Shopping),
        )
        .unwrap();
    let second = service
        .add(&TaskDraft::new("Second").remind_every(60))
        .unwrap();
    service.toggle_reminder(&second.id).unwrap();

    let kv = service.storage().kv().clone();
    let before = service.tasks().to_vec();
    drop(service);

    let reloaded = service_with(kv, &recorder);
    assert_eq!(reloaded.tasks(), before.as_slice());
    assert_eq!(reloaded.tasks()[0].text, "Second");
    assert!(!reloaded.tasks()[0].reminder_active);
}

#[tokio::test(start_paused = true)]
async fn granted_alerts_are_tagged_per_task() {
    let recorder = Recorder::default();
    let alerts = GrantedAlerts::default();
    let mut service = TaskService::new(
        TaskStorage::new(MemoryKvStore::new()),
        Notifier::new(Box::new(alerts.clone())),
        Box::new(recorder.clone()),
    );
    let task = service
        .add(&TaskDraft::new("Pay rent").priority(Priority::High).remind_every(1))
        .unwrap();

    for _ in 0..2 {
        let fire = service.next_fire().await.unwrap();
        assert_eq!(service.handle_fire(&fire), Some(Delivery::ToastAndAlert));
    }

    let shown = alerts.shown.borrow();
    assert_eq!(shown.len(), 2);
    assert!(shown.iter().all(|a| a.tag == format!("task-{}", task.id)));
    assert_eq!(shown[0].body, "Pay rent\nPriority: High");
    assert_eq!(recorder.toasts.borrow().len(), 2);
}
