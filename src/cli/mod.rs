#![forbid(unsafe_code)]

pub mod shell;

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{Args, CommandFactory as _, Parser, Subcommand};
use tracing::debug;

use crate::config::{self, Config};
use crate::error::RemindoError;
use crate::output::table::Table;
use crate::reminder::notifier::{CommandAlerts, Notifier, Presenter};
use crate::task::model::{Category, Priority, Task, TaskDraft, format_interval};
use crate::task::service::{ClearOutcome, ReminderChange, TaskService};
use crate::task::storage::{FileKvStore, TaskStorage, Theme};
use crate::task::store::TaskFilter;

const EXIT_STATUS_HELP: &str = "Exit status:\n  0  success\n  1  failure (I/O, config, storage)\n  2  invalid input (empty text, unknown or ambiguous task, interval over 1440)\n  3  reminder not toggled (task completed or no interval set)";

/// Longest task text accepted from the command line.
pub const MAX_TEXT_CHARS: usize = 200;

#[derive(Debug, Parser)]
#[command(
    name = "remindo",
    version,
    about = "Task list with recurring reminders",
    after_help = EXIT_STATUS_HELP
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(flatten)]
    Task(TaskCommand),
    /// Import tasks from a YAML or JSON file
    Import(ImportArgs),
    /// Show or change the theme preference
    Theme(ThemeArgs),
    /// Interactive shell that keeps reminders running
    Run,
    Config(ConfigArgs),
    Completion(CompletionArgs),
    Version,
}

/// Operations shared by the one-shot CLI and the interactive shell.
#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    /// Add a task
    Add(AddArgs),
    /// List tasks
    #[command(alias = "ls")]
    List(ListArgs),
    /// Show one task
    Show(PatternArgs),
    /// Edit a task; omitted fields keep their value
    Edit(EditArgs),
    /// Toggle completion
    Done(PatternArgs),
    /// Delete a task
    #[command(alias = "rm")]
    Delete(PatternArgs),
    /// Delete all completed tasks
    Clear,
    /// Toggle the reminder of a task
    Remind(PatternArgs),
    /// Show progress counters
    Stats(StatsArgs),
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Task text
    #[arg(required = true)]
    pub text: Vec<String>,
    #[arg(short = 'p', long = "priority", default_value = "medium")]
    pub priority: Priority,
    #[arg(short = 'c', long = "category", default_value = "none")]
    pub category: Category,
    /// Reminder interval in minutes (0 = none, max 1440)
    #[arg(short = 'r', long = "remind", default_value_t = 0)]
    pub remind: u32,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// all, active or completed
    #[arg(short = 'f', long = "filter", default_value = "all")]
    pub filter: TaskFilter,
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
    #[arg(long = "json")]
    pub json: bool,
    #[arg(long = "csv")]
    pub csv: bool,
}

#[derive(Debug, Args)]
pub struct PatternArgs {
    /// Task id, id prefix, or unique text fragment
    pub pattern: String,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    pub pattern: String,
    #[arg(short = 't', long = "text")]
    pub text: Option<String>,
    #[arg(short = 'p', long = "priority")]
    pub priority: Option<Priority>,
    #[arg(short = 'c', long = "category")]
    pub category: Option<Category>,
    /// Reminder interval in minutes (0 removes the reminder)
    #[arg(short = 'r', long = "remind")]
    pub remind: Option<u32>,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    pub file: String,
}

#[derive(Debug, Args)]
pub struct ThemeArgs {
    /// light, dark or toggle; omit to print the current theme
    pub value: Option<String>,
}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: clap_complete::Shell,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub cmd: ConfigCmd,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCmd {
    List,
    Set(ConfigSetArgs),
    Get(ConfigGetArgs),
}

#[derive(Debug, Args)]
pub struct ConfigSetArgs {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Args)]
pub struct ConfigGetArgs {
    pub key: String,
}

pub type Service = TaskService<FileKvStore>;

pub async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = run(cli).await;
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<RemindoError>()
        .map_or(1, RemindoError::exit_code)
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.cmd {
        Some(Commands::Completion(args)) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "remindo", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Config(args)) => match args.cmd {
            ConfigCmd::List => {
                print!("{}", config::list_resolved_toml()?);
                Ok(ExitCode::SUCCESS)
            }
            ConfigCmd::Set(set) => {
                config::set_value_string(&set.key, &set.value)?;
                println!("Set {} = {}", set.key, set.value);
                Ok(ExitCode::SUCCESS)
            }
            ConfigCmd::Get(get) => match config::get_value_string(&get.key)? {
                Some(v) => {
                    println!("{v}");
                    Ok(ExitCode::SUCCESS)
                }
                None => anyhow::bail!(
                    "configuration key '{}' not found - use 'remindo config list' to see available keys",
                    get.key
                ),
            },
        },
        Some(Commands::Version) => Ok(cmd_version()),
        Some(Commands::Run) => {
            let cfg = load_cfg().await?;
            shell::run_shell(&cfg).await
        }
        Some(Commands::Import(args)) => {
            let cfg = load_cfg().await?;
            let mut service = open_service(&cfg, false)?;
            cmd_import(&mut service, Path::new(&args.file))?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Theme(args)) => {
            let cfg = load_cfg().await?;
            let mut service = open_service(&cfg, false)?;
            cmd_theme(&mut service, args.value.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Task(cmd)) => {
            let cfg = load_cfg().await?;
            let mut service = open_service(&cfg, false)?;
            execute(&cfg, &mut service, cmd, false)?;
            Ok(ExitCode::SUCCESS)
        }
        None => {
            let cfg = load_cfg().await?;
            let mut service = open_service(&cfg, false)?;
            let list = ListArgs {
                filter: TaskFilter::All,
                verbose: false,
                json: false,
                csv: false,
            };
            execute(&cfg, &mut service, TaskCommand::List(list), false)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn load_cfg() -> anyhow::Result<Config> {
    let cfg = tokio::task::spawn_blocking(|| -> anyhow::Result<Config> {
        let (cfg, _doc, _paths) = config::load()?;
        Ok(cfg)
    })
    .await??;
    crate::logging::init(&cfg.log.level);
    Ok(cfg)
}

/// Prints toasts to stdout. In the shell it also echoes progress after
/// every change.
#[derive(Debug, Clone, Copy)]
pub struct ConsolePresenter {
    pub echo_changes: bool,
}

impl Presenter for ConsolePresenter {
    fn tasks_changed(&self, tasks: &[Task]) {
        if !self.echo_changes {
            return;
        }
        let done = tasks.iter().filter(|t| t.completed).count();
        println!("  [{done}/{} done]", tasks.len());
    }

    fn toast(&self, title: &str, body: &str) {
        println!("\n{title}: {body}");
    }
}

pub fn open_service(cfg: &Config, interactive: bool) -> anyhow::Result<Service> {
    let data_dir = cfg.data_dir()?;
    debug!(data_dir = %data_dir.display(), "opening task storage");
    let storage = TaskStorage::new(FileKvStore::new(data_dir));
    let alerts = CommandAlerts::new(
        cfg.notifications.command.clone(),
        cfg.notifications.app_name.clone(),
        cfg.notifications.enabled,
    );
    let presenter = ConsolePresenter {
        echo_changes: interactive,
    };
    Ok(TaskService::new(
        storage,
        Notifier::new(Box::new(alerts)),
        Box::new(presenter),
    ))
}

/// Runs one task operation and prints its result.
pub fn execute(
    cfg: &Config,
    service: &mut Service,
    cmd: TaskCommand,
    interactive: bool,
) -> anyhow::Result<()> {
    match cmd {
        TaskCommand::Add(args) => task_add(service, args, interactive),
        TaskCommand::List(args) => task_list(cfg, service, &args),
        TaskCommand::Show(args) => {
            let task = service.find(&args.pattern)?;
            print_task_details(cfg, task, service.scheduler().is_running(&task.id));
            Ok(())
        }
        TaskCommand::Edit(args) => task_edit(service, args, interactive),
        TaskCommand::Done(args) => {
            let id = service.find(&args.pattern)?.id.clone();
            let completed = service.toggle_completed(&id)?;
            let text = service.get(&id).map(|t| t.text.clone()).unwrap_or_default();
            if completed {
                println!("Completed '{text}'");
            } else {
                println!("Reopened '{text}'");
            }
            Ok(())
        }
        TaskCommand::Delete(args) => {
            let id = service.find(&args.pattern)?.id.clone();
            let task = service.delete(&id)?;
            println!("Deleted '{}'", task.text);
            Ok(())
        }
        TaskCommand::Clear => {
            match service.clear_completed() {
                ClearOutcome::Cleared(n) => println!("Cleared {n} completed task(s)"),
                ClearOutcome::NothingToClear => println!("No completed tasks to clear."),
            }
            Ok(())
        }
        TaskCommand::Remind(args) => {
            let id = service.find(&args.pattern)?.id.clone();
            let active = service.toggle_reminder(&id)?;
            let minutes = service.get(&id).map_or(0, |t| t.reminder_minutes);
            if active {
                println!("Reminder on: every {}", format_interval(minutes));
                print_reminder_hint(interactive);
            } else {
                println!("Reminder off");
            }
            Ok(())
        }
        TaskCommand::Stats(args) => {
            let stats = service.stats();
            if args.json {
                let mut s = serde_json::to_string_pretty(&stats)?;
                s.push('\n');
                print!("{s}");
                return Ok(());
            }
            println!(
                "{} task(s), {} done, {} active ({}%)",
                stats.total, stats.done, stats.active, stats.percent_done
            );
            println!("{}", progress_bar(stats.percent_done, 20));
            Ok(())
        }
    }
}

fn task_add(service: &mut Service, args: AddArgs, interactive: bool) -> anyhow::Result<()> {
    let text = args.text.join(" ");
    check_text_length(&text)?;
    let draft = TaskDraft::new(text)
        .priority(args.priority)
        .category(args.category)
        .remind_every(args.remind);
    let task = service.add(&draft)?;

    println!("Added '{}' (ID: {})", task.text, task.id);
    if task.reminder_active {
        println!("Reminder set: every {}", format_interval(task.reminder_minutes));
        print_reminder_hint(interactive);
    }
    Ok(())
}

fn task_edit(service: &mut Service, args: EditArgs, interactive: bool) -> anyhow::Result<()> {
    let current = service.find(&args.pattern)?.clone();
    let text = args.text.unwrap_or_else(|| current.text.clone());
    check_text_length(&text)?;
    let draft = TaskDraft::new(text)
        .priority(args.priority.unwrap_or(current.priority))
        .category(args.category.unwrap_or(current.category))
        .remind_every(args.remind.unwrap_or(current.reminder_minutes));

    let outcome = service.edit(&current.id, &draft)?;
    println!("Updated '{}'", outcome.task.text);
    match outcome.reminder {
        ReminderChange::Unchanged => {}
        ReminderChange::Restarted(minutes) => {
            println!("Reminder changed: every {}", format_interval(minutes));
            print_reminder_hint(interactive);
        }
        ReminderChange::Stopped => println!("Reminder removed"),
    }
    Ok(())
}

fn check_text_length(text: &str) -> anyhow::Result<()> {
    let n = text.trim().chars().count();
    if n > MAX_TEXT_CHARS {
        anyhow::bail!("task text is too long ({n} > {MAX_TEXT_CHARS} characters)");
    }
    Ok(())
}

fn print_reminder_hint(interactive: bool) {
    if !interactive {
        println!("  (reminders fire while `remindo run` is open)");
    }
}

fn task_list(cfg: &Config, service: &Service, args: &ListArgs) -> anyhow::Result<()> {
    let tasks: Vec<&Task> = service.filtered(args.filter).collect();

    if args.json {
        let mut s = serde_json::to_string_pretty(&tasks)?;
        s.push('\n');
        print!("{s}");
        return Ok(());
    }

    if args.csv {
        let mut t = Table::new([
            "id",
            "text",
            "priority",
            "category",
            "reminder_minutes",
            "reminder_active",
            "completed",
            "created_at",
        ]);
        for task in &tasks {
            t.row([
                task.id.clone(),
                task.text.clone(),
                task.priority.to_string(),
                task.category.to_string(),
                task.reminder_minutes.to_string(),
                task.reminder_active.to_string(),
                task.completed.to_string(),
                format_timestamp(task.created_at),
            ]);
        }
        t.write_csv()?;
        return Ok(());
    }

    if tasks.is_empty() {
        println!("{}", empty_message(args.filter));
        return Ok(());
    }

    let mut t = if args.verbose {
        Table::new(["", "ID", "TASK", "PRIORITY", "CATEGORY", "REMINDER", "CREATED"])
    } else {
        Table::new(["", "ID", "TASK", "PRIORITY", "CATEGORY", "REMINDER"])
    };
    for task in &tasks {
        let mut row = vec![
            completion_mark(task).to_owned(),
            task.id.clone(),
            if args.verbose {
                task.text.clone()
            } else {
                truncate(&task.text, 50)
            },
            task.priority.to_string(),
            task.category.label(cfg.ui.icons).unwrap_or_else(|| "-".to_owned()),
            reminder_cell(cfg, task, service.scheduler().is_running(&task.id)),
        ];
        if args.verbose {
            row.push(format_relative(task.created_at));
        }
        t.row(row);
    }
    t.print()?;

    let stats = service.stats();
    println!(
        "\n{} task(s), {} done {}",
        stats.total,
        stats.done,
        progress_bar(stats.percent_done, 10)
    );
    Ok(())
}

fn empty_message(filter: TaskFilter) -> &'static str {
    match filter {
        TaskFilter::Active => "Nothing in progress. Everything is done!",
        TaskFilter::Completed => "No completed tasks yet.",
        TaskFilter::All => "No tasks. Add one with `remindo add <text>`.",
    }
}

fn completion_mark(task: &Task) -> &'static str {
    if task.completed { "[x]" } else { "[ ]" }
}

fn reminder_cell(cfg: &Config, task: &Task, running: bool) -> String {
    if !task.has_reminder() {
        return "-".to_owned();
    }
    let interval = format_interval(task.reminder_minutes);
    let state = match (task.reminder_active, running) {
        (true, true) => "running",
        (true, false) => "on",
        (false, _) => "off",
    };
    if cfg.ui.icons && task.reminder_active {
        format!("🔔 {interval} ({state})")
    } else {
        format!("{interval} ({state})")
    }
}

fn print_task_details(cfg: &Config, task: &Task, running: bool) {
    println!("Task: {} (ID: {})", task.text, task.id);
    println!(
        "Status: {}",
        if task.completed { "completed" } else { "active" }
    );
    println!("Priority: {}", task.priority.label());
    if let Some(category) = task.category.label(cfg.ui.icons) {
        println!("Category: {category}");
    }
    println!("Reminder: {}", reminder_cell(cfg, task, running));
    println!(
        "Created: {} ({})",
        format_timestamp(task.created_at),
        format_relative(task.created_at)
    );
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum TaskFile {
    Wrapped { tasks: Vec<TaskFileEntry> },
    Plain(Vec<TaskFileEntry>),
}

#[derive(Debug, serde::Deserialize)]
struct TaskFileEntry {
    text: String,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    category: Category,
    #[serde(default, alias = "reminder_minutes", alias = "reminderMinutes")]
    remind: u32,
    #[serde(default)]
    completed: bool,
}

pub(crate) fn cmd_import(service: &mut Service, file: &Path) -> anyhow::Result<()> {
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read task file: {}", file.display()))?;
    let entries = match serde_yaml::from_str::<TaskFile>(&data)
        .with_context(|| format!("failed to parse task file: {}", file.display()))?
    {
        TaskFile::Wrapped { tasks } | TaskFile::Plain(tasks) => tasks,
    };

    // Validate everything before touching the list.
    for (i, entry) in entries.iter().enumerate() {
        check_text_length(&entry.text)
            .and_then(|()| Ok(entry_draft(entry).validate()?))
            .with_context(|| format!("task #{} in {}", i + 1, file.display()))?;
    }

    // Adding prepends, so go backwards to keep the file's order on top.
    for entry in entries.iter().rev() {
        let task = service.add(&entry_draft(entry))?;
        if entry.completed {
            service.toggle_completed(&task.id)?;
        }
    }
    println!(
        "Imported {} task(s) from {}",
        entries.len(),
        file.display()
    );
    Ok(())
}

fn entry_draft(entry: &TaskFileEntry) -> TaskDraft {
    TaskDraft::new(entry.text.clone())
        .priority(entry.priority)
        .category(entry.category)
        .remind_every(entry.remind)
}

pub(crate) fn cmd_theme(service: &mut Service, value: Option<&str>) -> anyhow::Result<()> {
    let current = service.storage().load_theme().unwrap_or_default();
    let next = match value.map(str::trim) {
        None => {
            println!("{}", current.as_str());
            return Ok(());
        }
        Some("toggle") => current.toggled(),
        Some("light") => Theme::Light,
        Some("dark") => Theme::Dark,
        Some("reset") => {
            service.storage_mut().reset_theme()?;
            println!("Theme reset to default ({})", Theme::default().as_str());
            return Ok(());
        }
        Some(other) => anyhow::bail!("invalid theme '{other}' (expected light|dark|toggle|reset)"),
    };
    service.storage_mut().save_theme(next)?;
    println!("Theme: {}", next.as_str());
    Ok(())
}

fn cmd_version() -> ExitCode {
    println!("remindo version {}", env!("CARGO_PKG_VERSION"));
    println!("  rust: {}", rustc_version_runtime::version());
    println!(
        "  os/arch: {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    ExitCode::SUCCESS
}

fn progress_bar(percent: u8, width: usize) -> String {
    let filled = usize::from(percent.min(100)) * width / 100;
    format!(
        "[{}{}] {percent}%",
        "#".repeat(filled),
        "-".repeat(width - filled)
    )
}

fn truncate(s: &str, max: usize) -> String {
    let mut out: String = s.chars().take(max).collect();
    if s.chars().count() > max {
        out.push_str("...");
    }
    out
}

fn millis_to_datetime(ms: i64) -> Option<time::OffsetDateTime> {
    time::OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
}

fn format_timestamp(ms: i64) -> String {
    millis_to_datetime(ms)
        .and_then(|t| {
            t.format(&time::format_description::well_known::Rfc3339)
                .ok()
        })
        .unwrap_or_else(|| "unknown".to_owned())
}

fn format_relative(ms: i64) -> String {
    let Some(created) = millis_to_datetime(ms) else {
        return "-".to_owned();
    };
    let elapsed = time::OffsetDateTime::now_utc() - created;
    if elapsed.is_negative() {
        return "just now".to_owned();
    }
    format!("{} ago", format_duration(elapsed))
}

fn format_duration(d: time::Duration) -> String {
    if d < time::Duration::minutes(1) {
        return format!("{}s", d.whole_seconds());
    }
    if d < time::Duration::hours(1) {
        return format!("{}m", d.whole_minutes());
    }
    if d < time::Duration::days(1) {
        let hours = d.whole_hours();
        let minutes = (d - time::Duration::hours(hours)).whole_minutes();
        return format!("{hours}h {minutes}m");
    }
    format!("{}d", d.whole_days())
}
