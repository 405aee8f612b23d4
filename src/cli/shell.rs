#![forbid(unsafe_code)]

use std::io::Write as _;
use std::path::Path;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::{debug, info};

use super::{ImportArgs, Service, TaskCommand, ThemeArgs};
use crate::config::Config;
use crate::task::model::format_interval;

#[derive(Debug, Parser)]
#[command(
    name = "remindo",
    no_binary_name = true,
    disable_version_flag = true,
    help_template = "{all-args}"
)]
struct ShellLine {
    #[command(subcommand)]
    cmd: ShellCommand,
}

#[derive(Debug, Subcommand)]
enum ShellCommand {
    #[command(flatten)]
    Task(TaskCommand),
    /// Import tasks from a YAML or JSON file
    Import(ImportArgs),
    /// Show or change the theme preference
    Theme(ThemeArgs),
    /// List running reminder timers
    Timers,
    /// Leave the shell
    #[command(aliases = ["exit", "q"])]
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Interactive loop. Reminder timers only fire while this is running.
///
/// Stdin lines, timer ticks and Ctrl-C are multiplexed on one task, so a
/// reminder never runs in the middle of a command.
pub async fn run_shell(cfg: &Config) -> anyhow::Result<ExitCode> {
    let mut service = super::open_service(cfg, true)?;
    service.notifier().request_permission_if_undetermined();
    let restored = service.restore_reminders();

    println!(
        "remindo: {} task(s), {restored} reminder(s) running. Type `help` for commands, `quit` to leave.",
        service.tasks().len()
    );
    if !cfg.reminders.presets.is_empty() {
        let presets: Vec<String> = cfg
            .reminders
            .presets
            .iter()
            .map(|m| format_interval(*m))
            .collect();
        println!("Reminder presets (add -r <minutes>): {}", presets.join(", "));
    }
    debug!(permission = ?service.notifier().permission(), "alert backend probed");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
            Some(fire) = service.next_fire() => {
                if service.handle_fire(&fire).is_some() {
                    prompt();
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if run_shell_line(cfg, &mut service, &line) == Flow::Quit {
                    break;
                }
                prompt();
            }
        }
    }

    service.shutdown();
    info!("shell closed");
    Ok(ExitCode::SUCCESS)
}

fn prompt() {
    print!("remindo> ");
    let _ = std::io::stdout().flush();
}

fn run_shell_line(cfg: &Config, service: &mut Service, line: &str) -> Flow {
    let words = match split_command_line(line) {
        Ok(words) => words,
        Err(msg) => {
            eprintln!("Error: {msg}");
            return Flow::Continue;
        }
    };
    if words.is_empty() {
        return Flow::Continue;
    }

    let parsed = match ShellLine::try_parse_from(&words) {
        Ok(parsed) => parsed,
        Err(err) => {
            let _ = err.print();
            return Flow::Continue;
        }
    };

    let result = match parsed.cmd {
        ShellCommand::Quit => return Flow::Quit,
        ShellCommand::Task(cmd) => super::execute(cfg, service, cmd, true),
        ShellCommand::Import(args) => super::cmd_import(service, Path::new(&args.file)),
        ShellCommand::Theme(args) => super::cmd_theme(service, args.value.as_deref()),
        ShellCommand::Timers => {
            print_timers(service);
            Ok(())
        }
    };
    if let Err(err) = result {
        eprintln!("Error: {err:#}");
    }
    Flow::Continue
}

fn print_timers(service: &Service) {
    let scheduler = service.scheduler();
    if scheduler.active_count() == 0 {
        println!("No reminders running.");
        return;
    }
    for id in scheduler.active_ids() {
        let text = service.get(&id).map_or("?", |t| t.text.as_str());
        let every = scheduler
            .period(&id)
            .and_then(|p| u32::try_from(p.as_secs() / 60).ok())
            .map_or_else(|| "?".to_owned(), format_interval);
        println!("{id}  every {every}  {text}");
    }
}

/// Splits a shell line into words. Single and double quotes group words and
/// a backslash escapes the next character outside single quotes.
fn split_command_line(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"') | None, '\\') => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| "trailing backslash".to_owned())?;
                current.push(escaped);
                in_word = true;
            }
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(format!("unterminated {q} quote"));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_quoted_words() {
        assert_eq!(
            split_command_line(r#"add "Buy milk" -r 15"#).unwrap(),
            ["add", "Buy milk", "-r", "15"]
        );
        assert_eq!(
            split_command_line(r"edit ab --text 'it\'s'").unwrap_err(),
            "unterminated ' quote"
        );
        assert_eq!(
            split_command_line(r#"add say\ "hi" ''"#).unwrap(),
            ["add", "say hi", ""]
        );
        assert!(split_command_line("   ").unwrap().is_empty());
        assert!(split_command_line("add \"open").is_err());
    }

    #[test]
    fn parses_shell_commands() {
        let parsed = ShellLine::try_parse_from(["remind", "ab12"]).unwrap();
        assert!(matches!(parsed.cmd, ShellCommand::Task(TaskCommand::Remind(_))));

        let parsed = ShellLine::try_parse_from(["exit"]).unwrap();
        assert!(matches!(parsed.cmd, ShellCommand::Quit));

        let parsed = ShellLine::try_parse_from(["timers"]).unwrap();
        assert!(matches!(parsed.cmd, ShellCommand::Timers));

        assert!(ShellLine::try_parse_from(["run"]).is_err());
    }
}
