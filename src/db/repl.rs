//! Interactive REPL (Read-Eval-Print Loop) over an in-memory connection.
//!
//! Statements drive the savepoint primitives through the interceptor;
//! dot-commands register hooks, inject failures, and inspect state.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use super::connection::Connection;
use super::error::{DbError, DbResult};
use super::memory::MemoryAdapter;
use crate::hooks::{HookError, HookKind};
use crate::savepoint::{InterceptorConfig, InterceptorRegistry};

/// REPL configuration.
#[derive(Debug, Clone)]
pub struct ReplConfig {
    /// Prompt string.
    pub prompt: String,
    /// Show timing information.
    pub timing: bool,
    /// Print a line for every hook that fires.
    pub echo_hooks: bool,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            prompt: "aftercommit> ".into(),
            timing: false,
            echo_hooks: true,
        }
    }
}

/// A parsed REPL input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Savepoint(String),
    Release(Option<String>),
    RollbackTo(Option<String>),
    Hook {
        kind: HookKind,
        name: String,
        fail: Option<String>,
    },
    FailRelease(String),
    FailRollback(String),
    Begin,
    Reset,
    Status,
    Hooks,
    Journal,
    History,
    Timing,
    Help,
    Quit,
}

impl Command {
    /// Parse one statement or dot-command.
    pub fn parse(input: &str) -> DbResult<Command> {
        let input = input.trim().trim_end_matches(';').trim();
        if input.starts_with('.') || input.starts_with('\\') {
            return Self::parse_dot(input.trim_start_matches(&['.', '\\'][..]));
        }

        let parts: Vec<&str> = input.split_whitespace().collect();
        let upper: Vec<String> = parts.iter().map(|p| p.to_uppercase()).collect();
        let words: Vec<&str> = upper.iter().map(String::as_str).collect();

        match words.as_slice() {
            ["SAVEPOINT", _] => Ok(Command::Savepoint(parts[1].to_string())),
            ["RELEASE"] | ["RELEASE", "SAVEPOINT"] => Ok(Command::Release(None)),
            ["RELEASE", "SAVEPOINT", _] => Ok(Command::Release(Some(parts[2].to_string()))),
            ["RELEASE", _] => Ok(Command::Release(Some(parts[1].to_string()))),
            ["ROLLBACK", "TO"] | ["ROLLBACK", "TO", "SAVEPOINT"] => Ok(Command::RollbackTo(None)),
            ["ROLLBACK", "TO", "SAVEPOINT", _] => {
                Ok(Command::RollbackTo(Some(parts[3].to_string())))
            }
            ["ROLLBACK", "TO", _] => Ok(Command::RollbackTo(Some(parts[2].to_string()))),
            _ => Err(DbError::InvalidCommand(input.to_string())),
        }
    }

    fn parse_dot(cmd: &str) -> DbResult<Command> {
        let parts: Vec<&str> = cmd.split_whitespace().collect();
        let command = parts.first().map(|s| s.to_lowercase());

        match command.as_deref() {
            Some("hook") => {
                let (Some(kind), Some(name)) = (parts.get(1), parts.get(2)) else {
                    return Err(DbError::InvalidCommand(
                        "usage: .hook <kind> <name> [fail <message>]".into(),
                    ));
                };
                let kind = kind.parse::<HookKind>().map_err(DbError::UnknownHookKind)?;
                let fail = match parts.get(3) {
                    Some(word) if word.eq_ignore_ascii_case("fail") => {
                        let message = parts[4..].join(" ");
                        Some(if message.is_empty() {
                            format!("{} failed", name)
                        } else {
                            message
                        })
                    }
                    Some(other) => {
                        return Err(DbError::InvalidCommand(format!(
                            "unexpected argument: {}",
                            other
                        )))
                    }
                    None => None,
                };
                Ok(Command::Hook {
                    kind,
                    name: name.to_string(),
                    fail,
                })
            }
            Some("fail") => {
                let message = parts.get(2..).map(|m| m.join(" ")).unwrap_or_default();
                let message = if message.is_empty() {
                    "injected failure".to_string()
                } else {
                    message
                };
                match parts.get(1).map(|s| s.to_lowercase()).as_deref() {
                    Some("release") => Ok(Command::FailRelease(message)),
                    Some("rollback") => Ok(Command::FailRollback(message)),
                    _ => Err(DbError::InvalidCommand(
                        "usage: .fail release|rollback [message]".into(),
                    )),
                }
            }
            Some("begin") => Ok(Command::Begin),
            Some("reset") => Ok(Command::Reset),
            Some("status") | Some("stats") => Ok(Command::Status),
            Some("hooks") => Ok(Command::Hooks),
            Some("journal") => Ok(Command::Journal),
            Some("history") => Ok(Command::History),
            Some("timing") => Ok(Command::Timing),
            Some("help") | Some("h") | Some("?") => Ok(Command::Help),
            Some("quit") | Some("exit") | Some("q") => Ok(Command::Quit),
            Some(other) => Err(DbError::InvalidCommand(format!(".{}", other))),
            None => Err(DbError::InvalidCommand(".".into())),
        }
    }
}

/// Non-empty statements of a `;`-separated script, up to the first `.quit`.
fn script_statements(script: &str) -> impl Iterator<Item = &str> {
    script
        .split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .take_while(|stmt| !matches!(Command::parse(stmt), Ok(Command::Quit)))
}

/// The interactive REPL.
pub struct Repl {
    conn: Connection<MemoryAdapter>,
    config: ReplConfig,
    history: Vec<String>,
    fired: Arc<Mutex<Vec<String>>>,
}

impl Repl {
    /// Create a REPL over a fresh in-memory connection.
    pub fn new() -> Self {
        Self::with_config(ReplConfig::default(), InterceptorConfig::default().label("repl"))
    }

    /// Create a REPL with custom configuration.
    pub fn with_config(config: ReplConfig, interceptor: InterceptorConfig) -> Self {
        let conn = Connection::open(MemoryAdapter::new(), InterceptorRegistry::global(), interceptor);
        Self {
            conn,
            config,
            history: Vec::new(),
            fired: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn connection(&self) -> &Connection<MemoryAdapter> {
        &self.conn
    }

    /// Run the REPL interactively.
    pub fn run(&mut self) -> DbResult<()> {
        self.print_banner();

        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("{}", self.config.prompt);
            stdout.flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                println!();
                break;
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match Command::parse(line) {
                Ok(Command::Quit) => break,
                Ok(command) => {
                    self.history.push(line.to_string());
                    let start = std::time::Instant::now();
                    let result = self.apply(command);
                    self.print_fired();
                    match result {
                        Ok(output) => {
                            if !output.is_empty() {
                                println!("{}", output);
                            }
                        }
                        Err(e) => eprintln!("Error: {}", e),
                    }
                    if self.config.timing {
                        println!("Time: {:.3}ms", start.elapsed().as_secs_f64() * 1000.0);
                    }
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    eprintln!("Type .help for available commands");
                }
            }
        }

        Ok(())
    }

    /// Execute `;`-separated statements, stopping at the first error or
    /// at `.quit`.
    pub fn execute_batch(&mut self, script: &str) -> DbResult<Vec<String>> {
        script_statements(script)
            .map(|stmt| self.execute(stmt))
            .collect()
    }

    /// Execute `;`-separated statements, printing as it goes. Stops at the
    /// first error or at `.quit`.
    pub fn run_script(&mut self, script: &str) -> DbResult<()> {
        for stmt in script_statements(script) {
            let start = std::time::Instant::now();
            let result = self.execute(stmt);
            self.print_fired();
            let output = result?;
            if !output.is_empty() {
                println!("{}", output);
            }
            if self.config.timing {
                println!("Time: {:.3}ms", start.elapsed().as_secs_f64() * 1000.0);
            }
        }
        Ok(())
    }

    /// Parse and execute a single statement.
    pub fn execute(&mut self, input: &str) -> DbResult<String> {
        let command = Command::parse(input)?;
        self.history.push(input.trim().to_string());
        self.apply(command)
    }

    /// Hooks fired since the last call, drained.
    pub fn take_fired(&mut self) -> Vec<String> {
        std::mem::take(&mut *self.fired.lock())
    }

    fn apply(&mut self, command: Command) -> DbResult<String> {
        match command {
            Command::Savepoint(name) => {
                self.conn.adapter_mut().create_savepoint(name.clone());
                Ok(format!("SAVEPOINT {}", name))
            }
            Command::Release(name) => {
                self.check_innermost(name.as_deref())?;
                let released = self.conn.release_savepoint()?;
                Ok(format!("RELEASE {}", released))
            }
            Command::RollbackTo(name) => {
                self.check_innermost(name.as_deref())?;
                match self.conn.rollback_to_savepoint()? {
                    Some(name) => Ok(format!("ROLLBACK TO {}", name)),
                    None => Ok("ROLLBACK skipped: scope already committed".to_string()),
                }
            }
            Command::Hook { kind, name, fail } => {
                let fired = self.fired.clone();
                let label = format!("{} {}", kind, name);
                self.conn.register_hook(kind, &name, move || {
                    fired.lock().push(label.clone());
                    match &fail {
                        Some(message) => Err(HookError::new(message.clone())),
                        None => Ok(()),
                    }
                });
                Ok(format!("hook {} registered on {}", name, kind))
            }
            Command::FailRelease(message) => {
                self.conn.adapter_mut().fail_next_release(message);
                Ok("next release will fail".to_string())
            }
            Command::FailRollback(message) => {
                self.conn.adapter_mut().fail_next_rollback(message);
                Ok("next rollback will fail".to_string())
            }
            Command::Begin => {
                self.conn.begin_scope();
                Ok("scope started".to_string())
            }
            Command::Reset => {
                self.conn.reset()?;
                Ok("connection state reset".to_string())
            }
            Command::Status => Ok(serde_json::to_string_pretty(&self.conn.info())?),
            Command::Hooks => Ok(self.describe_hooks()),
            Command::Journal => Ok(self.describe_journal()),
            Command::History => Ok(self
                .history
                .iter()
                .enumerate()
                .map(|(i, cmd)| format!("  {}: {}", i + 1, cmd))
                .collect::<Vec<_>>()
                .join("\n")),
            Command::Timing => {
                self.config.timing = !self.config.timing;
                Ok(format!("Timing: {}", if self.config.timing { "on" } else { "off" }))
            }
            Command::Help => Ok(HELP.trim_end().to_string()),
            Command::Quit => Ok(String::new()),
        }
    }

    fn check_innermost(&self, name: Option<&str>) -> DbResult<()> {
        match (name, self.conn.adapter().current()) {
            (Some(wanted), Some(current)) if wanted != current => Err(DbError::InvalidCommand(
                format!("savepoint {} is not the innermost ({})", wanted, current),
            )),
            _ => Ok(()),
        }
    }

    fn describe_hooks(&self) -> String {
        let hooks = self.conn.hooks();
        if hooks.is_empty() {
            return "No hooks pending.".to_string();
        }
        HookKind::ALL
            .iter()
            .filter(|kind| hooks.len(**kind) > 0)
            .map(|kind| format!("  {:<26} {}", kind.as_str(), hooks.names(*kind).join(", ")))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn describe_journal(&self) -> String {
        let journal = self.conn.adapter().journal();
        if journal.is_empty() {
            return "Journal is empty.".to_string();
        }
        journal
            .iter()
            .map(|entry| {
                format!(
                    "  {} {:<22} {:<12} {}",
                    entry.at.format("%H:%M:%S%.3f"),
                    entry.operation.to_string(),
                    entry.savepoint.as_deref().unwrap_or("-"),
                    if entry.succeeded { "ok" } else { "FAILED" }
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn print_fired(&mut self) {
        let fired = self.take_fired();
        if self.config.echo_hooks {
            for hook in fired {
                println!("  fired {}", hook);
            }
        }
    }

    fn print_banner(&self) {
        println!("aftercommit v{}", env!("CARGO_PKG_VERSION"));
        println!("Savepoint hook simulator. Type .help for commands.");
        println!();
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}

const HELP: &str = "\
Statements:
  SAVEPOINT <name>                 Open a savepoint
  RELEASE [SAVEPOINT] [name]       Release the innermost savepoint (commit hooks)
  ROLLBACK TO [SAVEPOINT] [name]   Roll back the innermost savepoint (rollback hooks)

Commands:
  .hook <kind> <name> [fail <msg>] Register a hook (e.g. after_commit_on_create)
  .fail release|rollback [msg]     Make the next primitive call fail
  .begin                           Start a new top-level scope
  .reset                           Discard connection state
  .status                          Show connection state as JSON
  .hooks                           List pending hooks
  .journal                         Show primitive calls
  .history                         Show command history
  .timing                          Toggle timing display
  .help, .h, .?                    Show this help message
  .quit, .exit, .q                 Exit the REPL
";
