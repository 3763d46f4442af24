//! Turns key presses and `:command` lines into typed intents.
//!
//! The router only tracks input state: a pending numeric count, a pending
//! `g`, the command line being typed and the open editor buffer (WHERE,
//! ORDER BY or listing name filter). It never touches navigation; the coordinator validates every
//! intent it produces.

use crate::config::MAX_PAGE_SIZE;
use crate::error::{BurrowError, Result};
use crate::navigation::{EditMode, NavigationLevel};

/// Something the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    FocusLevel(NavigationLevel),
    SetPageSize(usize),
    RunAdHocQuery(String),
    Quit,
    ShowHelp,
    Refresh,
    CancelLoad,
    MoveCursor(i64),
    /// Descend into the entry under the cursor
    Select,
    NavigateUp,
    ChangePage(i64),
    /// 1-based row on the current page; `None` is the last row
    JumpToRow(Option<usize>),
    BeginEdit(EditMode),
    /// Submit an editor. `None` or blank text clears the clause.
    ApplyFilterOrSort { mode: EditMode, text: Option<String> },
    CancelEdit,
}

/// A key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Esc,
    Backspace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputMode {
    Normal,
    Command(String),
    Edit { mode: EditMode, buffer: String },
}

/// Commands listed by `:help`.
pub const HELP: &str = "\
:q quit  :r refresh  :cancel  :sql <query>  :pagesize <n>  \
:conn :db :schema :table :rows :query  |  \
j/k move  enter open  h/esc back  n/p page  w WHERE  o ORDER BY  / filter  [n]G gg jump";

#[derive(Debug)]
pub struct CommandRouter {
    mode: InputMode,
    count: Option<usize>,
    pending_g: bool,
}

impl Default for CommandRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRouter {
    pub fn new() -> Self {
        Self { mode: InputMode::Normal, count: None, pending_g: false }
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.mode, InputMode::Edit { .. })
    }

    /// The open editor and its current text.
    pub fn editor(&self) -> Option<(EditMode, &str)> {
        match &self.mode {
            InputMode::Edit { mode, buffer } => Some((*mode, buffer.as_str())),
            _ => None,
        }
    }

    /// The command line being typed, without the leading `:`.
    pub fn command_line(&self) -> Option<&str> {
        match &self.mode {
            InputMode::Command(buffer) => Some(buffer),
            _ => None,
        }
    }

    /// Open an editor once the coordinator accepted `BeginEdit`.
    pub fn open_editor(&mut self, mode: EditMode, prefill: impl Into<String>) {
        self.reset_prefix();
        self.mode = InputMode::Edit { mode, buffer: prefill.into() };
    }

    /// Drop whatever editor or command line is open.
    pub fn close(&mut self) {
        self.reset_prefix();
        self.mode = InputMode::Normal;
    }

    /// Replace the editor text with `text` and submit it.
    pub fn submit_edit(&mut self, text: &str) -> Option<Intent> {
        let InputMode::Edit { mode, .. } = self.mode else {
            return None;
        };
        self.mode = InputMode::Normal;
        Some(Intent::ApplyFilterOrSort { mode, text: Some(text.to_string()) })
    }

    pub fn handle_key(&mut self, key: Key) -> Result<Option<Intent>> {
        match std::mem::replace(&mut self.mode, InputMode::Normal) {
            InputMode::Normal => Ok(self.normal_key(key)),
            InputMode::Command(mut buffer) => match key {
                Key::Enter => self.handle_command_line(&buffer).map(Some),
                Key::Esc => Ok(None),
                Key::Backspace => {
                    if buffer.pop().is_some() {
                        self.mode = InputMode::Command(buffer);
                    }
                    Ok(None)
                }
                Key::Char(c) => {
                    buffer.push(c);
                    self.mode = InputMode::Command(buffer);
                    Ok(None)
                }
            },
            InputMode::Edit { mode, mut buffer } => match key {
                Key::Enter => Ok(Some(Intent::ApplyFilterOrSort { mode, text: Some(buffer) })),
                Key::Esc => Ok(Some(Intent::CancelEdit)),
                Key::Backspace => {
                    buffer.pop();
                    self.mode = InputMode::Edit { mode, buffer };
                    Ok(None)
                }
                Key::Char(c) => {
                    buffer.push(c);
                    self.mode = InputMode::Edit { mode, buffer };
                    Ok(None)
                }
            },
        }
    }

    fn normal_key(&mut self, key: Key) -> Option<Intent> {
        let count = self.count.take();
        let pending_g = std::mem::take(&mut self.pending_g);
        let steps = i64::try_from(count.unwrap_or(1)).unwrap_or(i64::MAX);

        match key {
            Key::Char(c @ '0'..='9') if c != '0' || count.is_some() => {
                let digit = c as usize - '0' as usize;
                self.count = Some(count.unwrap_or(0).saturating_mul(10).saturating_add(digit));
                None
            }
            Key::Char('g') if pending_g => Some(Intent::JumpToRow(Some(1))),
            Key::Char('g') => {
                self.pending_g = true;
                self.count = count;
                None
            }
            Key::Char('G') => Some(Intent::JumpToRow(count)),
            Key::Char('j') => Some(Intent::MoveCursor(steps)),
            Key::Char('k') => Some(Intent::MoveCursor(-steps)),
            Key::Char('n') => Some(Intent::ChangePage(steps)),
            Key::Char('p') => Some(Intent::ChangePage(-steps)),
            Key::Char('w') => Some(Intent::BeginEdit(EditMode::Where)),
            Key::Char('o') => Some(Intent::BeginEdit(EditMode::OrderBy)),
            Key::Char('/') => Some(Intent::BeginEdit(EditMode::Filter)),
            Key::Char('h') | Key::Esc => Some(Intent::NavigateUp),
            Key::Enter => Some(Intent::Select),
            Key::Char(':') => {
                self.mode = InputMode::Command(String::new());
                None
            }
            _ => None,
        }
    }

    /// Parse a full `:command` line. The leading `:` is optional.
    pub fn handle_command_line(&mut self, line: &str) -> Result<Intent> {
        self.close();
        parse_command(line)
    }

    fn reset_prefix(&mut self) {
        self.count = None;
        self.pending_g = false;
    }
}

/// Parse `[:]command [args]`.
pub fn parse_command(line: &str) -> Result<Intent> {
    let line = line.trim();
    let line = line.strip_prefix(':').unwrap_or(line).trim();
    let (command, args) = match line.split_once(char::is_whitespace) {
        Some((command, args)) => (command, args.trim()),
        None => (line, ""),
    };

    if command.is_empty() {
        return Err(BurrowError::invalid_argument("Empty command"));
    }

    let intent = match command.to_ascii_lowercase().as_str() {
        "q" | "q!" | "quit" | "exit" => Intent::Quit,
        "help" | "?" | "halp" => Intent::ShowHelp,
        "refresh" | "r" => Intent::Refresh,
        "cancel" => Intent::CancelLoad,
        "pagesize" | "perpage" => Intent::SetPageSize(parse_page_size(args)?),
        "sql" | "query" if !args.is_empty() => Intent::RunAdHocQuery(args.to_string()),
        "sql" | "query" => Intent::FocusLevel(NavigationLevel::Query),
        other => {
            let level = focus_alias(other).ok_or_else(|| BurrowError::unknown_command(command))?;
            if !args.is_empty() {
                return Err(BurrowError::invalid_argument(format!(
                    ":{command} takes no arguments"
                )));
            }
            Intent::FocusLevel(level)
        }
    };
    Ok(intent)
}

fn focus_alias(command: &str) -> Option<NavigationLevel> {
    match command {
        "connection" | "connections" | "conn" => Some(NavigationLevel::Connection),
        "db" | "database" | "databases" => Some(NavigationLevel::Database),
        "schema" | "schemas" => Some(NavigationLevel::Schema),
        "table" | "tables" => Some(NavigationLevel::Table),
        "rows" | "data" => Some(NavigationLevel::Rows),
        _ => None,
    }
}

fn parse_page_size(args: &str) -> Result<usize> {
    match args.parse::<i64>() {
        Ok(n) if n <= 0 => Err(BurrowError::invalid_argument(format!(
            "Page size must be greater than 0, got {n}"
        ))),
        Ok(n) => match usize::try_from(n) {
            Ok(size) if size <= MAX_PAGE_SIZE => Ok(size),
            _ => Err(BurrowError::invalid_argument(format!(
                "Page size must be at most {MAX_PAGE_SIZE}, got {n}"
            ))),
        },
        Err(_) => Err(BurrowError::invalid_argument(format!(
            "Page size must be a number, got '{args}'"
        ))),
    }
}
