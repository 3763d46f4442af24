//! Burrow - a keyboard-driven PostgreSQL browser for the terminal.
//!
//! Input is read a line at a time. A line starting with `:` is a command,
//! an empty line is Enter, and any other line is a sequence of keys. While
//! an editor (WHERE, ORDER BY or name filter) is open the whole line is its
//! new text.

mod render;

use std::io::Write;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use burrow_core::logging::{init_logging, LogConfig};
use burrow_core::models::SessionOptions;
use burrow_core::services::{self, LastSelection};
use burrow_core::{
    BurrowError, CommandRouter, ConnectionProfile, CoreConfig, CredentialService, Flow, Intent,
    Key, LocalStorage, PgSessionFactory, ProfileStore, QueryOutcome, SelectionPath,
    ViewCoordinator,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Connection to open on startup
    #[arg(long)]
    conn: Option<String>,

    /// Database to open on startup (requires --conn)
    #[arg(long, requires = "conn")]
    db: Option<String>,

    /// Schema to open on startup (requires --db)
    #[arg(long, requires = "db")]
    schema: Option<String>,

    /// Rows per page
    #[arg(long)]
    page_size: Option<usize>,

    /// Server-side statement timeout in milliseconds
    #[arg(long)]
    statement_timeout_ms: Option<u64>,

    /// Log filter, e.g. "burrow_core=trace"
    #[arg(long)]
    log_filter: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Save a connection profile from a postgresql:// URL
    AddConnection {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        /// disable, prefer, require, verify-ca or verify-full
        #[arg(long)]
        tls_mode: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        tracing::error!(category = e.category(), error = %e, "Burrow exited with an error");
        eprintln!("error: {e}");
        if let Some(hint) = e.hint() {
            eprintln!("hint: {hint}");
        }
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), BurrowError> {
    let mut config = CoreConfig::from_env()?;
    if let Some(page_size) = args.page_size {
        config = config.with_page_size(page_size)?;
    }
    if let Some(timeout_ms) = args.statement_timeout_ms {
        config = config.with_statement_timeout_ms(timeout_ms)?;
    }

    let mut log_config = LogConfig::new(config.data_dir.join("logs"));
    if let Some(filter) = &args.log_filter {
        log_config = log_config.with_filter(filter.clone());
    }
    let _logging_guard = init_logging(log_config);

    tracing::info!(data_dir = %config.data_dir.display(), "Starting Burrow");

    let storage = LocalStorage::open(&config.data_dir)?;
    let credentials = Arc::new(CredentialService::new(&config.data_dir));

    if let Some(Command::AddConnection { name, url, tls_mode }) = args.command {
        return add_connection(&storage, &credentials, &name, &url, tls_mode.as_deref());
    }

    let profiles = storage.load_connection_profiles()?;
    if profiles.is_empty() {
        println!("No connections saved. Add one with: burrow add-connection --name NAME --url URL");
    }

    let factory = Arc::new(PgSessionFactory::new(credentials, SessionOptions::from_config(&config)));
    let (mut coordinator, outcomes) = ViewCoordinator::new(&config, profiles, factory);
    coordinator.set_last_query(storage.load_last_query()?);

    let seeds = match args.conn {
        Some(conn) => [Some(conn), args.db, args.schema].into_iter().flatten().collect(),
        None => {
            let last = storage.load_last_selection()?;
            [last.connection, last.database, last.schema].into_iter().flatten().collect()
        }
    };
    coordinator.seed(seeds);

    let result = event_loop(&mut coordinator, outcomes, &storage).await;
    coordinator.shutdown();
    tracing::info!("Burrow stopped");
    result
}

fn add_connection(
    storage: &LocalStorage,
    credentials: &CredentialService,
    name: &str,
    url: &str,
    tls_mode: Option<&str>,
) -> Result<(), BurrowError> {
    let (mut profile, password) = ConnectionProfile::from_url(name, url)?;
    if let Some(mode) = tls_mode {
        profile = profile.with_tls_mode(mode.parse()?);
    }

    services::add_connection(storage, credentials, &profile, &password)?;
    println!("Saved connection '{}' ({})", profile.name, profile.display_url());
    Ok(())
}

async fn event_loop(
    coordinator: &mut ViewCoordinator,
    mut outcomes: mpsc::UnboundedReceiver<QueryOutcome>,
    storage: &LocalStorage,
) -> Result<(), BurrowError> {
    let mut router = CommandRouter::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut remembered = Remembered::new(coordinator.last_query());
    let mut notice: Option<String> = None;

    loop {
        if coordinator.take_dirty() || notice.is_some() {
            draw(coordinator, &router, notice.take().as_deref());
        }

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::debug!("Input closed");
                    return Ok(());
                };
                for step in route_line(&mut router, &line) {
                    match step {
                        Ok(intent) => match coordinator.handle(intent) {
                            Flow::Quit => return Ok(()),
                            Flow::Edit { mode, prefill } => router.open_editor(mode, prefill),
                            Flow::Continue => {}
                        },
                        Err(e) => {
                            tracing::debug!(error = %e, "Input rejected");
                            notice = Some(e.to_string());
                        }
                    }
                }
            }
            Some(outcome) = outcomes.recv() => {
                coordinator.receive_outcome(outcome);
            }
        }

        remembered.save(coordinator, storage);
    }
}

/// Translate one input line into intents, in order.
fn route_line(router: &mut CommandRouter, line: &str) -> Vec<Result<Intent, BurrowError>> {
    if router.is_editing() {
        if line.trim() == "\u{1b}" {
            return router.handle_key(Key::Esc).transpose().into_iter().collect();
        }
        return router.submit_edit(line).map(Ok).into_iter().collect();
    }
    if line.is_empty() {
        return router.handle_key(Key::Enter).transpose().into_iter().collect();
    }

    let mut steps = Vec::new();
    for ch in line.chars() {
        let key = match ch {
            '\u{1b}' => Key::Esc,
            '\u{7f}' | '\u{8}' => Key::Backspace,
            c => Key::Char(c),
        };
        steps.extend(router.handle_key(key).transpose());
        // The editor opens once the coordinator accepts BeginEdit
        if matches!(steps.last(), Some(Ok(Intent::BeginEdit(_)))) {
            break;
        }
    }
    if router.command_line().is_some() {
        steps.extend(router.handle_key(Key::Enter).transpose());
    }
    steps
}

fn draw(coordinator: &ViewCoordinator, router: &CommandRouter, notice: Option<&str>) {
    let screen = render::render(coordinator.view(), router, notice);
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{screen}");
    let _ = stdout.flush();
}

/// Last selection and query as last written to storage.
struct Remembered {
    path: SelectionPath,
    query: String,
}

impl Remembered {
    fn new(query: &str) -> Self {
        Self { path: SelectionPath::new(), query: query.to_string() }
    }

    fn save(&mut self, coordinator: &ViewCoordinator, storage: &LocalStorage) {
        let view = coordinator.view();
        let path = view.path.prefix(3);
        if !path.is_empty() && path != self.path && view.error.is_none() {
            let selection = LastSelection {
                connection: path.connection().map(String::from),
                database: path.database().map(String::from),
                schema: path.schema().map(String::from),
            };
            match storage.save_last_selection(&selection) {
                Ok(()) => self.path = path,
                Err(e) => tracing::warn!(error = %e, "Failed to save last selection"),
            }
        }

        if coordinator.last_query() != self.query {
            match storage.save_last_query(coordinator.last_query()) {
                Ok(()) => self.query = coordinator.last_query().to_string(),
                Err(e) => tracing::warn!(error = %e, "Failed to save last query"),
            }
        }
    }
}
