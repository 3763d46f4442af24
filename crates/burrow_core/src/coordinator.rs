//! The view state machine.
//!
//! `ViewCoordinator` owns the navigation state, the sessions of the active
//! profile and the one-request-per-level slots. Every intent goes through
//! it; every fetch it starts comes back through `receive_outcome`, where
//! anything that is not the latest request for the level on screen is
//! dropped.
//!
//! Local mistakes (a bad transition or argument) become a status message
//! and change nothing. Query failures annotate the current view and keep
//! its data. Connect failures, whether raised while opening a session or
//! delivered by a fetch, close the sessions and return to the connection
//! list.
//!
//! Listings are shown through the name filter of their level. The full
//! listing is kept so a filter change never refetches.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::CoreConfig;
use crate::error::{BurrowError, Failure, Result};
use crate::models::{
    ConnectionProfile, ListEntry, ListingCache, OutcomeData, OutcomeResult, QueryHandle,
    QueryOutcome, QueryRequest, RequestTarget, RowPage,
};
use crate::navigation::{
    AdHocQuery, EditMode, NavigationLevel, NavigationState, RowsQuerySpec, SelectionPath,
};
use crate::router::{Intent, HELP};
use crate::services::catalog;
use crate::services::executor::QueryExecutor;
use crate::services::session::{QuerySession, SessionFactory};
use crate::services::storage::DEFAULT_QUERY;

/// What the screen shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ViewContent {
    #[default]
    Empty,
    Listing { level: NavigationLevel, entries: Vec<ListEntry> },
    Page { level: NavigationLevel, page: RowPage },
}

impl ViewContent {
    /// Number of selectable lines.
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Listing { entries, .. } => entries.len(),
            Self::Page { page, .. } => page.row_count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry_name(&self, index: usize) -> Option<&str> {
        match self {
            Self::Listing { entries, .. } => entries.get(index).map(|e| e.name.as_str()),
            _ => None,
        }
    }
}

/// Snapshot read by the renderer. Mutated only by the coordinator.
#[derive(Debug, Clone)]
pub struct ViewState {
    pub level: NavigationLevel,
    pub path: SelectionPath,
    pub rows_spec: Option<RowsQuerySpec>,
    pub query: Option<AdHocQuery>,
    pub content: ViewContent,
    /// Sequence number of the request whose data is displayed
    pub displayed_sequence: u64,
    pub loading: bool,
    pub error: Option<Failure>,
    /// Transient message for the status line
    pub status: Option<String>,
    /// Selected line, 0-based
    pub cursor: usize,
    pub edit_mode: Option<EditMode>,
    /// Name filter applied to the listing on screen
    pub name_filter: Option<String>,
}

impl ViewState {
    fn new() -> Self {
        Self {
            level: NavigationLevel::Connection,
            path: SelectionPath::new(),
            rows_spec: None,
            query: None,
            content: ViewContent::Empty,
            displayed_sequence: 0,
            loading: false,
            error: None,
            status: None,
            cursor: 0,
            edit_mode: None,
            name_filter: None,
        }
    }
}

/// What the event loop should do after an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// An editor was opened with this prefill
    Edit { mode: EditMode, prefill: String },
    Quit,
}

/// Latest request issued for a level.
#[derive(Debug, Default)]
struct Slot {
    sequence: u64,
    handle: Option<QueryHandle>,
}

pub struct ViewCoordinator {
    profiles: Vec<ConnectionProfile>,
    factory: Arc<dyn SessionFactory>,
    executor: QueryExecutor,
    outcome_tx: mpsc::UnboundedSender<QueryOutcome>,
    nav: NavigationState,
    view: ViewState,
    slots: HashMap<NavigationLevel, Slot>,
    last_sequence: u64,
    active_profile: Option<ConnectionProfile>,
    /// Lists databases; absent for profiles restricted to one database
    server_session: Option<Arc<dyn QuerySession>>,
    /// Serves every level below the database list
    database_session: Option<Arc<dyn QuerySession>>,
    cache: ListingCache,
    /// Unfiltered entries of the listing on screen
    listing: Vec<ListEntry>,
    seeds: VecDeque<String>,
    last_query: String,
    dirty: bool,
}

impl ViewCoordinator {
    /// Create the coordinator and the receiver its outcomes arrive on.
    pub fn new(
        config: &CoreConfig,
        profiles: Vec<ConnectionProfile>,
        factory: Arc<dyn SessionFactory>,
    ) -> (Self, mpsc::UnboundedReceiver<QueryOutcome>) {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let mut coordinator = Self {
            profiles,
            factory,
            executor: QueryExecutor::new(config.statement_timeout()),
            outcome_tx,
            nav: NavigationState::new(config.page_size),
            view: ViewState::new(),
            slots: HashMap::new(),
            last_sequence: 0,
            active_profile: None,
            server_session: None,
            database_session: None,
            cache: ListingCache::with_ttl(config.cache_ttl()),
            listing: Vec::new(),
            seeds: VecDeque::new(),
            last_query: DEFAULT_QUERY.to_string(),
            dirty: true,
        };
        coordinator.show_profiles();
        (coordinator, outcome_rx)
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn navigation(&self) -> &NavigationState {
        &self.nav
    }

    pub fn last_query(&self) -> &str {
        &self.last_query
    }

    pub fn set_last_query(&mut self, sql: impl Into<String>) {
        self.last_query = sql.into();
    }

    /// Whether the view changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Descend through `names` (connection, database, schema) as each
    /// listing loads.
    pub fn seed(&mut self, names: Vec<String>) {
        self.seeds = names.into_iter().filter(|n| !n.is_empty()).collect();
        self.apply_next_seed();
    }

    /// Apply an intent. Errors become status or error banners here.
    pub fn handle(&mut self, intent: Intent) -> Flow {
        tracing::debug!(?intent, level = %self.nav.level(), "Handling intent");
        self.view.status = None;
        self.dirty = true;

        let result = match intent {
            Intent::Quit => {
                self.shutdown();
                return Flow::Quit;
            }
            Intent::ShowHelp => {
                self.view.status = Some(HELP.to_string());
                Ok(())
            }
            Intent::BeginEdit(mode) => match self.nav.begin_edit(mode) {
                Ok(prefill) => {
                    self.sync_view();
                    return Flow::Edit { mode, prefill };
                }
                Err(e) => Err(e),
            },
            Intent::CancelEdit => {
                self.nav.end_edit();
                Ok(())
            }
            Intent::ApplyFilterOrSort { mode, text } => self.apply_filter_or_sort(mode, text),
            Intent::Select => self.select(),
            Intent::NavigateUp => self.navigate_up(),
            Intent::MoveCursor(delta) => {
                self.move_cursor(delta);
                Ok(())
            }
            Intent::JumpToRow(row) => {
                self.jump_to_row(row);
                Ok(())
            }
            Intent::ChangePage(delta) => self.change_page(delta),
            Intent::SetPageSize(size) => self.set_page_size(size),
            Intent::FocusLevel(level) => self.focus_level(level),
            Intent::RunAdHocQuery(sql) => self.run_adhoc_query(sql),
            Intent::Refresh => self.refresh(),
            Intent::CancelLoad => {
                self.cancel_load();
                Ok(())
            }
        };

        if let Err(e) = result {
            self.report(e);
        }
        self.sync_view();
        Flow::Continue
    }

    /// Select `name` in the current listing and descend.
    pub fn navigate_into(&mut self, name: &str) -> Result<()> {
        if self.nav.edit_mode().is_some() {
            return Err(BurrowError::invalid_transition("Finish editing before navigating"));
        }
        let from = self.nav.level();
        let child = from
            .child()
            .ok_or_else(|| BurrowError::invalid_transition(format!("Nothing to open from {from}")))?;

        match child {
            NavigationLevel::Database => {
                let profile = self
                    .profiles
                    .iter()
                    .find(|p| p.name == name)
                    .cloned()
                    .ok_or_else(|| {
                        BurrowError::invalid_argument(format!("Connection not found: {name}"))
                    })?;
                self.close_sessions();
                if !profile.is_restricted() {
                    self.server_session = Some(self.factory.open(&profile, None)?);
                }
                self.nav.push(child, name)?;
                tracing::info!(profile = %profile.name, "Connection selected");
                self.active_profile = Some(profile);
            }
            NavigationLevel::Schema => {
                let profile = self
                    .active_profile
                    .as_ref()
                    .ok_or_else(|| BurrowError::internal("No active connection"))?;
                let session = self.factory.open(profile, Some(name))?;
                self.nav.push(child, name)?;
                if let Some(old) = self.database_session.replace(session) {
                    old.close();
                }
            }
            _ => self.nav.push(child, name)?,
        }

        self.cancel_slot(from);
        self.view.error = None;
        self.view.cursor = 0;
        self.view.content = ViewContent::Empty;
        self.show_current(false)
    }

    /// Go back one level. On a filtered listing the filter is cleared
    /// instead.
    pub fn navigate_up(&mut self) -> Result<()> {
        let level = self.nav.level();
        if !level.is_paged() && self.nav.name_filter(level).is_some() {
            self.apply_name_filter(None)?;
            self.view.status = Some("Filter cleared".to_string());
            return Ok(());
        }
        let target = match self.nav.level() {
            NavigationLevel::Query => self.nav.query_parent(),
            level => level.parent(),
        }
        .ok_or_else(|| BurrowError::invalid_transition("Already at the connection list"))?;
        self.ascend_to(target)
    }

    /// Take the delivered outcome into the view if it is still current.
    /// Returns whether the view changed.
    pub fn receive_outcome(&mut self, outcome: QueryOutcome) -> bool {
        let latest = self.slots.get(&outcome.level).map(|slot| slot.sequence);
        if latest != Some(outcome.sequence) || outcome.level != self.nav.level() {
            tracing::debug!(
                sequence = outcome.sequence,
                level = %outcome.level,
                latest = ?latest,
                "Discarding stale outcome"
            );
            return false;
        }
        if let Some(slot) = self.slots.get_mut(&outcome.level) {
            slot.handle = None;
        }

        self.view.loading = false;
        self.dirty = true;
        if outcome.reconnected {
            self.cache.clear();
            self.view.status = Some("Reconnected".to_string());
        }

        match outcome.result {
            OutcomeResult::Success(OutcomeData::Listing(entries)) => {
                self.cache.insert(outcome.level, self.nav.path().clone(), entries.clone());
                self.show_listing(outcome.level, entries, outcome.sequence);
                self.apply_next_seed();
            }
            OutcomeResult::Success(OutcomeData::Page(page)) => {
                self.nav.record_page(page.page_index, page.has_more);
                self.view.content = ViewContent::Page { level: outcome.level, page };
                self.view.displayed_sequence = outcome.sequence;
                self.view.error = None;
                self.clamp_cursor();
            }
            OutcomeResult::Failure(failure) if failure.is_connect() => {
                tracing::warn!(error = %failure, "Connection failed, returning to connection list");
                self.disconnect();
                self.view.error = Some(failure);
            }
            OutcomeResult::Failure(failure) => {
                self.seeds.clear();
                self.view.error = Some(failure);
            }
            OutcomeResult::Cancelled => {
                tracing::debug!(sequence = outcome.sequence, "Load cancelled");
            }
        }

        self.sync_view();
        true
    }

    /// Cancel everything and close the sessions.
    pub fn shutdown(&mut self) {
        self.cancel_all();
        self.close_sessions();
    }

    fn select(&mut self) -> Result<()> {
        let level = self.nav.level();
        if level.child().is_none() {
            return Err(BurrowError::invalid_transition(format!("Nothing to open from {level}")));
        }
        let name = self
            .view
            .content
            .entry_name(self.view.cursor)
            .map(String::from)
            .ok_or_else(|| BurrowError::invalid_transition("Nothing selected"))?;
        self.navigate_into(&name)
    }

    fn apply_filter_or_sort(&mut self, mode: EditMode, text: Option<String>) -> Result<()> {
        self.nav.end_edit();
        let changed = match mode {
            EditMode::Where => self.nav.set_filter(text)?,
            EditMode::OrderBy => self.nav.set_sort(text)?,
            EditMode::Filter => return self.apply_name_filter(text),
        };
        if !changed {
            self.view.status = Some(format!("{} unchanged", mode.label()));
            return Ok(());
        }
        self.show_current(false)
    }

    fn apply_name_filter(&mut self, text: Option<String>) -> Result<()> {
        if !self.nav.set_name_filter(text)? {
            self.view.status = Some(format!("{} unchanged", EditMode::Filter.label()));
            return Ok(());
        }
        let level = self.nav.level();
        let showing = matches!(
            self.view.content,
            ViewContent::Listing { level: shown, .. } if shown == level
        );
        if showing {
            let entries = filter_entries(&self.listing, self.nav.name_filter(level));
            self.view.content = ViewContent::Listing { level, entries };
            self.view.cursor = 0;
        }
        Ok(())
    }

    fn change_page(&mut self, delta: i64) -> Result<()> {
        if self.nav.change_page(delta)? {
            self.show_current(false)?;
        }
        Ok(())
    }

    fn set_page_size(&mut self, page_size: usize) -> Result<()> {
        self.nav.set_page_size(page_size)?;
        self.view.status = Some(format!("Page size {page_size}"));
        if self.nav.level().is_paged() {
            self.show_current(false)?;
        }
        Ok(())
    }

    fn focus_level(&mut self, level: NavigationLevel) -> Result<()> {
        if level == NavigationLevel::Query {
            let sql = self.last_query.clone();
            return self.run_adhoc_query(sql);
        }
        let current = self.nav.level();
        let effective = match current {
            NavigationLevel::Query => self.nav.query_parent().unwrap_or(NavigationLevel::Connection),
            other => other,
        };
        if current == level {
            return Ok(());
        }
        if level.depth() > effective.depth() {
            return Err(BurrowError::invalid_transition(format!(
                "Cannot focus {level} from {current}"
            )));
        }
        self.ascend_to(level)
    }

    fn run_adhoc_query(&mut self, sql: String) -> Result<()> {
        if catalog::normalize_query_text(&sql).is_empty() {
            return Err(BurrowError::invalid_argument("Query text is empty"));
        }
        if self.nav.level() != NavigationLevel::Query {
            self.cancel_slot(self.nav.level());
        }
        self.nav.enter_query(sql.clone())?;
        self.last_query = sql;
        self.view.error = None;
        self.view.cursor = 0;
        self.show_current(false)
    }

    fn refresh(&mut self) -> Result<()> {
        if self.nav.level() == NavigationLevel::Connection {
            self.show_profiles();
            return Ok(());
        }
        self.cache.invalidate(self.nav.path());
        self.show_current(false)
    }

    fn cancel_load(&mut self) {
        let level = self.nav.level();
        match self.slots.get(&level).and_then(|slot| slot.handle.as_ref()) {
            Some(handle) => {
                self.executor.cancel(handle);
                self.view.status = Some("Cancelling".to_string());
            }
            None => self.view.status = Some("Nothing to cancel".to_string()),
        }
    }

    fn move_cursor(&mut self, delta: i64) {
        let len = self.view.content.len();
        if len == 0 {
            return;
        }
        let cursor = (self.view.cursor as i64).saturating_add(delta);
        self.view.cursor = cursor.clamp(0, len as i64 - 1) as usize;
    }

    /// Jump to a 1-based line, clamped to what is loaded.
    fn jump_to_row(&mut self, row: Option<usize>) {
        let len = self.view.content.len();
        if len == 0 {
            return;
        }
        self.view.cursor = row.unwrap_or(len).clamp(1, len) - 1;
    }

    fn ascend_to(&mut self, target: NavigationLevel) -> Result<()> {
        while self.nav.level() != target {
            let from = self.nav.level();
            self.cancel_slot(from);
            self.nav.pop()?;
        }

        let depth = self.nav.path().len();
        if depth < 2 {
            if let Some(session) = self.database_session.take() {
                session.close();
            }
        }
        if depth == 0 {
            self.cancel_all();
            self.close_sessions();
            self.active_profile = None;
        }

        self.view.error = None;
        self.view.cursor = 0;
        self.show_current(true)
    }

    /// Display the current level, from the cache when allowed, otherwise by
    /// issuing a request.
    fn show_current(&mut self, use_cache: bool) -> Result<()> {
        let level = self.nav.level();
        let target = match level {
            NavigationLevel::Connection => {
                self.show_profiles();
                return Ok(());
            }
            NavigationLevel::Database => match self.restricted_database() {
                Some(dbname) => {
                    let sequence = self.claim_slot(level);
                    self.show_listing(level, vec![ListEntry::new(dbname)], sequence);
                    self.apply_next_seed();
                    return Ok(());
                }
                None => RequestTarget::Databases,
            },
            NavigationLevel::Schema => RequestTarget::Schemas,
            NavigationLevel::Table => RequestTarget::Tables {
                schema: self.nav.path().schema().unwrap_or_default().to_string(),
            },
            NavigationLevel::Rows => RequestTarget::Rows(
                self.nav
                    .rows_spec()
                    .cloned()
                    .ok_or_else(|| BurrowError::internal("Rows level without a rows spec"))?,
            ),
            NavigationLevel::Query => RequestTarget::AdHoc(
                self.nav
                    .query()
                    .cloned()
                    .ok_or_else(|| BurrowError::internal("Query level without a query"))?,
            ),
        };

        if use_cache && !level.is_paged() {
            if let Some(entries) = self.cache.get(level, self.nav.path()).map(<[_]>::to_vec) {
                tracing::debug!(level = %level, path = %self.nav.path(), "Listing cache hit");
                let sequence = self.claim_slot(level);
                self.show_listing(level, entries, sequence);
                return Ok(());
            }
        }

        self.issue(level, target)
    }

    /// Start a request for `level`, cancelling the one it replaces.
    fn issue(&mut self, level: NavigationLevel, target: RequestTarget) -> Result<()> {
        let session = match level {
            NavigationLevel::Database => self.server_session.clone(),
            _ => self.database_session.clone(),
        }
        .ok_or_else(|| BurrowError::internal(format!("No open session for {level}")))?;

        let sequence = self.claim_slot(level);
        let request =
            QueryRequest { sequence, level, path: self.nav.path().clone(), target };
        let handle = self.executor.start(session, request, self.outcome_tx.clone());
        if let Some(slot) = self.slots.get_mut(&level) {
            slot.handle = Some(handle);
        }
        self.view.loading = true;
        Ok(())
    }

    /// Cancel the slot's request and give it a fresh sequence number.
    fn claim_slot(&mut self, level: NavigationLevel) -> u64 {
        self.cancel_slot(level);
        self.last_sequence += 1;
        let slot = self.slots.entry(level).or_default();
        slot.sequence = self.last_sequence;
        self.last_sequence
    }

    fn cancel_slot(&mut self, level: NavigationLevel) {
        if let Some(handle) = self.slots.get_mut(&level).and_then(|slot| slot.handle.take()) {
            self.executor.cancel(&handle);
        }
        if level == self.nav.level() {
            self.view.loading = false;
        }
    }

    fn cancel_all(&mut self) {
        for slot in self.slots.values_mut() {
            if let Some(handle) = slot.handle.take() {
                self.executor.cancel(&handle);
            }
        }
        self.view.loading = false;
    }

    fn show_listing(&mut self, level: NavigationLevel, entries: Vec<ListEntry>, sequence: u64) {
        let shown = filter_entries(&entries, self.nav.name_filter(level));
        self.listing = entries;
        self.view.content = ViewContent::Listing { level, entries: shown };
        self.view.displayed_sequence = sequence;
        self.view.loading = false;
        self.view.error = None;
        self.clamp_cursor();
    }

    fn show_profiles(&mut self) {
        let entries = self
            .profiles
            .iter()
            .map(|p| ListEntry::with_detail(p.name.clone(), p.display_url()))
            .collect();
        let sequence = self.claim_slot(NavigationLevel::Connection);
        self.show_listing(NavigationLevel::Connection, entries, sequence);
    }

    fn restricted_database(&self) -> Option<String> {
        self.active_profile.as_ref().and_then(|p| p.dbname.clone())
    }

    /// Back to the connection list after the session became unusable.
    fn disconnect(&mut self) {
        self.seeds.clear();
        self.cancel_all();
        self.close_sessions();
        self.active_profile = None;
        self.cache.clear();
        self.nav.reset();
        self.view.cursor = 0;
        self.show_profiles();
    }

    fn close_sessions(&mut self) {
        for session in [self.database_session.take(), self.server_session.take()].into_iter().flatten() {
            session.close();
        }
    }

    fn apply_next_seed(&mut self) {
        let ViewContent::Listing { level, entries } = &self.view.content else {
            return;
        };
        if *level != self.nav.level() {
            return;
        }
        let Some(name) = self.seeds.pop_front() else {
            return;
        };

        match entries.iter().position(|e| e.name == name) {
            Some(index) => {
                self.view.cursor = index;
                if let Err(e) = self.navigate_into(&name) {
                    self.seeds.clear();
                    self.report(e);
                }
            }
            None => {
                let what = match level {
                    NavigationLevel::Connection => "Connection",
                    NavigationLevel::Database => "Database",
                    _ => "Schema",
                };
                tracing::warn!(name = %name, level = %level, "Startup selection not found");
                self.view.status = Some(format!("{what} not found: {name}"));
                self.seeds.clear();
            }
        }
    }

    fn report(&mut self, err: BurrowError) {
        if err.is_local() {
            tracing::debug!(error = %err, "Rejected");
            self.view.status = Some(err.to_string());
        } else if matches!(err, BurrowError::Connect { .. }) {
            tracing::warn!(error = %err, "Connection failed, returning to connection list");
            self.disconnect();
            self.view.error = Some(err.to_failure());
        } else {
            tracing::warn!(category = err.category(), error = %err, "Intent failed");
            self.view.error = Some(err.to_failure());
        }
    }

    fn clamp_cursor(&mut self) {
        let len = self.view.content.len();
        self.view.cursor = self.view.cursor.min(len.saturating_sub(1));
    }

    fn sync_view(&mut self) {
        self.view.level = self.nav.level();
        self.view.path = self.nav.path().clone();
        self.view.rows_spec = self.nav.rows_spec().cloned();
        self.view.query = self.nav.query().cloned();
        self.view.edit_mode = self.nav.edit_mode();
        self.view.name_filter = match self.view.content {
            ViewContent::Listing { level, .. } => self.nav.name_filter(level).map(String::from),
            _ => None,
        };
        self.dirty = true;
    }
}

/// Entries whose name contains `filter`, ignoring case.
fn filter_entries(entries: &[ListEntry], filter: Option<&str>) -> Vec<ListEntry> {
    match filter {
        Some(filter) => {
            let needle = filter.to_lowercase();
            entries.iter().filter(|e| e.name.to_lowercase().contains(&needle)).cloned().collect()
        }
        None => entries.to_vec(),
    }
}

impl std::fmt::Debug for ViewCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewCoordinator")
            .field("level", &self.nav.level())
            .field("path", self.nav.path())
            .field("last_sequence", &self.last_sequence)
            .finish()
    }
}
