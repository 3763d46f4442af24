//! Stack-structured view model: connection → database → schema → table → rows.
//!
//! `NavigationState` is the authority for what should be displayed. It never
//! talks to the database; the coordinator reads it to build requests and
//! mutates it through the operations below.

use std::fmt;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::MAX_PAGE_SIZE;
use crate::error::{BurrowError, Result};

/// A screen in the navigation hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NavigationLevel {
    /// Saved connection profiles
    Connection,
    /// Databases of the selected connection
    Database,
    /// Schemas of the selected database
    Schema,
    /// Tables of the selected schema
    Table,
    /// A page of rows from the selected table
    Rows,
    /// A page of an ad-hoc query result, layered over the hierarchy
    Query,
}

impl NavigationLevel {
    /// Levels in descent order.
    pub const HIERARCHY: [NavigationLevel; 5] =
        [Self::Connection, Self::Database, Self::Schema, Self::Table, Self::Rows];

    /// Number of selections needed to display this level. `None` for `Query`,
    /// which sits on top of whatever level it was opened from.
    pub fn depth(self) -> Option<usize> {
        Self::HIERARCHY.iter().position(|l| *l == self)
    }

    /// The level whose listing is selected from to reach `self`.
    pub fn parent(self) -> Option<Self> {
        match self.depth() {
            Some(d) if d > 0 => Some(Self::HIERARCHY[d - 1]),
            _ => None,
        }
    }

    /// The level reached by selecting an entry here.
    pub fn child(self) -> Option<Self> {
        self.depth().and_then(|d| Self::HIERARCHY.get(d + 1).copied())
    }

    /// Whether this level shows a page of rows rather than a name listing.
    pub fn is_paged(self) -> bool {
        matches!(self, Self::Rows | Self::Query)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connections",
            Self::Database => "databases",
            Self::Schema => "schemas",
            Self::Table => "tables",
            Self::Rows => "rows",
            Self::Query => "query",
        }
    }
}

impl fmt::Display for NavigationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifiers chosen at each level, connection first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionPath(Vec<String>);

impl SelectionPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn connection(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn database(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }

    pub fn schema(&self) -> Option<&str> {
        self.0.get(2).map(String::as_str)
    }

    pub fn table(&self) -> Option<&str> {
        self.0.get(3).map(String::as_str)
    }

    /// The first `len` segments.
    pub fn prefix(&self, len: usize) -> SelectionPath {
        Self(self.0.iter().take(len).cloned().collect())
    }

    fn push(&mut self, id: String) {
        self.0.push(id);
    }

    fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }
}

impl fmt::Display for SelectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" > "))
    }
}

/// What to fetch at the Rows level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowsQuerySpec {
    pub schema: String,
    pub table: String,
    /// Raw WHERE fragment typed by the user
    pub where_clause: Option<String>,
    /// Raw ORDER BY fragment typed by the user
    pub order_by: Option<String>,
    /// Always > 0
    pub page_size: usize,
    /// 0-based
    pub page_index: usize,
}

impl RowsQuerySpec {
    pub fn new(schema: impl Into<String>, table: impl Into<String>, page_size: usize) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            where_clause: None,
            order_by: None,
            page_size,
            page_index: 0,
        }
    }

    /// Rows skipped before this page. Fails when it does not fit a SQL bigint.
    pub fn offset(&self) -> Result<i64> {
        page_offset(self.page_index, self.page_size)
    }
}

/// What to fetch at the Query level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdHocQuery {
    pub sql: String,
    pub page_size: usize,
    pub page_index: usize,
}

impl AdHocQuery {
    pub fn offset(&self) -> Result<i64> {
        page_offset(self.page_index, self.page_size)
    }
}

fn page_offset(page_index: usize, page_size: usize) -> Result<i64> {
    page_index
        .checked_mul(page_size)
        .and_then(|offset| i64::try_from(offset).ok())
        .ok_or_else(|| {
            BurrowError::invalid_argument(format!(
                "Page {} is out of range",
                page_index.saturating_add(1)
            ))
        })
}

/// Which text an inline editor is changing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditMode {
    Where,
    OrderBy,
    /// Name filter of a listing level
    Filter,
}

impl EditMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Where => "WHERE",
            Self::OrderBy => "ORDER BY",
            Self::Filter => "FILTER",
        }
    }
}

/// The navigation stack and the rows framing at its top.
#[derive(Debug, Clone)]
pub struct NavigationState {
    level: NavigationLevel,
    path: SelectionPath,
    rows: Option<RowsQuerySpec>,
    query: Option<AdHocQuery>,
    /// Level the Query view was opened from
    query_parent: Option<NavigationLevel>,
    page_size: usize,
    /// Last page index, once a page came back without more rows behind it
    last_page: Option<usize>,
    edit: Option<EditMode>,
    /// Name filter per listing level
    name_filters: HashMap<NavigationLevel, String>,
}

impl NavigationState {
    pub fn new(page_size: usize) -> Self {
        Self {
            level: NavigationLevel::Connection,
            path: SelectionPath::new(),
            rows: None,
            query: None,
            query_parent: None,
            page_size: page_size.max(1),
            last_page: None,
            edit: None,
            name_filters: HashMap::new(),
        }
    }

    pub fn level(&self) -> NavigationLevel {
        self.level
    }

    pub fn path(&self) -> &SelectionPath {
        &self.path
    }

    pub fn rows_spec(&self) -> Option<&RowsQuerySpec> {
        self.rows.as_ref()
    }

    pub fn query(&self) -> Option<&AdHocQuery> {
        self.query.as_ref()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn edit_mode(&self) -> Option<EditMode> {
        self.edit
    }

    pub fn last_page(&self) -> Option<usize> {
        self.last_page
    }

    /// Name filter of a listing level, if one is set.
    pub fn name_filter(&self, level: NavigationLevel) -> Option<&str> {
        self.name_filters.get(&level).map(String::as_str)
    }

    /// Level the Query view returns to.
    pub fn query_parent(&self) -> Option<NavigationLevel> {
        self.query_parent
    }

    /// Page index of the current paged view.
    pub fn page_index(&self) -> Option<usize> {
        match self.level {
            NavigationLevel::Rows => self.rows.as_ref().map(|r| r.page_index),
            NavigationLevel::Query => self.query.as_ref().map(|q| q.page_index),
            _ => None,
        }
    }

    /// Select `id` in the current listing, descending to `level`.
    pub fn push(&mut self, level: NavigationLevel, id: impl Into<String>) -> Result<()> {
        let id = id.into();
        if self.edit.is_some() {
            return Err(BurrowError::invalid_transition("Finish editing before navigating"));
        }
        if self.level.child() != Some(level) {
            return Err(BurrowError::invalid_transition(format!(
                "Cannot open {level} from {}",
                self.level
            )));
        }
        if id.is_empty() {
            return Err(BurrowError::invalid_argument("Selection must not be empty"));
        }

        if level == NavigationLevel::Rows {
            let schema = self.path.schema().unwrap_or_default().to_string();
            self.rows = Some(RowsQuerySpec::new(schema, id.clone(), self.page_size));
            self.last_page = None;
        }
        self.path.push(id);
        self.level = level;
        Ok(())
    }

    /// Return to the parent level, dropping everything below it.
    pub fn pop(&mut self) -> Result<NavigationLevel> {
        self.edit = None;
        self.last_page = None;

        if self.level == NavigationLevel::Query {
            self.query = None;
            self.level = self.query_parent.take().unwrap_or(NavigationLevel::Connection);
            self.path.truncate(self.level.depth().unwrap_or(0));
            return Ok(self.level);
        }

        let parent = self
            .level
            .parent()
            .ok_or_else(|| BurrowError::invalid_transition("Already at the connection list"))?;
        self.rows = None;
        self.path.truncate(parent.depth().unwrap_or(0));
        self.level = parent;
        Ok(parent)
    }

    /// Drop back to the connection list. Name filters are kept.
    pub fn reset(&mut self) {
        let name_filters = std::mem::take(&mut self.name_filters);
        *self = Self::new(self.page_size);
        self.name_filters = name_filters;
    }

    /// Open the ad-hoc query view over the current level.
    pub fn enter_query(&mut self, sql: impl Into<String>) -> Result<()> {
        if self.path.database().is_none() {
            return Err(BurrowError::invalid_transition("Select a database before running a query"));
        }
        if self.edit.is_some() {
            return Err(BurrowError::invalid_transition("Finish editing before running a query"));
        }
        if self.level != NavigationLevel::Query {
            self.query_parent = Some(self.level);
        }
        self.query = Some(AdHocQuery { sql: sql.into(), page_size: self.page_size, page_index: 0 });
        self.level = NavigationLevel::Query;
        self.last_page = None;
        Ok(())
    }

    /// Set or clear the WHERE clause. Returns whether anything changed.
    pub fn set_filter(&mut self, clause: Option<String>) -> Result<bool> {
        let clause = normalize_clause(clause);
        let rows = self.rows_mut("filter")?;
        if rows.where_clause == clause {
            return Ok(false);
        }
        rows.where_clause = clause;
        rows.page_index = 0;
        self.last_page = None;
        Ok(true)
    }

    /// Set or clear the ORDER BY clause. Returns whether anything changed.
    pub fn set_sort(&mut self, clause: Option<String>) -> Result<bool> {
        let clause = normalize_clause(clause);
        let rows = self.rows_mut("sort")?;
        if rows.order_by == clause {
            return Ok(false);
        }
        rows.order_by = clause;
        rows.page_index = 0;
        self.last_page = None;
        Ok(true)
    }

    /// Set or clear the name filter of the current listing level. Returns
    /// whether anything changed.
    pub fn set_name_filter(&mut self, text: Option<String>) -> Result<bool> {
        if self.level.is_paged() {
            return Err(BurrowError::invalid_transition(format!(
                "Name filters apply to listings, not {}",
                self.level
            )));
        }
        let text = normalize_clause(text);
        if self.name_filter(self.level) == text.as_deref() {
            return Ok(false);
        }
        match text {
            Some(text) => self.name_filters.insert(self.level, text),
            None => self.name_filters.remove(&self.level),
        };
        Ok(true)
    }

    /// Jump to a page, clamped to the last known page.
    pub fn set_page(&mut self, index: usize) -> Result<bool> {
        let index = match self.last_page {
            Some(last) => index.min(last),
            None => index,
        };
        page_offset(index, self.page_size)?;
        let current = self.page_index_mut()?;
        if *current == index {
            return Ok(false);
        }
        *current = index;
        Ok(true)
    }

    /// Move by `delta` pages. Moving forward past the last known page fails.
    pub fn change_page(&mut self, delta: i64) -> Result<bool> {
        let current = self
            .page_index()
            .ok_or_else(|| BurrowError::invalid_transition("Paging is only available for rows"))?;
        if delta > 0 {
            if let Some(last) = self.last_page {
                if current >= last {
                    return Err(BurrowError::invalid_transition("No more pages"));
                }
            }
        }
        let target = if delta < 0 {
            current.saturating_sub(delta.unsigned_abs() as usize)
        } else {
            current.saturating_add(delta as usize)
        };
        self.set_page(target)
    }

    /// Change the shared page size and restart paging.
    pub fn set_page_size(&mut self, page_size: usize) -> Result<()> {
        if page_size == 0 {
            return Err(BurrowError::invalid_argument("Page size must be greater than 0"));
        }
        if page_size > MAX_PAGE_SIZE {
            return Err(BurrowError::invalid_argument(format!(
                "Page size must be at most {MAX_PAGE_SIZE}, got {page_size}"
            )));
        }
        self.page_size = page_size;
        self.last_page = None;
        if let Some(rows) = self.rows.as_mut() {
            rows.page_size = page_size;
            rows.page_index = 0;
        }
        if let Some(query) = self.query.as_mut() {
            query.page_size = page_size;
            query.page_index = 0;
        }
        Ok(())
    }

    /// Record how a fetched page ended so "next page" can be refused.
    pub fn record_page(&mut self, page_index: usize, has_more: bool) {
        if has_more {
            if self.last_page.is_some_and(|last| last <= page_index) {
                self.last_page = None;
            }
        } else {
            self.last_page = Some(page_index);
        }
    }

    /// Open an editor. Returns the text to prefill.
    pub fn begin_edit(&mut self, mode: EditMode) -> Result<String> {
        if let Some(open) = self.edit {
            return Err(BurrowError::invalid_transition(format!(
                "The {} editor is already open",
                open.label()
            )));
        }
        if mode == EditMode::Filter {
            if self.level.is_paged() {
                return Err(BurrowError::invalid_transition(format!(
                    "Name filters apply to listings, not {}",
                    self.level
                )));
            }
            self.edit = Some(mode);
            return Ok(self.name_filter(self.level).unwrap_or_default().to_string());
        }
        let rows = self
            .rows
            .as_ref()
            .filter(|_| self.level == NavigationLevel::Rows)
            .ok_or_else(|| {
                BurrowError::invalid_transition(format!("{} is only available for rows", mode.label()))
            })?;
        let current = match mode {
            EditMode::Where => rows.where_clause.clone(),
            EditMode::OrderBy => rows.order_by.clone(),
            EditMode::Filter => None,
        };
        self.edit = Some(mode);
        Ok(current.unwrap_or_default())
    }

    /// Close the open editor, if any.
    pub fn end_edit(&mut self) -> Option<EditMode> {
        self.edit.take()
    }

    fn rows_mut(&mut self, what: &str) -> Result<&mut RowsQuerySpec> {
        if self.level != NavigationLevel::Rows {
            return Err(BurrowError::invalid_transition(format!(
                "Cannot {what} at the {} level",
                self.level
            )));
        }
        self.rows
            .as_mut()
            .ok_or_else(|| BurrowError::internal("Rows level without a rows spec"))
    }

    fn page_index_mut(&mut self) -> Result<&mut usize> {
        match self.level {
            NavigationLevel::Rows => self.rows.as_mut().map(|r| &mut r.page_index),
            NavigationLevel::Query => self.query.as_mut().map(|q| &mut q.page_index),
            _ => None,
        }
        .ok_or_else(|| BurrowError::invalid_transition("Paging is only available for rows"))
    }
}

fn normalize_clause(clause: Option<String>) -> Option<String> {
    clause.map(|c| c.trim().to_string()).filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_rows() -> NavigationState {
        let mut nav = NavigationState::new(100);
        nav.push(NavigationLevel::Database, "prod").unwrap();
        nav.push(NavigationLevel::Schema, "mydb").unwrap();
        nav.push(NavigationLevel::Table, "public").unwrap();
        nav.push(NavigationLevel::Rows, "widgets").unwrap();
        nav
    }

    #[test]
    fn test_path_length_tracks_depth() {
        let mut nav = NavigationState::new(100);
        let steps: [(bool, NavigationLevel, &str); 9] = [
            (true, NavigationLevel::Database, "prod"),
            (true, NavigationLevel::Schema, "mydb"),
            (false, NavigationLevel::Connection, ""),
            (true, NavigationLevel::Schema, "other"),
            (true, NavigationLevel::Table, "public"),
            (true, NavigationLevel::Rows, "widgets"),
            (false, NavigationLevel::Connection, ""),
            (false, NavigationLevel::Connection, ""),
            (true, NavigationLevel::Table, "audit"),
        ];
        for (descend, level, id) in steps {
            if descend {
                nav.push(level, id).unwrap();
            } else {
                nav.pop().unwrap();
            }
            assert_eq!(Some(nav.path().len()), nav.level().depth());
        }
        assert_eq!(nav.path().segments(), ["prod", "other", "audit"]);
    }

    #[test]
    fn test_push_requires_adjacent_level() {
        let mut nav = NavigationState::new(100);
        let err = nav.push(NavigationLevel::Schema, "public").unwrap_err();
        assert!(matches!(err, BurrowError::InvalidTransition { .. }));
        assert_eq!(nav.level(), NavigationLevel::Connection);
        assert!(nav.path().is_empty());
    }

    #[test]
    fn test_pop_at_root_fails() {
        let mut nav = NavigationState::new(100);
        assert!(nav.pop().is_err());
    }

    #[test]
    fn test_rows_spec_on_entry() {
        let nav = at_rows();
        let spec = nav.rows_spec().unwrap();
        assert_eq!(spec, &RowsQuerySpec::new("public", "widgets", 100));
        assert_eq!(nav.path().to_string(), "prod > mydb > public > widgets");
    }

    #[test]
    fn test_pop_clears_rows_spec() {
        let mut nav = at_rows();
        nav.set_filter(Some("quantity > 0".into())).unwrap();
        assert_eq!(nav.pop().unwrap(), NavigationLevel::Table);
        assert!(nav.rows_spec().is_none());
        nav.push(NavigationLevel::Rows, "widgets").unwrap();
        assert_eq!(nav.rows_spec().unwrap().where_clause, None);
    }

    #[test]
    fn test_filter_and_sort_reset_page() {
        let mut nav = at_rows();
        nav.set_page(3).unwrap();
        assert!(nav.set_filter(Some("quantity > 0".into())).unwrap());
        assert_eq!(nav.page_index(), Some(0));

        nav.set_page(2).unwrap();
        assert!(nav.set_sort(Some("quantity desc".into())).unwrap());
        assert_eq!(nav.page_index(), Some(0));
    }

    #[test]
    fn test_identical_filter_keeps_page() {
        let mut nav = at_rows();
        nav.set_filter(Some("quantity > 0".into())).unwrap();
        nav.set_sort(Some("name".into())).unwrap();
        nav.set_page(2).unwrap();

        assert!(!nav.set_filter(Some("  quantity > 0 ".into())).unwrap());
        assert!(!nav.set_sort(Some("name".into())).unwrap());
        assert_eq!(nav.page_index(), Some(2));
    }

    #[test]
    fn test_blank_clause_clears() {
        let mut nav = at_rows();
        nav.set_filter(Some("id = 1".into())).unwrap();
        assert!(nav.set_filter(Some("   ".into())).unwrap());
        assert_eq!(nav.rows_spec().unwrap().where_clause, None);
    }

    #[test]
    fn test_filter_outside_rows_fails() {
        let mut nav = NavigationState::new(100);
        nav.push(NavigationLevel::Database, "prod").unwrap();
        assert!(nav.set_filter(Some("x".into())).is_err());
        assert!(nav.set_page(1).is_err());
    }

    #[test]
    fn test_page_never_negative() {
        let mut nav = at_rows();
        assert!(!nav.change_page(-1).unwrap());
        assert_eq!(nav.page_index(), Some(0));
        nav.change_page(2).unwrap();
        nav.change_page(-5).unwrap();
        assert_eq!(nav.page_index(), Some(0));
    }

    #[test]
    fn test_next_page_refused_after_short_page() {
        let mut nav = at_rows();
        nav.record_page(0, false);
        let err = nav.change_page(1).unwrap_err();
        assert!(matches!(err, BurrowError::InvalidTransition { .. }));
        assert_eq!(nav.page_index(), Some(0));
    }

    #[test]
    fn test_set_page_clamped_to_last_known() {
        let mut nav = at_rows();
        nav.set_page(1).unwrap();
        nav.record_page(1, false);
        nav.set_page(0).unwrap();
        nav.set_page(9).unwrap();
        assert_eq!(nav.page_index(), Some(1));
    }

    #[test]
    fn test_page_size_change_resets() {
        let mut nav = at_rows();
        nav.set_page(4).unwrap();
        nav.record_page(4, false);
        assert!(nav.set_page_size(0).is_err());
        nav.set_page_size(25).unwrap();
        let spec = nav.rows_spec().unwrap();
        assert_eq!((spec.page_size, spec.page_index), (25, 0));
        assert_eq!(nav.last_page(), None);
    }

    #[test]
    fn test_page_size_capped() {
        let mut nav = at_rows();
        for size in [MAX_PAGE_SIZE + 1, usize::MAX, i64::MAX as usize] {
            let err = nav.set_page_size(size).unwrap_err();
            assert!(matches!(err, BurrowError::InvalidArgument { .. }), "{size}");
        }
        nav.set_page_size(MAX_PAGE_SIZE).unwrap();
        assert_eq!(nav.rows_spec().unwrap().page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_offset_out_of_range_rejected() {
        let mut nav = at_rows();
        nav.set_page_size(MAX_PAGE_SIZE).unwrap();
        let err = nav.change_page(i64::MAX).unwrap_err();
        assert!(matches!(err, BurrowError::InvalidArgument { .. }));
        assert_eq!(nav.page_index(), Some(0));

        let mut spec = RowsQuerySpec::new("public", "widgets", 2);
        spec.page_index = usize::MAX;
        assert!(spec.offset().is_err());
        spec.page_index = 3;
        assert_eq!(spec.offset().unwrap(), 6);

        let query = AdHocQuery { sql: "SELECT 1".into(), page_size: 10, page_index: usize::MAX / 2 };
        assert!(query.offset().is_err());
    }

    #[test]
    fn test_name_filter_per_level() {
        let mut nav = NavigationState::new(100);
        assert!(nav.set_name_filter(Some(" Prod ".into())).unwrap());
        assert!(!nav.set_name_filter(Some("Prod".into())).unwrap());
        nav.push(NavigationLevel::Database, "prod").unwrap();
        assert_eq!(nav.name_filter(NavigationLevel::Database), None);
        nav.set_name_filter(Some("my".into())).unwrap();

        nav.pop().unwrap();
        assert_eq!(nav.name_filter(NavigationLevel::Connection), Some("Prod"));
        assert_eq!(nav.name_filter(NavigationLevel::Database), Some("my"));

        nav.reset();
        assert_eq!(nav.name_filter(NavigationLevel::Connection), Some("Prod"));
        assert!(nav.set_name_filter(Some("  ".into())).unwrap());
        assert_eq!(nav.name_filter(NavigationLevel::Connection), None);
    }

    #[test]
    fn test_name_filter_editor_on_listings_only() {
        let mut nav = at_rows();
        assert!(nav.begin_edit(EditMode::Filter).is_err());
        assert!(nav.set_name_filter(Some("x".into())).is_err());

        nav.pop().unwrap();
        nav.set_name_filter(Some("wid".into())).unwrap();
        assert_eq!(nav.begin_edit(EditMode::Filter).unwrap(), "wid");
        assert!(nav.begin_edit(EditMode::Where).is_err());
        assert_eq!(nav.end_edit(), Some(EditMode::Filter));
    }

    #[test]
    fn test_edit_modes_exclusive() {
        let mut nav = at_rows();
        nav.set_filter(Some("id > 1".into())).unwrap();
        assert_eq!(nav.begin_edit(EditMode::Where).unwrap(), "id > 1");
        assert!(nav.begin_edit(EditMode::OrderBy).is_err());
        assert_eq!(nav.end_edit(), Some(EditMode::Where));
        assert_eq!(nav.begin_edit(EditMode::OrderBy).unwrap(), "");
    }

    #[test]
    fn test_edit_requires_rows() {
        let mut nav = NavigationState::new(100);
        assert!(nav.begin_edit(EditMode::Where).is_err());
        assert_eq!(nav.edit_mode(), None);
    }

    #[test]
    fn test_query_view_returns_to_origin() {
        let mut nav = NavigationState::new(50);
        nav.push(NavigationLevel::Database, "prod").unwrap();
        assert!(nav.enter_query("SELECT 1").is_err());

        nav.push(NavigationLevel::Schema, "mydb").unwrap();
        nav.enter_query("SELECT 1").unwrap();
        assert_eq!(nav.level(), NavigationLevel::Query);
        assert_eq!(nav.query().unwrap().page_size, 50);

        nav.enter_query("SELECT 2").unwrap();
        assert_eq!(nav.pop().unwrap(), NavigationLevel::Schema);
        assert_eq!(nav.path().len(), 2);
        assert!(nav.query().is_none());
    }

    #[test]
    fn test_level_relations() {
        assert_eq!(NavigationLevel::Rows.parent(), Some(NavigationLevel::Table));
        assert_eq!(NavigationLevel::Connection.parent(), None);
        assert_eq!(NavigationLevel::Table.child(), Some(NavigationLevel::Rows));
        assert_eq!(NavigationLevel::Rows.child(), None);
        assert_eq!(NavigationLevel::Query.depth(), None);
        assert_eq!(NavigationLevel::Query.child(), None);
    }
}
