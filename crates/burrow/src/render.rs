//! Plain-text rendering of the view.

use std::fmt::Write;

use burrow_core::{CommandRouter, RowPage, ViewContent, ViewState};

const NULL: &str = "NULL";

/// Render the whole screen. `notice` is a router message that never reached
/// the coordinator.
pub fn render(view: &ViewState, router: &CommandRouter, notice: Option<&str>) -> String {
    let mut out = String::new();

    let _ = write!(out, "[{}]", view.level);
    if !view.path.is_empty() {
        let _ = write!(out, " {}", view.path);
    }
    if view.loading {
        out.push_str("  (loading)");
    }
    out.push('\n');

    if let Some(rows) = &view.rows_spec {
        if let Some(clause) = &rows.where_clause {
            let _ = writeln!(out, "WHERE {clause}");
        }
        if let Some(clause) = &rows.order_by {
            let _ = writeln!(out, "ORDER BY {clause}");
        }
    }
    if let Some(query) = &view.query {
        let _ = writeln!(out, "SQL {}", query.sql.trim());
    }
    if let Some(filter) = &view.name_filter {
        let _ = writeln!(out, "FILTER {filter}");
    }

    match &view.content {
        ViewContent::Empty => {}
        ViewContent::Listing { entries, .. } => {
            if entries.is_empty() {
                out.push_str("  (none)\n");
            }
            let width = entries.iter().map(|e| e.name.len()).max().unwrap_or(0);
            for (i, entry) in entries.iter().enumerate() {
                let marker = if i == view.cursor { '>' } else { ' ' };
                match &entry.detail {
                    Some(detail) => {
                        let _ = writeln!(out, "{marker} {:width$}  {detail}", entry.name);
                    }
                    None => {
                        let _ = writeln!(out, "{marker} {}", entry.name);
                    }
                }
            }
        }
        ViewContent::Page { page, .. } => render_page(&mut out, page, view.cursor),
    }

    if let Some(failure) = &view.error {
        let _ = writeln!(out, "error: {failure}");
        if let Some(detail) = &failure.detail {
            for line in detail.lines() {
                let _ = writeln!(out, "  {line}");
            }
        }
        if let Some(hint) = &failure.hint {
            let _ = writeln!(out, "hint: {hint}");
        }
    }
    if let Some(status) = &view.status {
        let _ = writeln!(out, "{status}");
    }
    if let Some(notice) = notice {
        let _ = writeln!(out, "{notice}");
    }
    if let Some((mode, text)) = router.editor() {
        let _ = writeln!(out, "{}: {text}", mode.label());
    }
    out
}

fn render_page(out: &mut String, page: &RowPage, cursor: usize) {
    let cells: Vec<Vec<&str>> = page
        .rows
        .iter()
        .map(|row| row.iter().map(|v| v.as_deref().unwrap_or(NULL)).collect())
        .collect();
    let widths: Vec<usize> = page
        .columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            cells.iter().filter_map(|row| row.get(i)).map(|v| v.len()).fold(col.name.len(), usize::max)
        })
        .collect();

    let header: Vec<String> =
        page.columns.iter().zip(&widths).map(|(col, &w)| format!("{:w$}", col.name)).collect();
    let _ = writeln!(out, "  {}", header.join(" | ").trim_end());

    for (i, row) in cells.iter().enumerate() {
        let marker = if i == cursor { '>' } else { ' ' };
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(c, v)| format!("{:w$}", v, w = widths.get(c).copied().unwrap_or(0)))
            .collect();
        let _ = writeln!(out, "{marker} {}", line.join(" | ").trim_end());
    }

    if page.rows.is_empty() {
        let _ = writeln!(out, "-- page {} (no rows)", page.page_index + 1);
    } else {
        let first = page.first_row_number();
        let last = first + page.row_count() - 1;
        let more = if page.has_more { ", more" } else { "" };
        let _ = writeln!(out, "-- page {} (rows {first}-{last}{more})", page.page_index + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_core::models::ColumnInfo;
    use burrow_core::{ListEntry, NavigationLevel};

    fn listing_view() -> ViewState {
        let mut view = blank_view();
        view.content = ViewContent::Listing {
            level: NavigationLevel::Table,
            entries: vec![
                ListEntry::with_detail("gadgets", "~0"),
                ListEntry::with_detail("widgets", "~3"),
            ],
        };
        view.cursor = 1;
        view
    }

    fn blank_view() -> ViewState {
        ViewState {
            level: NavigationLevel::Table,
            path: burrow_core::SelectionPath::from_segments(["local", "mydb", "public"]),
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

    #[test]
    fn test_render_listing() {
        let text = render(&listing_view(), &CommandRouter::new(), None);
        assert_eq!(
            text,
            "[tables] local > mydb > public\n  gadgets  ~0\n> widgets  ~3\n"
        );
    }

    #[test]
    fn test_render_name_filter() {
        let mut view = listing_view();
        view.name_filter = Some("wid".into());
        let text = render(&view, &CommandRouter::new(), None);
        assert_eq!(text.lines().nth(1), Some("FILTER wid"));
    }

    #[test]
    fn test_render_page_with_nulls() {
        let mut view = blank_view();
        view.level = NavigationLevel::Rows;
        view.content = ViewContent::Page {
            level: NavigationLevel::Rows,
            page: RowPage {
                columns: vec![ColumnInfo::new("id", "int4"), ColumnInfo::new("name", "text")],
                rows: vec![
                    vec![Some("1".into()), Some("bolt".into())],
                    vec![Some("2".into()), None],
                ],
                page_index: 1,
                page_size: 2,
                has_more: true,
            },
        };
        let text = render(&view, &CommandRouter::new(), Some("Unknown command: zz"));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "  id | name");
        assert_eq!(lines[2], "> 1  | bolt");
        assert_eq!(lines[3], "  2  | NULL");
        assert_eq!(lines[4], "-- page 2 (rows 3-4, more)");
        assert_eq!(lines[5], "Unknown command: zz");
    }

    #[test]
    fn test_render_loading_and_editor() {
        let mut view = blank_view();
        view.loading = true;
        let mut router = CommandRouter::new();
        router.open_editor(burrow_core::EditMode::Where, "quantity > 0");
        let text = render(&view, &router, None);
        assert!(text.starts_with("[tables] local > mydb > public  (loading)\n"));
        assert!(text.ends_with("WHERE: quantity > 0\n"));
    }
}
