//! Markdown preview of the first rows of a table.

use watchsheet_core::domain::Table;

/// Render the header and the first `limit` rows as a markdown table.
pub fn render_preview(table: &Table, limit: usize) -> String {
    let escape = |cell: &str| cell.replace('|', "\\|");

    let mut out = format!("| {} |\n", table.columns().join(" | "));
    out.push('|');
    for column in table.columns() {
        out.push_str(&"-".repeat(column.len() + 2));
        out.push('|');
    }
    out.push('\n');

    for row in table.rows().iter().take(limit) {
        let cells: Vec<String> = row.cells().iter().map(|c| escape(c)).collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }

    let remaining = table.len().saturating_sub(limit);
    if remaining > 0 {
        out.push_str(&format!("({remaining} more rows)\n"));
    }
    out
}
